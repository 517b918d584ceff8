//! External collaborators consumed by pipeline operations
//!
//! LLM inference, graph queries and vector search are black boxes reached
//! through the traits below. Pipelines look them up by name in a
//! [`ServiceRegistry`] populated through `PipelineBuilder::with_service`.

pub mod hugegraph;
pub mod memory;
pub mod ollama;

use crate::errors::{OperationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use hugegraph::HugeGraphClient;
pub use memory::InMemoryIndex;
pub use ollama::OllamaChatModel;

/// Registry name of the chat model
pub const LLM_SERVICE: &str = "llm_service";
/// Registry name of the graph client
pub const GRAPH_CLIENT: &str = "graph_client";
/// Registry name of the vector index
pub const VECTOR_INDEX: &str = "vector_index";
/// Registry name of the lightweight model label used by fallbacks
pub const FALLBACK_MODEL: &str = "fallback_model";

/// Text generation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Graph query execution (Gremlin text in, JSON out)
#[async_trait]
pub trait GraphClient: Send + Sync {
    async fn query(&self, gremlin: &str) -> Result<Value>;
}

/// Document retrieved from the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub score: f32,
}

/// Similarity and keyword search over indexed documents
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Document>>;

    async fn keyword_search(&self, keywords: &[String], top_k: usize) -> Result<Vec<Document>>;
}

/// A named dependency registered on a pipeline
#[derive(Clone)]
pub enum Service {
    Llm(Arc<dyn LanguageModel>),
    Graph(Arc<dyn GraphClient>),
    Vector(Arc<dyn VectorIndex>),
    Setting(String),
}

impl Service {
    pub fn kind(&self) -> &'static str {
        match self {
            Service::Llm(_) => "llm",
            Service::Graph(_) => "graph",
            Service::Vector(_) => "vector",
            Service::Setting(_) => "setting",
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Setting(value) => write!(f, "Setting({:?})", value),
            other => write!(f, "{}", other.kind()),
        }
    }
}

impl From<&str> for Service {
    fn from(value: &str) -> Self {
        Service::Setting(value.to_string())
    }
}

impl From<String> for Service {
    fn from(value: String) -> Self {
        Service::Setting(value)
    }
}

/// Named services available to every step of a pipeline
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Service>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, service: Service) {
        self.services.insert(name.into(), service);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn llm(&self, name: &str) -> std::result::Result<Arc<dyn LanguageModel>, OperationError> {
        match self.services.get(name) {
            Some(Service::Llm(model)) => Ok(Arc::clone(model)),
            Some(other) => Err(wrong_kind(name, "llm", other)),
            None => Err(OperationError::missing_service(name)),
        }
    }

    pub fn graph(&self, name: &str) -> std::result::Result<Arc<dyn GraphClient>, OperationError> {
        match self.services.get(name) {
            Some(Service::Graph(client)) => Ok(Arc::clone(client)),
            Some(other) => Err(wrong_kind(name, "graph", other)),
            None => Err(OperationError::missing_service(name)),
        }
    }

    pub fn vector(&self, name: &str) -> std::result::Result<Arc<dyn VectorIndex>, OperationError> {
        match self.services.get(name) {
            Some(Service::Vector(index)) => Ok(Arc::clone(index)),
            Some(other) => Err(wrong_kind(name, "vector", other)),
            None => Err(OperationError::missing_service(name)),
        }
    }

    /// Plain setting value, if registered as one
    pub fn setting(&self, name: &str) -> Option<&str> {
        match self.services.get(name) {
            Some(Service::Setting(value)) => Some(value.as_str()),
            _ => None,
        }
    }
}

fn wrong_kind(name: &str, expected: &str, found: &Service) -> OperationError {
    OperationError::new(format!(
        "service '{}' is a {} service, expected {}",
        name,
        found.kind(),
        expected
    ))
}
