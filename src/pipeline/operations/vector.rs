//! Vector retrieval and its keyword fallback

use crate::errors::{OperationError, RagError};
use crate::pipeline::context::{ExecutionContext, QUERY_KEY};
use crate::pipeline::operation::{Operation, OperationResult};
use crate::pipeline::operations::{entities_from, KEYWORD_MATCH, VECTOR_QUERY};
use crate::services::{ServiceRegistry, VECTOR_INDEX};
use async_trait::async_trait;

/// Documents returned when no `top_k` is given
pub const DEFAULT_TOP_K: usize = 5;

/// Similarity search on the question text
#[derive(Debug)]
pub struct VectorQuery {
    top_k: usize,
}

impl VectorQuery {
    pub fn new(top_k: usize) -> Self {
        Self { top_k: top_k.max(1) }
    }
}

impl Default for VectorQuery {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

#[async_trait]
impl Operation for VectorQuery {
    fn name(&self) -> &str {
        VECTOR_QUERY
    }

    fn required_services(&self) -> Vec<&'static str> {
        vec![VECTOR_INDEX]
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        services: &ServiceRegistry,
    ) -> OperationResult {
        let query = context
            .query()
            .ok_or_else(|| OperationError::missing_input(QUERY_KEY))?;
        let index = services.vector(VECTOR_INDEX)?;

        let documents = index.search(query, self.top_k).await?;
        tracing::debug!(hits = documents.len(), "vector search finished");

        Ok(serde_json::to_value(documents).map_err(RagError::from)?)
    }
}

/// Keyword search over the same index using extracted entities
#[derive(Debug)]
pub struct KeywordMatch {
    top_k: usize,
}

impl KeywordMatch {
    pub fn new(top_k: usize) -> Self {
        Self { top_k: top_k.max(1) }
    }
}

impl Default for KeywordMatch {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

#[async_trait]
impl Operation for KeywordMatch {
    fn name(&self) -> &str {
        KEYWORD_MATCH
    }

    fn required_services(&self) -> Vec<&'static str> {
        vec![VECTOR_INDEX]
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        services: &ServiceRegistry,
    ) -> OperationResult {
        let index = services.vector(VECTOR_INDEX)?;

        let keywords = entities_from(context);
        if keywords.is_empty() {
            return Err(OperationError::new("no keywords to match"));
        }

        let documents = index.keyword_search(&keywords, self.top_k).await?;
        Ok(serde_json::to_value(documents).map_err(RagError::from)?)
    }
}
