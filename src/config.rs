use crate::degradation::DegradationConfig;
use crate::errors::{RagError, Result};
use crate::memory::MemoryConfig;
use crate::scheduler::{PriorityTable, SchedulerConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration, read from `~/.composable-rag/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub degradation: DegradationConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub priorities: PriorityTable,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Endpoints and models for the HTTP service adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Ollama base URL; `None` uses the local default
    pub ollama_url: Option<String>,
    pub model: String,
    pub graph_url: String,
    pub graph_name: String,
    pub request_timeout_secs: u64,
    /// Label attached to answers built without the model
    pub fallback_model: String,
    pub top_k: usize,
    /// Text file indexed into the in-memory vector index, one paragraph per document
    pub documents: Option<PathBuf>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            ollama_url: None,
            model: "qwen2.5:7b-instruct".to_string(),
            graph_url: "http://127.0.0.1:8080".to_string(),
            graph_name: "hugegraph".to_string(),
            request_timeout_secs: 60,
            fallback_model: "template".to_string(),
            top_k: 5,
            documents: None,
        }
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields built-in defaults; a missing explicit
    /// path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::config_path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Config::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents)
            .map_err(|e| RagError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Write this configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RagError::Config(format!("failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| RagError::Config("could not determine home directory".to_string()))?;

        Ok(home.join(".composable-rag").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let partial = self.degradation.partial_threshold;
        let severe = self.degradation.severe_threshold;
        if partial == 0 {
            return Err(RagError::Config(
                "degradation.partial_threshold must be at least 1".to_string(),
            ));
        }
        if severe <= partial {
            return Err(RagError::Config(format!(
                "degradation.severe_threshold ({}) must exceed partial_threshold ({})",
                severe, partial
            )));
        }

        if self.scheduler.workers == 0 {
            return Err(RagError::Config("scheduler.workers must be at least 1".to_string()));
        }
        if self.scheduler.task_timeout_ms == 0 {
            return Err(RagError::Config(
                "scheduler.task_timeout_ms must be positive".to_string(),
            ));
        }

        if self.services.top_k == 0 {
            return Err(RagError::Config("services.top_k must be at least 1".to_string()));
        }

        Ok(())
    }
}
