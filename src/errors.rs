//! Error types for composable-rag
//!
//! Step-level failures are reported as [`OperationError`] and absorbed by the
//! pipeline executor. Everything that crosses a component boundary is a
//! [`RagError`].

use thiserror::Error;

/// Failure of a single micro-operation.
///
/// Recoverable: the executor turns it into a degradation record and, when
/// one is registered, a fallback attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct OperationError {
    pub reason: String,
}

impl OperationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Missing input key in the execution context
    pub fn missing_input(key: &str) -> Self {
        Self::new(format!("missing context value '{}'", key))
    }

    /// Missing named service in the registry
    pub fn missing_service(name: &str) -> Self {
        Self::new(format!("service '{}' is not registered", name))
    }
}

impl From<RagError> for OperationError {
    fn from(err: RagError) -> Self {
        OperationError::new(err.to_string())
    }
}

/// Main error type for the RAG core
#[derive(Error, Debug)]
pub enum RagError {
    /// A single step failed and the failure escaped the executor
    #[error("Operation '{operation}' failed: {reason}")]
    Operation { operation: String, reason: String },

    /// Pipeline halted after exhausting fallback options
    #[error("Pipeline aborted at '{operation}': {reason}")]
    PipelineAborted { operation: String, reason: String },

    /// Pipeline definition is unusable
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// Task exceeded its wait+run ceiling
    #[error("Task timed out after {duration_ms}ms")]
    TaskTimeout { duration_ms: u64 },

    /// Task was cancelled (preemption or shutdown)
    #[error("Task cancelled: {reason}")]
    TaskCancelled { reason: String },

    /// Unknown task id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Scheduler no longer accepts work
    #[error("Scheduler is shut down")]
    SchedulerShutdown,

    /// Task status transition rejected by the result store
    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// External intent classifier failed
    #[error("Intent classification failed: {0}")]
    Classification(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{0}")]
    Generic(String),
}

impl RagError {
    /// Scheduler-level terminal errors the caller may resubmit after
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            RagError::TaskCancelled { .. } | RagError::TaskTimeout { .. }
        )
    }
}

/// Result type alias for RAG core operations
pub type Result<T> = std::result::Result<T, RagError>;

impl From<anyhow::Error> for RagError {
    fn from(err: anyhow::Error) -> Self {
        RagError::Generic(err.to_string())
    }
}
