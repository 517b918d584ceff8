//! composable-rag - Graph RAG pipelines with graceful degradation
//!
//! Question answering over a property graph and a document index, built from
//! small composable operations.
//!
//! # Architecture
//!
//! - **degradation**: per-operation error streaks and health levels
//! - **pipeline**: builder, sequential executor with fallbacks, execution reports
//! - **scheduler**: priority worker pool with cooperative preemption and a result store
//! - **intent**: question intent levels that drive priority and routing
//! - **memory**: bounded dialogue transcript fed back into answer prompts
//! - **services**: LLM, graph and vector index adapters

pub mod errors;

pub mod degradation;
pub mod intent;
pub mod memory;
pub mod pipeline;
pub mod scheduler;
pub mod services;

pub mod cli;
pub mod config;

// Re-export commonly used types
pub use degradation::{DegradationLevel, DegradationManager, DegradationStatus};
pub use errors::{OperationError, RagError, Result};
pub use pipeline::{ExecutionContext, ExecutionReport, Pipeline, PipelineBuilder};
pub use scheduler::{TaskPriority, TaskResult, TaskScheduler, TaskStatus};
