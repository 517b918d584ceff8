//! Composable RAG pipelines
//!
//! A [`Pipeline`] is an ordered chain of micro-operations sharing one
//! [`ExecutionContext`]. Each step may carry a lighter fallback that the
//! executor substitutes when the [`DegradationManager`](crate::degradation::DegradationManager)
//! reports the step as degraded, or retries once when the primary fails.

pub mod builder;
pub mod context;
pub mod executor;
pub mod operation;
pub mod operations;
pub mod report;

pub use builder::PipelineBuilder;
pub use context::{result_key, ExecutionContext};
pub use executor::Pipeline;
pub use operation::{FnOperation, Operation, OperationResult, PipelineStep};
pub use report::{DegradationEvent, ExecutionReport, RunStatus};
