//! Priority task scheduling for RAG requests
//!
//! Tasks carry a priority derived from the question's intent level and run
//! on a bounded worker pool. A higher-priority arrival with no free worker
//! cancels the lowest-priority running task at its next step boundary.

pub mod priority;
pub mod runner;
pub mod slot;
pub mod store;
pub mod types;

pub use priority::TaskScheduler;
pub use runner::{PipelineRouter, StandardServices, TaskRunner};
pub use slot::SchedulerSlot;
pub use store::TaskStore;
pub use types::{
    CancelReason, PriorityTable, RagRequest, SchedulerConfig, SchedulerStats, TaskPriority,
    TaskResult, TaskStatus,
};
