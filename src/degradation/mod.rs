//! Per-operation health tracking and degradation levels
//! Decides when a pipeline step should give way to its fallback

pub mod manager;
pub mod types;

pub use manager::{DegradationConfig, DegradationManager};
pub use types::{DegradationLevel, DegradationStatus, OperationHealth};
