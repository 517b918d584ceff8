//! CLI module for composable-rag
//!
//! Handles command-line argument parsing and wiring of the configured
//! services into the standard pipelines.

pub mod args;
pub mod runtime;

pub use args::{Args, Commands, Verbosity};
pub use runtime::RagRuntime;
