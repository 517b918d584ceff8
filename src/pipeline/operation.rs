//! Micro-operation interface and pipeline steps

use crate::errors::OperationError;
use crate::pipeline::context::ExecutionContext;
use crate::services::ServiceRegistry;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Result of one micro-operation
pub type OperationResult = std::result::Result<Value, OperationError>;

/// One named unit of work in a pipeline.
///
/// Reads what it needs from the context and returns its output; the executor
/// stores that output under `"<name>_result"`.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Unique step name
    fn name(&self) -> &str;

    /// Services that must be registered for this operation to run
    fn required_services(&self) -> Vec<&'static str> {
        Vec::new()
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        services: &ServiceRegistry,
    ) -> OperationResult;
}

/// Operation backed by an async closure
pub struct FnOperation<F> {
    name: String,
    func: F,
}

impl<F, Fut> FnOperation<F>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = OperationResult> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = OperationResult> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        _services: &ServiceRegistry,
    ) -> OperationResult {
        (self.func)(context.clone()).await
    }
}

/// A primary operation with an optional lighter fallback
#[derive(Clone)]
pub struct PipelineStep {
    operation: Arc<dyn Operation>,
    fallback: Option<Arc<dyn Operation>>,
}

impl PipelineStep {
    pub fn new(operation: Arc<dyn Operation>) -> Self {
        Self {
            operation,
            fallback: None,
        }
    }

    pub fn with_fallback(operation: Arc<dyn Operation>, fallback: Arc<dyn Operation>) -> Self {
        Self {
            operation,
            fallback: Some(fallback),
        }
    }

    pub fn name(&self) -> &str {
        self.operation.name()
    }

    pub fn fallback_name(&self) -> Option<&str> {
        self.fallback.as_ref().map(|op| op.name())
    }

    pub fn operation(&self) -> &Arc<dyn Operation> {
        &self.operation
    }

    pub fn fallback(&self) -> Option<&Arc<dyn Operation>> {
        self.fallback.as_ref()
    }
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name())
            .field("fallback", &self.fallback_name())
            .finish()
    }
}
