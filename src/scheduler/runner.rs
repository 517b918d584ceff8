//! What a worker runs for each task

use crate::degradation::DegradationManager;
use crate::errors::{RagError, Result};
use crate::intent::IntentLevel;
use crate::pipeline::operations::{RESULT_REFINEMENT, TEMPLATE_ANSWER};
use crate::pipeline::{Pipeline, PipelineBuilder, RunStatus};
use crate::scheduler::types::RagRequest;
use crate::services::{Service, FALLBACK_MODEL, GRAPH_CLIENT, LLM_SERVICE, VECTOR_INDEX};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Executes one task payload, observing `cancel` at step boundaries
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, request: &RagRequest, cancel: &CancellationToken) -> Result<Value>;
}

/// Routes each request to a pipeline by intent level
#[derive(Debug, Clone)]
pub struct PipelineRouter {
    routes: HashMap<IntentLevel, Arc<Pipeline>>,
    default: Arc<Pipeline>,
}

impl PipelineRouter {
    pub fn new(default: Arc<Pipeline>) -> Self {
        Self {
            routes: HashMap::new(),
            default,
        }
    }

    pub fn route(mut self, level: IntentLevel, pipeline: Arc<Pipeline>) -> Self {
        self.routes.insert(level, pipeline);
        self
    }

    pub fn pipeline_for(&self, level: IntentLevel) -> &Arc<Pipeline> {
        self.routes.get(&level).unwrap_or(&self.default)
    }

    /// Vector path for L1, graph path for L2/L3, graph+vector for L4.
    ///
    /// Every step carries its fallback. `fallback_model` labels answers built
    /// by the template fallback.
    pub fn standard(
        services: &StandardServices,
        degradation: Arc<DegradationManager>,
        top_k: usize,
    ) -> Result<Self> {
        let base = |name: &str| {
            PipelineBuilder::new(name, degradation.clone())
                .with_service(LLM_SERVICE, services.llm.clone())
                .with_service(GRAPH_CLIENT, services.graph.clone())
                .with_service(VECTOR_INDEX, services.vector.clone())
                .with_service(FALLBACK_MODEL, Service::from(services.fallback_model.as_str()))
        };

        let vector = base("vector_rag")
            .add_vector_query(top_k, true)
            .add_result_refinement(true)
            .build()?;

        let graph = base("graph_rag")
            .add_entity_recognition(true)
            .add_graph_query(true)
            .add_result_refinement(true)
            .build()?;

        let hybrid = Arc::new(
            base("graph_vector_rag")
                .add_entity_recognition(true)
                .add_graph_query(true)
                .add_vector_query(top_k, true)
                .add_result_refinement(true)
                .build()?,
        );

        let graph = Arc::new(graph);
        Ok(Self::new(hybrid.clone())
            .route(IntentLevel::L1, Arc::new(vector))
            .route(IntentLevel::L2, graph.clone())
            .route(IntentLevel::L3, graph)
            .route(IntentLevel::L4, hybrid))
    }
}

/// Services shared by the standard pipelines
#[derive(Debug, Clone)]
pub struct StandardServices {
    pub llm: Service,
    pub graph: Service,
    pub vector: Service,
    pub fallback_model: String,
}

#[async_trait]
impl TaskRunner for PipelineRouter {
    async fn run(&self, request: &RagRequest, cancel: &CancellationToken) -> Result<Value> {
        let pipeline = self.pipeline_for(request.intent);
        tracing::info!(pipeline = pipeline.name(), intent = %request.intent, "running pipeline");

        let (context, report) = pipeline
            .execute_with_cancel(request.to_context(), cancel)
            .await;

        match &report.status {
            RunStatus::Completed => {}
            RunStatus::Aborted { operation, reason } => {
                return Err(RagError::PipelineAborted {
                    operation: operation.clone(),
                    reason: reason.clone(),
                })
            }
            RunStatus::Cancelled { next_step } => {
                return Err(RagError::TaskCancelled {
                    reason: format!("stopped before step '{}'", next_step),
                })
            }
        }

        let answer = context
            .first_result_of(&[RESULT_REFINEMENT, TEMPLATE_ANSWER])
            .and_then(|out| out.get("answer"))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(json!({
            "pipeline": pipeline.name(),
            "intent": request.intent,
            "answer": answer,
            "summary": report.summary(),
            "report": report,
            "context": context,
        }))
    }
}
