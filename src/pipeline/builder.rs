//! Fluent pipeline assembly

use crate::degradation::DegradationManager;
use crate::errors::{RagError, Result};
use crate::pipeline::executor::Pipeline;
use crate::pipeline::operation::{Operation, PipelineStep};
use crate::pipeline::operations::{
    EntityRecognition, GraphQuery, KeywordExtraction, KeywordMatch, ResultRefinement,
    TemplateAnswer, VectorQuery, VertexLookup,
};
use crate::services::{Service, ServiceRegistry};
use std::collections::HashSet;
use std::sync::Arc;

/// Collects services and steps, then freezes them into a [`Pipeline`]
pub struct PipelineBuilder {
    name: String,
    steps: Vec<PipelineStep>,
    services: ServiceRegistry,
    degradation: Arc<DegradationManager>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>, degradation: Arc<DegradationManager>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            services: ServiceRegistry::new(),
            degradation,
        }
    }

    /// Register a named dependency available to every step
    pub fn with_service(mut self, name: impl Into<String>, service: Service) -> Self {
        self.services.register(name, service);
        self
    }

    /// Append a custom step
    pub fn add_step(
        mut self,
        operation: Arc<dyn Operation>,
        fallback: Option<Arc<dyn Operation>>,
    ) -> Self {
        let step = match fallback {
            Some(fallback) => PipelineStep::with_fallback(operation, fallback),
            None => PipelineStep::new(operation),
        };
        self.steps.push(step);
        self
    }

    fn add_builtin<P, F>(self, primary: P, fallback: F, with_fallback: bool) -> Self
    where
        P: Operation + 'static,
        F: Operation + 'static,
    {
        let fallback: Option<Arc<dyn Operation>> = if with_fallback {
            Some(Arc::new(fallback))
        } else {
            None
        };
        self.add_step(Arc::new(primary), fallback)
    }

    pub fn add_entity_recognition(self, with_fallback: bool) -> Self {
        self.add_builtin(EntityRecognition, KeywordExtraction, with_fallback)
    }

    pub fn add_graph_query(self, with_fallback: bool) -> Self {
        self.add_builtin(GraphQuery, VertexLookup::default(), with_fallback)
    }

    pub fn add_vector_query(self, top_k: usize, with_fallback: bool) -> Self {
        self.add_builtin(VectorQuery::new(top_k), KeywordMatch::new(top_k), with_fallback)
    }

    pub fn add_result_refinement(self, with_fallback: bool) -> Self {
        self.add_builtin(ResultRefinement, TemplateAnswer, with_fallback)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validate and freeze the step sequence.
    ///
    /// Rejects an empty pipeline, duplicate step or fallback names, and steps
    /// whose required services were never registered.
    pub fn build(self) -> Result<Pipeline> {
        if self.steps.is_empty() {
            return Err(RagError::InvalidPipeline(format!(
                "pipeline '{}' has no steps",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            let operations = std::iter::once(step.operation()).chain(step.fallback());
            for operation in operations {
                if !names.insert(operation.name().to_string()) {
                    return Err(RagError::InvalidPipeline(format!(
                        "duplicate operation name '{}'",
                        operation.name()
                    )));
                }

                if let Some(missing) = operation
                    .required_services()
                    .into_iter()
                    .find(|service| !self.services.contains(service))
                {
                    return Err(RagError::InvalidPipeline(format!(
                        "operation '{}' requires service '{}'",
                        operation.name(),
                        missing
                    )));
                }
            }
        }

        tracing::debug!(pipeline = %self.name, steps = self.steps.len(), "pipeline built");
        Ok(Pipeline::new(
            self.name,
            self.steps,
            self.services,
            self.degradation,
        ))
    }
}
