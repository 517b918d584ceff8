//! Sequential pipeline execution with degradation-aware fallbacks

use crate::degradation::DegradationManager;
use crate::pipeline::context::ExecutionContext;
use crate::pipeline::operation::{Operation, PipelineStep};
use crate::pipeline::report::{ExecutionReport, RunStatus};
use crate::services::ServiceRegistry;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Immutable step sequence produced by `PipelineBuilder::build`
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    steps: Vec<PipelineStep>,
    services: ServiceRegistry,
    degradation: Arc<DegradationManager>,
}

impl Pipeline {
    pub(crate) fn new(
        name: String,
        steps: Vec<PipelineStep>,
        services: ServiceRegistry,
        degradation: Arc<DegradationManager>,
    ) -> Self {
        Self {
            name,
            steps,
            services,
            degradation,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(PipelineStep::name).collect()
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn degradation(&self) -> &Arc<DegradationManager> {
        &self.degradation
    }

    /// Run every step to completion or abort
    pub async fn execute(&self, context: ExecutionContext) -> (ExecutionContext, ExecutionReport) {
        self.execute_with_cancel(context, &CancellationToken::new()).await
    }

    /// Run the steps in order, checking `cancel` before each one.
    ///
    /// Never returns an error: an aborted or cancelled run is reported through
    /// `ExecutionReport::status` together with everything executed before it.
    pub async fn execute_with_cancel(
        &self,
        mut context: ExecutionContext,
        cancel: &CancellationToken,
    ) -> (ExecutionContext, ExecutionReport) {
        let started = Instant::now();
        let mut report = ExecutionReport::default();

        for step in &self.steps {
            if cancel.is_cancelled() {
                tracing::info!(pipeline = %self.name, next_step = step.name(), "run cancelled");
                report.status = RunStatus::Cancelled {
                    next_step: step.name().to_string(),
                };
                break;
            }

            if let Err(reason) = self.run_step(step, &mut context, &mut report).await {
                tracing::warn!(
                    pipeline = %self.name,
                    step = step.name(),
                    %reason,
                    "pipeline aborted"
                );
                report.status = RunStatus::Aborted {
                    operation: step.name().to_string(),
                    reason,
                };
                break;
            }
        }

        report.total_time = started.elapsed().as_secs_f64();
        (context, report)
    }

    async fn run_step(
        &self,
        step: &PipelineStep,
        context: &mut ExecutionContext,
        report: &mut ExecutionReport,
    ) -> Result<(), String> {
        let health = self.degradation.get_degradation_status(step.name());

        let mut fallback_tried = false;
        let first: &Arc<dyn Operation> = match (health.degraded, step.fallback()) {
            (true, Some(fallback)) => {
                tracing::info!(
                    step = step.name(),
                    fallback = fallback.name(),
                    level = %health.level,
                    "degraded, substituting fallback"
                );
                report.record_degradation(step.name(), health.level, health.reason_str());
                report
                    .fallbacks_used
                    .insert(step.name().to_string(), fallback.name().to_string());
                fallback_tried = true;
                fallback
            }
            (true, None) => {
                report.record_degradation(step.name(), health.level, health.reason_str());
                step.operation()
            }
            (false, _) => step.operation(),
        };

        let reason = match self.attempt(first.as_ref(), context, report).await {
            Ok(()) => {
                if !fallback_tried {
                    self.degradation.record_success(step.name());
                }
                return Ok(());
            }
            Err(reason) => reason,
        };

        self.record_failure(report, first.name(), &reason);

        let fallback = match step.fallback() {
            Some(fallback) if !fallback_tried => fallback,
            _ => return Err(reason),
        };

        tracing::info!(
            step = step.name(),
            fallback = fallback.name(),
            %reason,
            "retrying with fallback"
        );
        report
            .fallbacks_used
            .insert(step.name().to_string(), fallback.name().to_string());

        self.attempt(fallback.as_ref(), context, report)
            .await
            .map_err(|fallback_reason| {
                self.record_failure(report, fallback.name(), &fallback_reason);
                fallback_reason
            })
    }

    /// Count the error and note a level change in this run's report
    fn record_failure(&self, report: &mut ExecutionReport, operation: &str, reason: &str) {
        let before = self.degradation.get_degradation_status(operation);
        let after = self.degradation.record_error(operation, reason);
        if after.degraded && after.level > before.level {
            report.record_degradation(operation, after.level, after.reason_str());
        }
    }

    async fn attempt(
        &self,
        operation: &dyn Operation,
        context: &mut ExecutionContext,
        report: &mut ExecutionReport,
    ) -> Result<(), String> {
        let started = Instant::now();
        let output = operation
            .execute(context, &self.services)
            .await
            .map_err(|e| e.reason)?;

        let elapsed = started.elapsed().as_secs_f64();
        tracing::debug!(operation = operation.name(), elapsed, "operation finished");

        context.set_result(operation.name(), output);
        report.record_time(operation.name(), elapsed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::degradation::DegradationLevel;
    use crate::errors::OperationError;
    use crate::pipeline::builder::PipelineBuilder;
    use crate::pipeline::operation::FnOperation;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok_op(name: &'static str, value: Value) -> Arc<dyn Operation> {
        Arc::new(FnOperation::new(name, move |_ctx: ExecutionContext| {
            let value = value.clone();
            async move { Ok::<_, OperationError>(value) }
        }))
    }

    fn failing_op(name: &'static str, reason: &'static str) -> Arc<dyn Operation> {
        Arc::new(FnOperation::new(name, move |_ctx: ExecutionContext| async move {
            Err::<Value, _>(OperationError::new(reason))
        }))
    }

    #[tokio::test]
    async fn test_sequential_results_visible_downstream() {
        let manager = Arc::new(DegradationManager::new());
        let read_upstream = |ctx: ExecutionContext| async move {
            let upstream = ctx.result_of("A").cloned().unwrap_or(Value::Null);
            Ok::<_, OperationError>(json!({ "saw": upstream }))
        };
        let reader: Arc<dyn Operation> = Arc::new(FnOperation::new("B", read_upstream));

        let pipeline = PipelineBuilder::new("seq", manager)
            .add_step(ok_op("A", json!(1)), None)
            .add_step(reader, None)
            .build()
            .unwrap();

        let (ctx, report) = pipeline.execute(ExecutionContext::for_query("q")).await;
        assert!(report.is_completed());
        assert_eq!(report.executed, vec!["A", "B"]);
        assert_eq!(ctx.result_of("B").unwrap()["saw"], 1);
    }

    #[tokio::test]
    async fn test_degraded_step_uses_fallback() {
        let manager = Arc::new(DegradationManager::new());
        for _ in 0..3 {
            manager.record_error("A", "timeout");
        }

        let pipeline = PipelineBuilder::new("fallback", manager.clone())
            .add_step(failing_op("A", "should not run"), Some(ok_op("A_lite", json!("lite"))))
            .build()
            .unwrap();

        let (ctx, report) = pipeline.execute(ExecutionContext::new()).await;
        assert!(report.is_completed());
        assert_eq!(report.fallbacks_used.get("A").map(String::as_str), Some("A_lite"));
        assert_eq!(report.degradations[0].level, DegradationLevel::Partial);
        assert_eq!(ctx.result_of("A_lite"), Some(&json!("lite")));
        assert!(ctx.result_of("A").is_none());
        assert_eq!(manager.get_degradation_status("A").error_count, 3);
    }

    #[tokio::test]
    async fn test_failure_retries_fallback_once() {
        let manager = Arc::new(DegradationManager::new());
        let pipeline = PipelineBuilder::new("retry", manager.clone())
            .add_step(failing_op("A", "boom"), Some(ok_op("A_lite", json!(true))))
            .add_step(ok_op("B", json!(2)), None)
            .build()
            .unwrap();

        let (ctx, report) = pipeline.execute(ExecutionContext::new()).await;
        assert!(report.is_completed());
        assert_eq!(report.executed, vec!["A_lite", "B"]);
        assert_eq!(manager.get_degradation_status("A").error_count, 1);
        assert_eq!(ctx.result_of("B"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_abort_preserves_prior_results() {
        let manager = Arc::new(DegradationManager::new());
        let pipeline = PipelineBuilder::new("abort", manager)
            .add_step(ok_op("A", json!("a")), None)
            .add_step(failing_op("B", "graph down"), Some(failing_op("B_lite", "also down")))
            .add_step(ok_op("C", json!("c")), None)
            .build()
            .unwrap();

        let (ctx, report) = pipeline.execute(ExecutionContext::new()).await;
        assert_eq!(
            report.status,
            RunStatus::Aborted {
                operation: "B".to_string(),
                reason: "also down".to_string()
            }
        );
        assert_eq!(ctx.result_of("A"), Some(&json!("a")));
        assert!(ctx.result_of("C").is_none());
    }

    #[tokio::test]
    async fn test_degraded_without_fallback_fails_open() {
        let manager = Arc::new(DegradationManager::new());
        for _ in 0..3 {
            manager.record_error("A", "slow");
        }

        let pipeline = PipelineBuilder::new("open", manager)
            .add_step(ok_op("A", json!(1)), None)
            .build()
            .unwrap();

        let (_, report) = pipeline.execute(ExecutionContext::new()).await;
        assert!(report.is_completed());
        assert!(report.fallbacks_used.is_empty());
        assert_eq!(report.degradations.len(), 1);
        assert_eq!(report.degradations[0].reason, "slow");
    }

    #[tokio::test]
    async fn test_escalation_recorded_in_report() {
        let manager = Arc::new(DegradationManager::new());
        manager.record_error("A", "timeout");
        manager.record_error("A", "timeout");

        let pipeline = PipelineBuilder::new("escalate", manager)
            .add_step(failing_op("A", "timeout"), None)
            .build()
            .unwrap();

        let (_, report) = pipeline.execute(ExecutionContext::new()).await;
        assert!(!report.is_completed());
        assert_eq!(report.degradations.len(), 1);
        assert_eq!(report.degradations[0].level, DegradationLevel::Partial);
    }

    #[tokio::test]
    async fn test_cancel_stops_at_step_boundary() {
        let manager = Arc::new(DegradationManager::new());
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let cancelling: Arc<dyn Operation> = {
            let token = token.clone();
            let calls = calls.clone();
            Arc::new(FnOperation::new("A", move |_ctx: ExecutionContext| {
                let token = token.clone();
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    token.cancel();
                    Ok::<_, OperationError>(json!("done"))
                }
            }))
        };

        let pipeline = PipelineBuilder::new("cancel", manager.clone())
            .add_step(cancelling, None)
            .add_step(failing_op("B", "never"), None)
            .build()
            .unwrap();

        let (ctx, report) = pipeline
            .execute_with_cancel(ExecutionContext::new(), &token)
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.result_of("A"), Some(&json!("done")));
        assert_eq!(
            report.status,
            RunStatus::Cancelled {
                next_step: "B".to_string()
            }
        );
        assert_eq!(manager.get_degradation_status("B").error_count, 0);
    }

    #[tokio::test]
    async fn test_success_resets_streak() {
        let manager = Arc::new(DegradationManager::new());
        manager.record_error("A", "flaky");
        manager.record_error("A", "flaky");

        let pipeline = PipelineBuilder::new("streak", manager.clone())
            .add_step(ok_op("A", json!(1)), None)
            .build()
            .unwrap();

        pipeline.execute(ExecutionContext::new()).await;
        assert_eq!(manager.get_degradation_status("A").error_count, 0);
    }
}
