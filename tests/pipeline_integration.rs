//! End-to-end pipeline runs over stub services

mod common;

use common::{failing_step, ok_step, sample_index, ScriptedLlm, StaticGraph};
use composable_rag::degradation::{DegradationLevel, DegradationManager};
use composable_rag::pipeline::{
    result_key, ExecutionContext, FnOperation, Operation, PipelineBuilder, RunStatus,
};
use composable_rag::services::{
    Service, FALLBACK_MODEL, GRAPH_CLIENT, LLM_SERVICE, VECTOR_INDEX,
};
use composable_rag::{OperationError, RagError};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const QUESTION: &str = "Who founded Huawei?";

fn full_pipeline(
    llm: Arc<ScriptedLlm>,
    graph: Arc<StaticGraph>,
    degradation: Arc<DegradationManager>,
) -> composable_rag::Pipeline {
    PipelineBuilder::new("graph_vector_rag", degradation)
        .with_service(LLM_SERVICE, Service::Llm(llm))
        .with_service(GRAPH_CLIENT, Service::Graph(graph))
        .with_service(VECTOR_INDEX, Service::Vector(Arc::new(sample_index())))
        .with_service(FALLBACK_MODEL, Service::from("template"))
        .add_entity_recognition(true)
        .add_graph_query(true)
        .add_vector_query(3, true)
        .add_result_refinement(true)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_healthy_run_uses_primaries() {
    let llm = ScriptedLlm::healthy();
    let graph = Arc::new(StaticGraph::default());
    let degradation = Arc::new(DegradationManager::new());
    let pipeline = full_pipeline(llm.clone(), graph.clone(), degradation.clone());

    let (ctx, report) = pipeline.execute(ExecutionContext::for_query(QUESTION)).await;

    assert!(report.is_completed());
    assert!(report.fallbacks_used.is_empty());
    assert_eq!(
        report.executed,
        vec!["EntityRecognition", "GraphQuery", "VectorQuery", "ResultRefinement"]
    );
    assert_eq!(llm.calls(), 3);

    let answer = ctx.result_of("ResultRefinement").unwrap();
    assert_eq!(answer["answer"], "Huawei was founded by Ren Zhengfei in 1987.");
    assert_eq!(ctx.result_of("EntityRecognition").unwrap(), &json!(["Huawei", "Ren Zhengfei"]));

    let queries = graph.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].starts_with("g.V()"));
    assert!(degradation.degraded_operations().is_empty());
}

#[tokio::test]
async fn test_model_outage_retries_fallbacks() {
    let llm = ScriptedLlm::healthy();
    llm.set_down(true);
    let graph = Arc::new(StaticGraph::default());
    let degradation = Arc::new(DegradationManager::new());
    let pipeline = full_pipeline(llm.clone(), graph, degradation.clone());

    let (ctx, report) = pipeline.execute(ExecutionContext::for_query(QUESTION)).await;

    assert!(report.is_completed());
    assert_eq!(report.fallbacks_used.len(), 3);
    assert_eq!(report.fallbacks_used["GraphQuery"], "VertexLookup");
    assert!(ctx.contains(&result_key("KeywordExtraction")));
    assert!(!ctx.contains(&result_key("EntityRecognition")));

    let answer = ctx.result_of("TemplateAnswer").unwrap();
    assert!(answer["answer"]
        .as_str()
        .unwrap()
        .starts_with("Relevant information for \"Who founded Huawei?\""));
    assert_eq!(answer["model"], "template");

    // One failure each: below the partial threshold
    let status = degradation.get_degradation_status("ResultRefinement");
    assert_eq!(status.error_count, 1);
    assert!(!status.degraded);
}

#[tokio::test]
async fn test_repeated_outage_substitutes_without_calling_model() {
    let llm = ScriptedLlm::healthy();
    llm.set_down(true);
    let degradation = Arc::new(DegradationManager::new());
    let pipeline = full_pipeline(
        llm.clone(),
        Arc::new(StaticGraph::default()),
        degradation.clone(),
    );

    for run in 1..=3 {
        let (_, report) = pipeline.execute(ExecutionContext::for_query(QUESTION)).await;
        assert!(report.is_completed());
        if run == 3 {
            // Third failure escalates each model-backed step
            assert_eq!(report.degradations.len(), 3);
            assert!(report
                .degradations
                .iter()
                .all(|e| e.level == DegradationLevel::Partial));
        }
    }
    assert_eq!(
        degradation.degraded_operations(),
        vec!["EntityRecognition", "GraphQuery", "ResultRefinement"]
    );

    let calls_before = llm.calls();
    let (ctx, report) = pipeline.execute(ExecutionContext::for_query(QUESTION)).await;
    assert!(report.is_completed());
    assert_eq!(llm.calls(), calls_before);
    assert_eq!(report.fallbacks_used.len(), 3);
    assert!(ctx.contains(&result_key("TemplateAnswer")));

    // Recovery is explicit
    llm.set_down(false);
    degradation.reset_all_degradations();
    let (ctx, report) = pipeline.execute(ExecutionContext::for_query(QUESTION)).await;
    assert!(report.fallbacks_used.is_empty());
    assert!(ctx.contains(&result_key("ResultRefinement")));
}

#[tokio::test]
async fn test_degraded_step_runs_only_its_fallback() {
    let degradation = Arc::new(DegradationManager::new());
    for _ in 0..3 {
        degradation.record_error("A", "flaky");
    }

    let pipeline = PipelineBuilder::new("custom", degradation.clone())
        .add_step(ok_step("A", json!("primary")), Some(ok_step("A2", json!("fallback"))))
        .add_step(ok_step("B", json!("b")), None)
        .build()
        .unwrap();

    let (ctx, report) = pipeline.execute(ExecutionContext::for_query("q")).await;

    assert!(report.is_completed());
    assert_eq!(report.fallbacks_used["A"], "A2");
    assert_eq!(ctx.result_of("A2"), Some(&json!("fallback")));
    assert!(ctx.result_of("A").is_none());
    assert_eq!(report.degradations[0].operation, "A");
    assert_eq!(report.degradations[0].level, DegradationLevel::Partial);
}

#[tokio::test]
async fn test_substituted_fallback_failure_aborts_without_primary() {
    let degradation = Arc::new(DegradationManager::new());
    for _ in 0..3 {
        degradation.record_error("B", "timeout");
    }

    let primary_calls = Arc::new(AtomicUsize::new(0));
    let counted = primary_calls.clone();
    let primary: Arc<dyn Operation> = Arc::new(FnOperation::new("B", move |_ctx: ExecutionContext| {
        counted.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, OperationError>(json!("primary")) }
    }));

    let pipeline = PipelineBuilder::new("custom", degradation.clone())
        .add_step(ok_step("A", json!("a")), None)
        .add_step(primary, Some(failing_step("B2", "index offline")))
        .add_step(ok_step("C", json!("c")), None)
        .build()
        .unwrap();

    let (ctx, report) = pipeline.execute(ExecutionContext::for_query("q")).await;

    assert_eq!(
        report.status,
        RunStatus::Aborted {
            operation: "B".to_string(),
            reason: "index offline".to_string(),
        }
    );
    assert_eq!(primary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.fallbacks_used["B"], "B2");
    assert!(report.operation_times.contains_key("A"));
    assert!(!report.operation_times.contains_key("C"));
    assert_eq!(ctx.result_of("A"), Some(&json!("a")));

    assert_eq!(degradation.get_degradation_status("B2").error_count, 1);
    assert_eq!(degradation.get_degradation_status("B").error_count, 3);
}

#[tokio::test]
async fn test_failure_keeps_earlier_results() {
    let degradation = Arc::new(DegradationManager::new());
    let pipeline = PipelineBuilder::new("custom", degradation.clone())
        .add_step(ok_step("A", json!({"rows": 2})), None)
        .add_step(failing_step("B", "graph unreachable"), None)
        .add_step(ok_step("C", json!("never")), None)
        .build()
        .unwrap();

    let (ctx, report) = pipeline.execute(ExecutionContext::for_query("q")).await;

    assert_eq!(
        report.status,
        RunStatus::Aborted {
            operation: "B".to_string(),
            reason: "graph unreachable".to_string(),
        }
    );
    assert!(report.operation_times.contains_key("A"));
    assert!(!report.operation_times.contains_key("C"));
    assert_eq!(ctx.result_of("A"), Some(&json!({"rows": 2})));
    assert!(ctx.result_of("C").is_none());
    assert_eq!(degradation.get_degradation_status("B").error_count, 1);

    match report.error() {
        Some(RagError::PipelineAborted { operation, .. }) => assert_eq!(operation, "B"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_builder_rejects_missing_service() {
    let err = PipelineBuilder::new("broken", Arc::new(DegradationManager::new()))
        .add_graph_query(true)
        .build()
        .unwrap_err();

    assert!(matches!(err, RagError::InvalidPipeline(_)));
    assert!(err.to_string().contains("GraphQuery"));
}
