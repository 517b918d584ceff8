//! Built-in RAG micro-operations
//!
//! Each primary has a lighter fallback that avoids the service most likely
//! to be degraded (usually the LLM):
//!
//! | Primary | Fallback |
//! |---|---|
//! | `EntityRecognition` | `KeywordExtraction` |
//! | `GraphQuery` | `VertexLookup` |
//! | `VectorQuery` | `KeywordMatch` |
//! | `ResultRefinement` | `TemplateAnswer` |

pub mod entity;
pub mod graph;
pub mod refinement;
pub mod vector;

use crate::pipeline::context::ExecutionContext;
use serde_json::Value;

pub use entity::{EntityRecognition, KeywordExtraction};
pub use graph::{GraphQuery, VertexLookup};
pub use refinement::{ResultRefinement, TemplateAnswer};
pub use vector::{KeywordMatch, VectorQuery};

pub const ENTITY_RECOGNITION: &str = "EntityRecognition";
pub const KEYWORD_EXTRACTION: &str = "KeywordExtraction";
pub const GRAPH_QUERY: &str = "GraphQuery";
pub const VERTEX_LOOKUP: &str = "VertexLookup";
pub const VECTOR_QUERY: &str = "VectorQuery";
pub const KEYWORD_MATCH: &str = "KeywordMatch";
pub const RESULT_REFINEMENT: &str = "ResultRefinement";
pub const TEMPLATE_ANSWER: &str = "TemplateAnswer";

/// Primary operations, in the order a full graph+vector pipeline runs them
pub const BUILTIN_OPERATIONS: &[&str] = &[
    ENTITY_RECOGNITION,
    GRAPH_QUERY,
    VECTOR_QUERY,
    RESULT_REFINEMENT,
];

/// Each primary paired with its fallback
pub const BUILTIN_FALLBACKS: &[(&str, &str)] = &[
    (ENTITY_RECOGNITION, KEYWORD_EXTRACTION),
    (GRAPH_QUERY, VERTEX_LOOKUP),
    (VECTOR_QUERY, KEYWORD_MATCH),
    (RESULT_REFINEMENT, TEMPLATE_ANSWER),
];

/// Replace `{key}` placeholders in `template`
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// Entities produced earlier in the run, or keywords of the question
pub fn entities_from(context: &ExecutionContext) -> Vec<String> {
    let from_step = context
        .first_result_of(&[ENTITY_RECOGNITION, KEYWORD_EXTRACTION])
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .filter(|items| !items.is_empty());

    from_step.unwrap_or_else(|| {
        context
            .query()
            .map(entity::extract_keywords)
            .unwrap_or_default()
    })
}

/// Knowledge lines gathered by graph and vector steps
pub fn retrieved_knowledge(context: &ExecutionContext) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(graph) = context.first_result_of(&[GRAPH_QUERY, VERTEX_LOOKUP]) {
        if let Some(items) = graph.get("data").and_then(Value::as_array) {
            lines.extend(items.iter().map(value_line));
        }
    }

    if let Some(docs) = context
        .first_result_of(&[VECTOR_QUERY, KEYWORD_MATCH])
        .and_then(Value::as_array)
    {
        lines.extend(
            docs.iter()
                .filter_map(|doc| doc.get("content").and_then(Value::as_str))
                .map(str::to_string),
        );
    }

    lines
}

fn value_line(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
