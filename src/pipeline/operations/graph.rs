//! Graph retrieval: LLM-written Gremlin, or a templated vertex lookup

use crate::errors::OperationError;
use crate::pipeline::context::ExecutionContext;
use crate::pipeline::operation::{Operation, OperationResult};
use crate::pipeline::operations::{entities_from, render_template, GRAPH_QUERY, VERTEX_LOOKUP};
use crate::services::{ServiceRegistry, GRAPH_CLIENT, LLM_SERVICE};
use async_trait::async_trait;
use serde_json::json;

/// Paths returned by the templated lookup
pub const DEFAULT_PATH_LIMIT: usize = 20;

const GREMLIN_PROMPT: &str = "You write Apache TinkerPop Gremlin queries for a property \
graph whose vertices carry a 'name' property. Write ONE read-only query that \
retrieves the paths relevant to the question. Reply with the query only.\n\n\
Entities: {entities}\nQuestion: {question}\nGremlin:";

const WRITE_STEPS: &[&str] = &["addV(", "addE(", "drop(", "property(", "system."];

/// Strip markdown fences and a leading label from an LLM reply
pub fn clean_gremlin(reply: &str) -> String {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim_start_matches(|c: char| c.is_alphanumeric());
        text = text.trim_end().trim_end_matches("```");
    }
    let text = text.trim();
    text.strip_prefix("Gremlin:").unwrap_or(text).trim().to_string()
}

/// Templated lookup of `entities` by name with their one-hop neighbourhood
pub fn vertex_lookup_query(entities: &[String], limit: usize) -> String {
    let names = entities
        .iter()
        .map(|e| format!("'{}'", e.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "g.V().has('name', within({})).bothE().otherV().path().by('name').by(label).limit({})",
        names, limit
    )
}

/// LLM generates the Gremlin text, the graph client runs it
#[derive(Debug, Default)]
pub struct GraphQuery;

#[async_trait]
impl Operation for GraphQuery {
    fn name(&self) -> &str {
        GRAPH_QUERY
    }

    fn required_services(&self) -> Vec<&'static str> {
        vec![LLM_SERVICE, GRAPH_CLIENT]
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        services: &ServiceRegistry,
    ) -> OperationResult {
        let llm = services.llm(LLM_SERVICE)?;
        let graph = services.graph(GRAPH_CLIENT)?;

        let entities = entities_from(context).join(", ");
        let prompt = render_template(
            GREMLIN_PROMPT,
            &[
                ("entities", entities.as_str()),
                ("question", context.query().unwrap_or_default()),
            ],
        );

        let gremlin = clean_gremlin(&llm.generate(&prompt).await?);
        if gremlin.is_empty() {
            return Err(OperationError::new("empty gremlin query generated"));
        }
        if WRITE_STEPS.iter().any(|step| gremlin.contains(step)) {
            return Err(OperationError::new(format!(
                "generated query is not read-only: {}",
                gremlin
            )));
        }

        let data = graph.query(&gremlin).await?;
        Ok(json!({ "gremlin": gremlin, "data": data }))
    }
}

/// Name lookup without the LLM
#[derive(Debug)]
pub struct VertexLookup {
    limit: usize,
}

impl VertexLookup {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for VertexLookup {
    fn default() -> Self {
        Self::new(DEFAULT_PATH_LIMIT)
    }
}

#[async_trait]
impl Operation for VertexLookup {
    fn name(&self) -> &str {
        VERTEX_LOOKUP
    }

    fn required_services(&self) -> Vec<&'static str> {
        vec![GRAPH_CLIENT]
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        services: &ServiceRegistry,
    ) -> OperationResult {
        let graph = services.graph(GRAPH_CLIENT)?;

        let entities = entities_from(context);
        if entities.is_empty() {
            return Err(OperationError::new("no entities to look up"));
        }

        let gremlin = vertex_lookup_query(&entities, self.limit);
        let data = graph.query(&gremlin).await?;
        Ok(json!({ "gremlin": gremlin, "data": data }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::services::{GraphClient, LanguageModel, Service};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    struct Fixed(&'static str);

    #[async_trait]
    impl LanguageModel for Fixed {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Default)]
    struct RecordingGraph {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GraphClient for RecordingGraph {
        async fn query(&self, gremlin: &str) -> Result<Value> {
            self.queries.lock().unwrap().push(gremlin.to_string());
            Ok(json!(["Huawei -> founded_by -> Ren Zhengfei"]))
        }
    }

    fn services(reply: &'static str, graph: Arc<RecordingGraph>) -> ServiceRegistry {
        let mut services = ServiceRegistry::new();
        services.register(LLM_SERVICE, Service::Llm(Arc::new(Fixed(reply))));
        services.register(GRAPH_CLIENT, Service::Graph(graph));
        services
    }

    #[test]
    fn test_clean_gremlin() {
        assert_eq!(clean_gremlin("```gremlin\ng.V().limit(1)\n```"), "g.V().limit(1)");
        assert_eq!(clean_gremlin("Gremlin: g.V()"), "g.V()");
    }

    #[test]
    fn test_vertex_lookup_query_escapes() {
        let q = vertex_lookup_query(&["O'Neil".to_string(), "Huawei".to_string()], 5);
        assert_eq!(
            q,
            concat!(
                "g.V().has('name', within('O\\'Neil','Huawei'))",
                ".bothE().otherV().path().by('name').by(label).limit(5)"
            )
        );
    }

    #[tokio::test]
    async fn test_graph_query_runs_generated_gremlin() {
        let graph = Arc::new(RecordingGraph::default());
        let services = services("```\ng.V().has('name','Huawei').out()\n```", graph.clone());

        let ctx = ExecutionContext::for_query("Who founded Huawei?");
        let out = GraphQuery.execute(&ctx, &services).await.unwrap();

        assert_eq!(out["gremlin"], "g.V().has('name','Huawei').out()");
        assert_eq!(graph.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_graph_query_rejects_writes() {
        let graph = Arc::new(RecordingGraph::default());
        let services = services("g.V().drop()", graph.clone());

        let ctx = ExecutionContext::for_query("Remove everything");
        let err = GraphQuery.execute(&ctx, &services).await.unwrap_err();

        assert!(err.reason.contains("not read-only"));
        assert!(graph.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vertex_lookup_uses_entities() {
        let graph = Arc::new(RecordingGraph::default());
        let services = services("unused", graph.clone());

        let ctx = ExecutionContext::for_query("Who founded Huawei?");
        let out = VertexLookup::new(3).execute(&ctx, &services).await.unwrap();

        assert!(out["gremlin"].as_str().unwrap().contains("within('founded','huawei')"));
        assert_eq!(out["data"][0], "Huawei -> founded_by -> Ren Zhengfei");
    }
}
