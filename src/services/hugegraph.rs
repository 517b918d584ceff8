//! HugeGraph Gremlin endpoint adapter

use crate::errors::{RagError, Result};
use crate::services::GraphClient;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP client for `POST /apis/gremlin`
pub struct HugeGraphClient {
    client: Client,
    base_url: String,
    graph: String,
}

impl HugeGraphClient {
    pub fn new(
        base_url: impl Into<String>,
        graph: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            graph: graph.into(),
        })
    }

    fn request_body(&self, gremlin: &str) -> Value {
        json!({
            "gremlin": gremlin,
            "bindings": {},
            "language": "gremlin-groovy",
            "aliases": {
                "graph": self.graph,
                "g": format!("__g_{}", self.graph),
            },
        })
    }
}

#[async_trait]
impl GraphClient for HugeGraphClient {
    async fn query(&self, gremlin: &str) -> Result<Value> {
        let url = format!("{}/apis/gremlin", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(gremlin))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Generic(format!(
                "HugeGraph error {}: {}",
                status, text
            )));
        }

        let mut body: Value = response.json().await?;
        Ok(body
            .pointer_mut("/result/data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}
