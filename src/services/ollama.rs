//! Ollama-compatible chat model adapter
//!
//! Non-streaming `POST /api/generate`; the pipeline only needs the final text.

use crate::errors::{RagError, Result};
use crate::services::LanguageModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Default Ollama endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP client for a single Ollama model
pub struct OllamaChatModel {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaChatModel {
    /// Create a new chat model client
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (default: http://127.0.0.1:11434)
    /// * `model` - Model tag, e.g. "qwen2.5:7b-instruct"
    /// * `timeout` - Per-request timeout
    pub fn new(
        base_url: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OllamaChatModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RagError::Generic(format!(
                "Ollama API error: {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response.trim().to_string())
    }
}
