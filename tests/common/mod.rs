//! Shared test doubles for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use composable_rag::errors::{OperationError, RagError, Result};
use composable_rag::pipeline::{ExecutionContext, FnOperation, Operation};
use composable_rag::services::{GraphClient, InMemoryIndex, LanguageModel};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Language model that answers by prompt shape and can be switched off
#[derive(Default)]
pub struct ScriptedLlm {
    down: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(RagError::Generic("connection refused".to_string()));
        }

        let reply = if prompt.ends_with("KEYWORDS:") {
            "Huawei, Ren Zhengfei"
        } else if prompt.ends_with("Gremlin:") {
            "g.V().has('name','Huawei').bothE().otherV().path()"
        } else if prompt.ends_with("Answer:") {
            "Huawei was founded by Ren Zhengfei in 1987."
        } else {
            "L1"
        };
        Ok(reply.to_string())
    }
}

/// Graph client returning fixed paths and recording every query
#[derive(Default)]
pub struct StaticGraph {
    pub queries: Mutex<Vec<String>>,
}

#[async_trait]
impl GraphClient for StaticGraph {
    async fn query(&self, gremlin: &str) -> Result<Value> {
        self.queries.lock().unwrap().push(gremlin.to_string());
        Ok(json!(["Huawei -> founded_by -> Ren Zhengfei"]))
    }
}

pub fn sample_index() -> InMemoryIndex {
    InMemoryIndex::from_documents(vec![
        ("d1", "Huawei was founded in 1987 by Ren Zhengfei"),
        ("d2", "Shenzhen is a city in Guangdong"),
        ("d3", "Huawei headquarters are in Shenzhen"),
    ])
}

/// Step that sleeps for `delay` and reports its name
pub fn slow_step(name: &'static str, delay: Duration) -> Arc<dyn Operation> {
    Arc::new(FnOperation::new(name, move |_ctx: ExecutionContext| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, OperationError>(json!({ "answer": name }))
    }))
}

pub fn ok_step(name: &'static str, value: Value) -> Arc<dyn Operation> {
    Arc::new(FnOperation::new(name, move |_ctx: ExecutionContext| {
        let value = value.clone();
        async move { Ok::<_, OperationError>(value) }
    }))
}

pub fn failing_step(name: &'static str, reason: &'static str) -> Arc<dyn Operation> {
    Arc::new(FnOperation::new(name, move |_ctx: ExecutionContext| async move {
        Err::<Value, _>(OperationError::new(reason))
    }))
}

/// Step that sleeps for `delay` and then fails with `reason`
pub fn slow_failing_step(
    name: &'static str,
    delay: Duration,
    reason: &'static str,
) -> Arc<dyn Operation> {
    Arc::new(FnOperation::new(name, move |_ctx: ExecutionContext| async move {
        tokio::time::sleep(delay).await;
        Err::<Value, _>(OperationError::new(reason))
    }))
}
