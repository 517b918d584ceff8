//! Service wiring for the CLI

use crate::config::Config;
use crate::degradation::{DegradationManager, DegradationStatus};
use crate::errors::Result;
use crate::intent::{
    classify_or_fallback, IntentClassification, IntentClassifier, LlmIntentClassifier,
};
use crate::memory::{DialogueMemory, DialogueMessage};
use crate::pipeline::operations::BUILTIN_FALLBACKS;
use crate::scheduler::{
    PipelineRouter, RagRequest, SchedulerSlot, StandardServices, TaskResult, TaskScheduler,
    TaskStatus,
};
use crate::services::{HugeGraphClient, InMemoryIndex, OllamaChatModel, Service};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Configured services, shared degradation state, session memory and a
/// lazily started scheduler
pub struct RagRuntime {
    config: Config,
    degradation: Arc<DegradationManager>,
    classifier: Arc<dyn IntentClassifier>,
    memory: Mutex<DialogueMemory>,
    slot: SchedulerSlot,
}

impl RagRuntime {
    pub fn from_config(config: Config) -> Result<Self> {
        let services = &config.services;
        let timeout = services.request_timeout();

        let llm = Arc::new(OllamaChatModel::new(
            services.ollama_url.clone(),
            services.model.clone(),
            timeout,
        )?);
        let graph = Arc::new(HugeGraphClient::new(
            services.graph_url.clone(),
            services.graph_name.clone(),
            timeout,
        )?);
        let index = match &services.documents {
            Some(path) => load_documents(path)?,
            None => InMemoryIndex::new(),
        };

        let degradation = Arc::new(DegradationManager::with_config(config.degradation.clone()));
        let router = Arc::new(PipelineRouter::standard(
            &StandardServices {
                llm: Service::Llm(llm.clone()),
                graph: Service::Graph(graph),
                vector: Service::Vector(Arc::new(index)),
                fallback_model: services.fallback_model.clone(),
            },
            degradation.clone(),
            services.top_k,
        )?);

        let scheduler_config = config.scheduler.clone();
        let priorities = config.priorities;
        let slot = SchedulerSlot::new(move || {
            TaskScheduler::start(scheduler_config.clone(), priorities, router.clone())
        });

        Ok(Self {
            memory: Mutex::new(DialogueMemory::from_config(&config.memory)),
            config,
            degradation,
            classifier: Arc::new(LlmIntentClassifier::new(llm)),
            slot,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn degradation(&self) -> &Arc<DegradationManager> {
        &self.degradation
    }

    /// Classify, submit and wait for one question.
    ///
    /// Earlier turns of the session ride along as the `memory` context key;
    /// the question and its answer (or failure) are appended afterwards.
    pub async fn ask(
        &self,
        question: &str,
        max_wait: Duration,
        keyword_intent: bool,
        answer_prompt: Option<String>,
    ) -> Result<(String, IntentClassification, TaskResult)> {
        let classifier = (!keyword_intent).then_some(self.classifier.as_ref());
        let classification = classify_or_fallback(classifier, question).await;

        let transcript = {
            let mut memory = self.memory();
            let transcript = memory.build_memory_context();
            memory.add_user_message(question);
            transcript
        };

        let mut request = RagRequest::new(question, classification.level).with_memory(transcript);
        request.answer_prompt = answer_prompt;

        let scheduler = self.slot.get_or_start().await;
        let priority = scheduler.priorities().priority_for(classification.level);
        let id = scheduler.submit(request, priority)?;
        let result = scheduler.wait_for_result(&id, max_wait).await;

        self.memory().add_system_message(reply_text(&result, max_wait));
        Ok((id, classification, result))
    }

    /// Copy of the session transcript, oldest first
    pub fn transcript(&self) -> Vec<DialogueMessage> {
        self.memory().messages().iter().cloned().collect()
    }

    /// Health of every built-in operation and fallback in this process
    pub fn status(&self) -> BTreeMap<String, DegradationStatus> {
        let mut status = self.degradation.snapshot();
        for (primary, fallback) in BUILTIN_FALLBACKS {
            for name in [primary, fallback] {
                status
                    .entry(name.to_string())
                    .or_insert_with(|| self.degradation.get_degradation_status(name));
            }
        }
        status
    }

    pub async fn shutdown(&self) {
        self.slot.stop().await;
    }

    fn memory(&self) -> MutexGuard<'_, DialogueMemory> {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What the session remembers as the system's reply
fn reply_text(result: &TaskResult, max_wait: Duration) -> String {
    match result.status {
        TaskStatus::Completed => result
            .data
            .as_ref()
            .and_then(|data| data.get("answer"))
            .and_then(|answer| answer.as_str())
            .unwrap_or("(no answer produced)")
            .to_string(),
        TaskStatus::Queued | TaskStatus::Running => {
            format!("(no answer within {}s)", max_wait.as_secs())
        }
        status => format!(
            "(task {}: {})",
            status,
            result.message.as_deref().unwrap_or("no details")
        ),
    }
}

/// Index a text file, one document per blank-line separated paragraph
pub fn load_documents(path: &Path) -> Result<InMemoryIndex> {
    let contents = fs::read_to_string(path)?;
    let paragraphs = contents
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(i, p)| (format!("doc-{}", i + 1), p.to_string()));

    Ok(InMemoryIndex::from_documents(paragraphs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::degradation::DegradationLevel;
    use crate::memory::Speaker;
    use serde_json::json;
    use tempfile::TempDir;

    /// Services on a closed local port: every network call is refused
    fn offline_config() -> Config {
        let mut config = Config::default();
        config.services.ollama_url = Some("http://127.0.0.1:9".to_string());
        config.services.graph_url = "http://127.0.0.1:9".to_string();
        config.services.request_timeout_secs = 5;
        config
    }

    #[test]
    fn test_load_documents_by_paragraph() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("docs.txt");
        fs::write(&path, "Huawei was founded in 1987.\n\n\nShenzhen is in Guangdong.\n").unwrap();

        let index = load_documents(&path).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_status_lists_builtin_operations() {
        let runtime = RagRuntime::from_config(Config::default()).unwrap();
        let status = runtime.status();

        assert_eq!(status.len(), 8);
        assert!(status.values().all(|s| s.level == DegradationLevel::Normal));
        runtime.shutdown().await;
    }

    #[test]
    fn test_reply_text_by_status() {
        let wait = Duration::from_secs(3);
        let done = TaskResult::new(TaskStatus::Completed).with_data(json!({"answer": "1987"}));
        assert_eq!(reply_text(&done, wait), "1987");

        let failed = TaskResult::new(TaskStatus::Failed).with_message("graph down");
        assert_eq!(reply_text(&failed, wait), "(task failed: graph down)");

        let pending = TaskResult::new(TaskStatus::Running);
        assert_eq!(reply_text(&pending, wait), "(no answer within 3s)");
    }

    #[tokio::test]
    async fn test_ask_records_both_turns() {
        let runtime = RagRuntime::from_config(offline_config()).unwrap();

        let (_, classification, result) = runtime
            .ask("Who founded Huawei?", Duration::from_secs(30), true, None)
            .await
            .unwrap();
        assert_eq!(classification.level, crate::intent::IntentLevel::L1);
        assert!(result.status.is_terminal());

        let transcript = runtime.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].speaker, Speaker::User);
        assert_eq!(transcript[0].content, "Who founded Huawei?");
        assert_eq!(transcript[1].speaker, Speaker::System);
        assert_eq!(transcript[1].content, reply_text(&result, Duration::from_secs(30)));

        runtime.shutdown().await;
    }
}
