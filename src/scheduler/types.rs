//! Task, status and configuration types for the scheduler

use crate::intent::IntentLevel;
use crate::pipeline::context::{
    ExecutionContext, ANSWER_PROMPT_KEY, KEYWORDS_PROMPT_KEY, MEMORY_KEY,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Scheduling priority, higher runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TaskPriority(pub u8);

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for TaskPriority {
    fn from(value: u8) -> Self {
        TaskPriority(value)
    }
}

/// Lifecycle state of a submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Poll result for an unknown id, never stored
    NotFound,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Forward-only transitions: queued -> running -> terminal, or queued -> cancelled
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Queued, TaskStatus::Running)
                | (TaskStatus::Queued, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::NotFound => "not_found",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a poller sees for a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskResult {
    pub fn new(status: TaskStatus) -> Self {
        Self {
            status,
            data: None,
            message: None,
        }
    }

    pub fn not_found() -> Self {
        Self::new(TaskStatus::NotFound)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Payload of one RAG task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagRequest {
    pub question: String,
    pub intent: IntentLevel,

    #[serde(default)]
    pub keywords_prompt: Option<String>,

    #[serde(default)]
    pub answer_prompt: Option<String>,

    /// Earlier turns of the conversation, rendered as a transcript
    #[serde(default)]
    pub memory: Option<String>,
}

impl RagRequest {
    pub fn new(question: impl Into<String>, intent: IntentLevel) -> Self {
        Self {
            question: question.into(),
            intent,
            keywords_prompt: None,
            answer_prompt: None,
            memory: None,
        }
    }

    pub fn with_answer_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.answer_prompt = Some(prompt.into());
        self
    }

    pub fn with_memory(mut self, transcript: impl Into<String>) -> Self {
        self.memory = Some(transcript.into());
        self
    }

    pub fn with_keywords_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.keywords_prompt = Some(prompt.into());
        self
    }

    /// Initial pipeline context for this request
    pub fn to_context(&self) -> ExecutionContext {
        let mut context = ExecutionContext::for_query(self.question.clone());
        if let Some(prompt) = &self.keywords_prompt {
            context.insert(KEYWORDS_PROMPT_KEY, prompt.clone());
        }
        if let Some(prompt) = &self.answer_prompt {
            context.insert(ANSWER_PROMPT_KEY, prompt.clone());
        }
        if let Some(transcript) = self.memory.as_deref().filter(|t| !t.is_empty()) {
            context.insert(MEMORY_KEY, transcript);
        }
        context
    }
}

/// Intent level to priority table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityTable {
    pub l1: u8,
    pub l2: u8,
    pub l3: u8,
    pub l4: u8,
}

impl Default for PriorityTable {
    fn default() -> Self {
        // Cheaper intents first
        Self {
            l1: 4,
            l2: 3,
            l3: 2,
            l4: 1,
        }
    }
}

impl PriorityTable {
    pub fn priority_for(&self, level: IntentLevel) -> TaskPriority {
        TaskPriority(match level {
            IntentLevel::L1 => self.l1,
            IntentLevel::L2 => self.l2,
            IntentLevel::L3 => self.l3,
            IntentLevel::L4 => self.l4,
        })
    }
}

/// Worker pool and lifetime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker count
    pub workers: usize,

    /// Ceiling on queue wait plus run time, in milliseconds
    pub task_timeout_ms: u64,

    /// How long terminal results stay pollable, in seconds
    pub result_retention_secs: u64,

    /// Housekeeping sweep period, in milliseconds
    pub housekeeping_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().clamp(1, 4),
            task_timeout_ms: 120_000,
            result_retention_secs: 600,
            housekeeping_interval_ms: 1_000,
        }
    }
}

impl SchedulerConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn result_retention(&self) -> Duration {
        Duration::from_secs(self.result_retention_secs)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms.max(1))
    }
}

/// Why a running task's token was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Preempted,
    Timeout,
    Shutdown,
}

/// Scheduler counters and live gauges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub preempted: u64,
    pub timed_out: u64,
    pub queued: usize,
    pub running: usize,
}
