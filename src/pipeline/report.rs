//! Per-run execution report

use crate::degradation::DegradationLevel;
use crate::errors::RagError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Degradation observed during one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradationEvent {
    pub operation: String,
    pub level: DegradationLevel,
    pub reason: String,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step produced a result
    Completed,

    /// Chain halted after the primary and fallback (if any) failed
    Aborted { operation: String, reason: String },

    /// Cancellation observed at a step boundary before `next_step`
    Cancelled { next_step: String },
}

/// Timing, fallback and degradation record for one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Seconds spent in each operation that completed
    pub operation_times: HashMap<String, f64>,

    /// Step name -> fallback operation run in its place
    pub fallbacks_used: HashMap<String, String>,

    /// Degradations seen this run, in order
    pub degradations: Vec<DegradationEvent>,

    /// Names of completed operations in execution order
    pub executed: Vec<String>,

    pub status: RunStatus,

    /// When the run began
    pub started_at: DateTime<Utc>,

    /// Wall time of the whole run in seconds
    pub total_time: f64,
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self {
            operation_times: HashMap::new(),
            fallbacks_used: HashMap::new(),
            degradations: Vec::new(),
            executed: Vec::new(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            total_time: 0.0,
        }
    }
}

impl ExecutionReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, RunStatus::Cancelled { .. })
    }

    pub(crate) fn record_time(&mut self, operation: &str, seconds: f64) {
        self.operation_times.insert(operation.to_string(), seconds);
        self.executed.push(operation.to_string());
    }

    pub(crate) fn record_degradation(
        &mut self,
        operation: &str,
        level: DegradationLevel,
        reason: &str,
    ) {
        self.degradations.push(DegradationEvent {
            operation: operation.to_string(),
            level,
            reason: reason.to_string(),
        });
    }

    /// Error equivalent of a non-completed status
    pub fn error(&self) -> Option<RagError> {
        match &self.status {
            RunStatus::Completed => None,
            RunStatus::Aborted { operation, reason } => Some(RagError::PipelineAborted {
                operation: operation.clone(),
                reason: reason.clone(),
            }),
            RunStatus::Cancelled { next_step } => Some(RagError::TaskCancelled {
                reason: format!("cancelled before step '{}'", next_step),
            }),
        }
    }

    /// Human-readable summary for logs and the CLI
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Started {} | total time: {:.2}s",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.total_time
        )];

        for op in &self.executed {
            let secs = self.operation_times.get(op).copied().unwrap_or_default();
            lines.push(format!("- {}: {:.2}s", op, secs));
        }

        if !self.fallbacks_used.is_empty() {
            let mut fallbacks: Vec<_> = self.fallbacks_used.iter().collect();
            fallbacks.sort();
            lines.push("Fallbacks:".to_string());
            for (op, fallback) in fallbacks {
                lines.push(format!("- {} -> {}", op, fallback));
            }
        }

        if !self.degradations.is_empty() {
            lines.push("Degradations:".to_string());
            for event in &self.degradations {
                lines.push(format!(
                    "- {} ({}): {}",
                    event.operation, event.level, event.reason
                ));
            }
        }

        match &self.status {
            RunStatus::Completed => {}
            RunStatus::Aborted { operation, reason } => {
                lines.push(format!("Aborted at {}: {}", operation, reason))
            }
            RunStatus::Cancelled { next_step } => {
                lines.push(format!("Cancelled before {}", next_step))
            }
        }

        lines.join("\n")
    }
}
