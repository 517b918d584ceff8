//! Task result store

use crate::errors::{RagError, Result};
use crate::scheduler::types::{TaskResult, TaskStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug)]
struct Entry {
    result: TaskResult,
    updated_at: Instant,
}

/// Task id -> latest status, data and message.
///
/// Writers go through [`TaskStore::transition`], which enforces the forward-only
/// status order. Readers poll with [`TaskStore::get`] or park in
/// [`TaskStore::wait`] until a terminal status lands.
#[derive(Debug, Default)]
pub struct TaskStore {
    entries: RwLock<HashMap<String, Entry>>,
    changed: Notify,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_queued(&self, id: &str) {
        self.write().insert(
            id.to_string(),
            Entry {
                result: TaskResult::new(TaskStatus::Queued),
                updated_at: Instant::now(),
            },
        );
        self.changed.notify_waiters();
    }

    /// Move `id` to `status`, replacing data and message
    pub fn transition(
        &self,
        id: &str,
        status: TaskStatus,
        data: Option<Value>,
        message: Option<String>,
    ) -> Result<()> {
        {
            let mut entries = self.write();
            let entry = entries
                .get_mut(id)
                .ok_or_else(|| RagError::TaskNotFound(id.to_string()))?;

            let from = entry.result.status;
            if !from.can_transition_to(status) {
                return Err(RagError::InvalidTransition {
                    from: from.to_string(),
                    to: status.to_string(),
                });
            }

            entry.result = TaskResult {
                status,
                data,
                message,
            };
            entry.updated_at = Instant::now();
        }

        tracing::debug!(task_id = id, %status, "task transition");
        self.changed.notify_waiters();
        Ok(())
    }

    /// Current result, `not_found` for unknown ids
    pub fn get(&self, id: &str) -> TaskResult {
        self.read()
            .get(id)
            .map(|entry| entry.result.clone())
            .unwrap_or_else(TaskResult::not_found)
    }

    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        self.read().get(id).map(|entry| entry.result.status)
    }

    /// Wait until `id` is terminal or `max_wait` elapses; returns the last seen result
    pub async fn wait(&self, id: &str, max_wait: Duration) -> TaskResult {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let current = self.get(id);
            if current.status.is_terminal() || current.status == TaskStatus::NotFound {
                return current;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.get(id);
            }
        }
    }

    /// Drop terminal entries last updated more than `retention` ago
    pub fn purge_expired(&self, retention: Duration) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| {
            !(entry.result.status.is_terminal() && entry.updated_at.elapsed() >= retention)
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
