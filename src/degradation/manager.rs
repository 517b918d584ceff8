//! Degradation manager: per-operation health ledger
//!
//! Shared by every pipeline execution and scheduler worker. All updates to a
//! record (counter, level, reason) happen under one write lock so concurrent
//! failures can neither lose increments nor skip levels.

use crate::degradation::types::{DegradationLevel, DegradationStatus, OperationHealth};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Degradation thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Streak length that moves NORMAL to PARTIAL
    pub partial_threshold: u32,

    /// Streak length that moves PARTIAL to SEVERE
    pub severe_threshold: u32,

    /// Restart a streak whose last error is older than this
    pub streak_decay_secs: Option<u64>,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            partial_threshold: 3,
            severe_threshold: 6,
            streak_decay_secs: None,
        }
    }
}

impl DegradationConfig {
    /// Threshold that must be reached to leave `level`
    fn threshold_for(&self, level: DegradationLevel) -> Option<u32> {
        match level {
            DegradationLevel::Normal => Some(self.partial_threshold),
            DegradationLevel::Partial => Some(self.severe_threshold),
            DegradationLevel::Severe => None,
        }
    }

    fn streak_decay(&self) -> Option<Duration> {
        self.streak_decay_secs.map(Duration::from_secs)
    }
}

/// Process-scoped health tracker, injected as `Arc<DegradationManager>`
#[derive(Debug, Default)]
pub struct DegradationManager {
    config: DegradationConfig,
    operations: RwLock<HashMap<String, OperationHealth>>,
}

impl DegradationManager {
    /// Create manager with default thresholds
    pub fn new() -> Self {
        Self::with_config(DegradationConfig::default())
    }

    /// Create manager with custom thresholds
    pub fn with_config(config: DegradationConfig) -> Self {
        Self {
            config,
            operations: RwLock::new(HashMap::new()),
        }
    }

    /// Record a failure of `operation` and return its updated status.
    ///
    /// The level moves up at most one step per call.
    pub fn record_error(&self, operation: &str, reason: &str) -> DegradationStatus {
        let now = Instant::now();
        let mut operations = self.write();
        let health = operations.entry(operation.to_string()).or_default();

        if let (Some(decay), Some(last)) = (self.config.streak_decay(), health.last_error_at) {
            if now.duration_since(last) > decay {
                health.error_count = 0;
            }
        }

        health.error_count = health.error_count.saturating_add(1);
        health.reason = Some(reason.to_string());
        health.last_error_at = Some(now);

        if let Some(threshold) = self.config.threshold_for(health.level) {
            if health.error_count >= threshold {
                let from = health.level;
                health.level = from.escalate();
                health.degraded = true;
                tracing::warn!(
                    operation,
                    from = %from,
                    to = %health.level,
                    error_count = health.error_count,
                    reason,
                    "operation degraded"
                );
            }
        }

        health.status()
    }

    /// End the current error streak. Level and degraded flag are untouched.
    pub fn record_success(&self, operation: &str) {
        let mut operations = self.write();
        if let Some(health) = operations.get_mut(operation) {
            health.error_count = 0;
            health.last_error_at = None;
        }
    }

    /// Current status; unknown operations report NORMAL
    pub fn get_degradation_status(&self, operation: &str) -> DegradationStatus {
        self.read()
            .get(operation)
            .map(OperationHealth::status)
            .unwrap_or_default()
    }

    /// Convenience for `get_degradation_status(op).degraded`
    pub fn is_degraded(&self, operation: &str) -> bool {
        self.get_degradation_status(operation).degraded
    }

    /// Clear every tracked operation back to NORMAL, keeping the names
    pub fn reset_all_degradations(&self) {
        let mut operations = self.write();
        for health in operations.values_mut() {
            health.reset();
        }
        tracing::info!(operations = operations.len(), "all degradations reset");
    }

    /// Consistent copy of every tracked operation, sorted by name
    pub fn snapshot(&self) -> BTreeMap<String, DegradationStatus> {
        self.read()
            .iter()
            .map(|(name, health)| (name.clone(), health.status()))
            .collect()
    }

    /// Names of operations currently degraded
    pub fn degraded_operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, health)| health.degraded)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Get configuration
    pub fn config(&self) -> &DegradationConfig {
        &self.config
    }

    // A panic while holding the lock leaves the map intact, so poisoning is
    // recovered instead of surfaced.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, OperationHealth>> {
        self.operations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, OperationHealth>> {
        self.operations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
