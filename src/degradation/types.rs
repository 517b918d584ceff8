//! Degradation type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Ordinal severity of an operation's unreliability
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Operation is healthy
    #[default]
    Normal,

    /// Operation is unreliable, prefer fallbacks
    Partial,

    /// Operation is failing persistently
    Severe,
}

impl DegradationLevel {
    /// Numeric form (0, 1, 2)
    pub fn as_u8(&self) -> u8 {
        match self {
            DegradationLevel::Normal => 0,
            DegradationLevel::Partial => 1,
            DegradationLevel::Severe => 2,
        }
    }

    /// Next level up; `Severe` saturates
    pub fn escalate(&self) -> DegradationLevel {
        match self {
            DegradationLevel::Normal => DegradationLevel::Partial,
            DegradationLevel::Partial => DegradationLevel::Severe,
            DegradationLevel::Severe => DegradationLevel::Severe,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DegradationLevel::Normal => "normal",
            DegradationLevel::Partial => "partial",
            DegradationLevel::Severe => "severe",
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Health record for one named operation
#[derive(Debug, Clone, Default)]
pub struct OperationHealth {
    /// Failures in the current uninterrupted streak
    pub error_count: u32,

    /// Current degradation state
    pub degraded: bool,

    /// Current severity
    pub level: DegradationLevel,

    /// Last recorded failure description
    pub reason: Option<String>,

    /// When the streak last grew
    pub last_error_at: Option<Instant>,
}

impl OperationHealth {
    /// Read-only view of this record
    pub fn status(&self) -> DegradationStatus {
        DegradationStatus {
            degraded: self.degraded,
            level: self.level,
            reason: self.reason.clone(),
            error_count: self.error_count,
        }
    }

    /// Back to NORMAL with a zeroed counter
    pub fn reset(&mut self) {
        *self = OperationHealth::default();
    }
}

/// Snapshot returned by status queries
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DegradationStatus {
    pub degraded: bool,
    pub level: DegradationLevel,
    pub reason: Option<String>,
    pub error_count: u32,
}

impl DegradationStatus {
    /// Reason text, empty when none was recorded
    pub fn reason_str(&self) -> &str {
        self.reason.as_deref().unwrap_or("")
    }
}
