//! Per-attempt history for node executions.

use cascade_core::ErrorClass;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single attempt to execute a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAttempt {
    /// Which attempt this is (1-based, matching retry arithmetic).
    pub number: u32,
    /// When this attempt started.
    pub started_at: DateTime<Utc>,
    /// When this attempt finished, if it has.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if the attempt failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Failure class if the attempt failed.
    #[serde(default)]
    pub error_class: Option<ErrorClass>,
}

impl NodeAttempt {
    /// Start a new attempt.
    #[must_use]
    pub fn start(number: u32) -> Self {
        Self {
            number,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            error_class: None,
        }
    }

    /// Mark the attempt successful.
    pub fn succeed(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Mark the attempt failed.
    pub fn fail(&mut self, class: ErrorClass, error: impl Into<String>) {
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        self.error_class = Some(class);
    }

    /// Returns `true` if the attempt has finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Returns `true` if the attempt failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Wall time of the attempt, if finished.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at
            .map(|end| (end - self.started_at).to_std().unwrap_or(Duration::ZERO))
    }
}
