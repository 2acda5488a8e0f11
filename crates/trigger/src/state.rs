//! Cached trigger runtime state.

use cascade_core::TriggerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Small persistent state kept per trigger in the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerState {
    /// When the trigger last started a run.
    #[serde(default)]
    pub last_executed: Option<DateTime<Utc>>,
    /// How many runs this trigger has started.
    #[serde(default)]
    pub execution_count: u64,
    /// When the trigger is next due (schedule variants only).
    #[serde(default)]
    pub next_execution: Option<DateTime<Utc>>,
}

impl TriggerState {
    /// The cache key this state lives under.
    #[must_use]
    pub fn cache_key(trigger_id: TriggerId) -> String {
        format!("trigger:state:{trigger_id}")
    }

    /// Record a firing.
    pub fn record_fire(&mut self, at: DateTime<Utc>, next: Option<DateTime<Utc>>) {
        self.last_executed = Some(at);
        self.execution_count += 1;
        self.next_execution = next;
    }
}
