//! Lifecycle events emitted during a run.
//!
//! Events are append-only and strictly ordered within one execution. The
//! serialized payload schema is part of the persistence and callback
//! contract: `execution_id`, `timestamp`, and `type` always present;
//! `wave_index` on wave and node events; `node_id` and `node_name` on
//! node events; `duration_ms` on completions and failures; `error` on
//! failures; `attempt` on retries.

use cascade_core::{ExecutionId, NodeKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The lifecycle event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The run started.
    #[serde(rename = "execution.started")]
    ExecutionStarted,
    /// The run completed successfully.
    #[serde(rename = "execution.completed")]
    ExecutionCompleted,
    /// The run failed.
    #[serde(rename = "execution.failed")]
    ExecutionFailed,
    /// The run was cancelled.
    #[serde(rename = "execution.cancelled")]
    ExecutionCancelled,
    /// A wave began dispatching.
    #[serde(rename = "wave.started")]
    WaveStarted,
    /// Every node of a wave reached a terminal state.
    #[serde(rename = "wave.completed")]
    WaveCompleted,
    /// A node attempt started.
    #[serde(rename = "node.started")]
    NodeStarted,
    /// A node completed successfully.
    #[serde(rename = "node.completed")]
    NodeCompleted,
    /// A node failed terminally.
    #[serde(rename = "node.failed")]
    NodeFailed,
    /// A node was marked unreachable.
    #[serde(rename = "node.skipped")]
    NodeSkipped,
    /// A node failed retryably and is waiting out its backoff.
    #[serde(rename = "node.retrying")]
    NodeRetrying,
}

impl EventKind {
    /// The wire name of the event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutionStarted => "execution.started",
            Self::ExecutionCompleted => "execution.completed",
            Self::ExecutionFailed => "execution.failed",
            Self::ExecutionCancelled => "execution.cancelled",
            Self::WaveStarted => "wave.started",
            Self::WaveCompleted => "wave.completed",
            Self::NodeStarted => "node.started",
            Self::NodeCompleted => "node.completed",
            Self::NodeFailed => "node.failed",
            Self::NodeSkipped => "node.skipped",
            Self::NodeRetrying => "node.retrying",
        }
    }

    /// Returns `true` for `execution.*` terminal events.
    #[must_use]
    pub fn is_execution_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionCompleted | Self::ExecutionFailed | Self::ExecutionCancelled
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// The execution this event belongs to.
    pub execution_id: ExecutionId,
    /// Emission time (RFC 3339 UTC on the wire).
    pub timestamp: DateTime<Utc>,
    /// The event type.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Wave index, on wave and node events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_index: Option<u32>,
    /// Node id, on node events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeKey>,
    /// Node display name, on node events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    /// Wall time in milliseconds, on completions and failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error message, on failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempt number, on retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

impl ExecutionEvent {
    fn base(execution_id: ExecutionId, kind: EventKind) -> Self {
        Self {
            execution_id,
            timestamp: Utc::now(),
            kind,
            wave_index: None,
            node_id: None,
            node_name: None,
            duration_ms: None,
            error: None,
            attempt: None,
        }
    }

    /// `execution.started`
    #[must_use]
    pub fn execution_started(execution_id: ExecutionId) -> Self {
        Self::base(execution_id, EventKind::ExecutionStarted)
    }

    /// `execution.completed`
    #[must_use]
    pub fn execution_completed(execution_id: ExecutionId, duration_ms: u64) -> Self {
        let mut event = Self::base(execution_id, EventKind::ExecutionCompleted);
        event.duration_ms = Some(duration_ms);
        event
    }

    /// `execution.failed`
    #[must_use]
    pub fn execution_failed(
        execution_id: ExecutionId,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        let mut event = Self::base(execution_id, EventKind::ExecutionFailed);
        event.duration_ms = Some(duration_ms);
        event.error = Some(error.into());
        event
    }

    /// `execution.cancelled`
    #[must_use]
    pub fn execution_cancelled(execution_id: ExecutionId) -> Self {
        Self::base(execution_id, EventKind::ExecutionCancelled)
    }

    /// `wave.started`
    #[must_use]
    pub fn wave_started(execution_id: ExecutionId, wave_index: u32) -> Self {
        let mut event = Self::base(execution_id, EventKind::WaveStarted);
        event.wave_index = Some(wave_index);
        event
    }

    /// `wave.completed`
    #[must_use]
    pub fn wave_completed(execution_id: ExecutionId, wave_index: u32) -> Self {
        let mut event = Self::base(execution_id, EventKind::WaveCompleted);
        event.wave_index = Some(wave_index);
        event
    }

    fn node_base(
        execution_id: ExecutionId,
        kind: EventKind,
        wave_index: u32,
        node_id: NodeKey,
        node_name: impl Into<String>,
    ) -> Self {
        let mut event = Self::base(execution_id, kind);
        event.wave_index = Some(wave_index);
        event.node_id = Some(node_id);
        event.node_name = Some(node_name.into());
        event
    }

    /// `node.started`
    #[must_use]
    pub fn node_started(
        execution_id: ExecutionId,
        wave_index: u32,
        node_id: NodeKey,
        node_name: impl Into<String>,
    ) -> Self {
        Self::node_base(execution_id, EventKind::NodeStarted, wave_index, node_id, node_name)
    }

    /// `node.completed`
    #[must_use]
    pub fn node_completed(
        execution_id: ExecutionId,
        wave_index: u32,
        node_id: NodeKey,
        node_name: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        let mut event =
            Self::node_base(execution_id, EventKind::NodeCompleted, wave_index, node_id, node_name);
        event.duration_ms = Some(duration_ms);
        event
    }

    /// `node.failed`
    #[must_use]
    pub fn node_failed(
        execution_id: ExecutionId,
        wave_index: u32,
        node_id: NodeKey,
        node_name: impl Into<String>,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        let mut event =
            Self::node_base(execution_id, EventKind::NodeFailed, wave_index, node_id, node_name);
        event.duration_ms = Some(duration_ms);
        event.error = Some(error.into());
        event
    }

    /// `node.skipped`
    #[must_use]
    pub fn node_skipped(
        execution_id: ExecutionId,
        wave_index: u32,
        node_id: NodeKey,
        node_name: impl Into<String>,
    ) -> Self {
        Self::node_base(execution_id, EventKind::NodeSkipped, wave_index, node_id, node_name)
    }

    /// `node.retrying`
    #[must_use]
    pub fn node_retrying(
        execution_id: ExecutionId,
        wave_index: u32,
        node_id: NodeKey,
        node_name: impl Into<String>,
        attempt: u32,
    ) -> Self {
        let mut event =
            Self::node_base(execution_id, EventKind::NodeRetrying, wave_index, node_id, node_name);
        event.attempt = Some(attempt);
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(EventKind::ExecutionStarted.as_str(), "execution.started");
        assert_eq!(EventKind::NodeRetrying.as_str(), "node.retrying");
        assert_eq!(
            serde_json::to_string(&EventKind::WaveCompleted).unwrap(),
            "\"wave.completed\""
        );
    }

    #[test]
    fn terminal_kinds() {
        assert!(EventKind::ExecutionCompleted.is_execution_terminal());
        assert!(EventKind::ExecutionFailed.is_execution_terminal());
        assert!(EventKind::ExecutionCancelled.is_execution_terminal());
        assert!(!EventKind::ExecutionStarted.is_execution_terminal());
        assert!(!EventKind::NodeFailed.is_execution_terminal());
    }

    #[test]
    fn node_completed_payload() {
        let event = ExecutionEvent::node_completed(
            ExecutionId::v4(),
            1,
            NodeKey::new("fetch").unwrap(),
            "Fetch",
            42,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node.completed");
        assert_eq!(json["wave_index"], 1);
        assert_eq!(json["node_id"], "fetch");
        assert_eq!(json["node_name"], "Fetch");
        assert_eq!(json["duration_ms"], 42);
        assert!(json.get("error").is_none());
        assert!(json.get("attempt").is_none());
    }

    #[test]
    fn execution_started_payload_is_minimal() {
        let event = ExecutionEvent::execution_started(ExecutionId::v4());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "execution.started");
        assert!(json.get("wave_index").is_none());
        assert!(json.get("node_id").is_none());
        assert!(json.get("duration_ms").is_none());
    }

    #[test]
    fn retrying_carries_attempt() {
        let event = ExecutionEvent::node_retrying(
            ExecutionId::v4(),
            0,
            NodeKey::new("x").unwrap(),
            "X",
            2,
        );
        assert_eq!(event.attempt, Some(2));
        assert_eq!(event.kind, EventKind::NodeRetrying);
    }

    #[test]
    fn failed_carries_error() {
        let event = ExecutionEvent::node_failed(
            ExecutionId::v4(),
            0,
            NodeKey::new("x").unwrap(),
            "X",
            10,
            "boom",
        );
        assert_eq!(event.error.as_deref(), Some("boom"));
        assert_eq!(event.duration_ms, Some(10));
    }

    #[test]
    fn serde_roundtrip() {
        let event = ExecutionEvent::execution_failed(ExecutionId::v4(), 99, "node 'x' failed");
        let json = serde_json::to_string(&event).unwrap();
        let back: ExecutionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, EventKind::ExecutionFailed);
        assert_eq!(back.error.as_deref(), Some("node 'x' failed"));
    }
}
