//! Workflow lifecycle status and per-node execution states.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Editable, not yet runnable by triggers.
    Draft,
    /// Runnable.
    Active,
    /// Retired; manual runs only.
    Inactive,
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// The execution state of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Not yet dispatched.
    Pending,
    /// An attempt is in flight.
    Running,
    /// Finished successfully; output recorded.
    Completed,
    /// Finished unsuccessfully.
    Failed,
    /// The edge router decided the node is unreachable.
    Skipped,
    /// Between failed attempt and next attempt (backoff window).
    Retrying,
}

impl NodeState {
    /// Returns `true` if the node has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Returns `true` if the node is currently doing or awaiting work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Retrying => write!(f, "retrying"),
        }
    }
}
