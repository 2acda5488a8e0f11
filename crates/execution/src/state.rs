//! Execution state tracking for runs and individual nodes.

use std::collections::HashMap;

use cascade_core::{ErrorClass, ExecutionId, NodeKey, WorkflowId};
use cascade_workflow::NodeState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attempt::NodeAttempt;
use crate::error::ExecutionError;
use crate::status::ExecutionStatus;
use crate::transition::{validate_execution_transition, validate_node_transition};

/// The execution state of a single node within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionState {
    /// Current state of the node.
    pub state: NodeState,
    /// All attempts made so far.
    #[serde(default)]
    pub attempts: Vec<NodeAttempt>,
    /// Input handed to the node at dispatch.
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    /// Output produced on success.
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Configuration after template expansion, recorded at dispatch.
    #[serde(default)]
    pub resolved_config: Option<serde_json::Map<String, serde_json::Value>>,
    /// Number of retries performed (attempts beyond the first).
    #[serde(default)]
    pub retry_count: u32,
    /// When the first attempt started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Error message if the node failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Failure class if the node failed.
    #[serde(default)]
    pub error_class: Option<ErrorClass>,
}

impl NodeExecutionState {
    /// Create a fresh pending node state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: NodeState::Pending,
            attempts: Vec::new(),
            input: None,
            output: None,
            resolved_config: None,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            error: None,
            error_class: None,
        }
    }

    /// Number of attempts made so far.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// The latest attempt, if any.
    #[must_use]
    pub fn latest_attempt(&self) -> Option<&NodeAttempt> {
        self.attempts.last()
    }

    /// Transition to a new state, validating the transition and stamping
    /// timestamps.
    pub fn transition_to(&mut self, new_state: NodeState) -> Result<(), ExecutionError> {
        validate_node_transition(self.state, new_state)?;
        self.state = new_state;

        if new_state == NodeState::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if new_state.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        if new_state == NodeState::Pending {
            // Re-queued by a loop edge: the next pass gets fresh timing.
            self.completed_at = None;
        }
        Ok(())
    }

    /// Wall time from first start to terminal state, in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

impl Default for NodeExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

/// The complete state of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Unique identifier for this execution.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// Current execution status.
    pub status: ExecutionStatus,
    /// Per-node execution states.
    pub node_states: HashMap<NodeKey, NodeExecutionState>,
    /// Input mapping supplied at start.
    #[serde(default)]
    pub input: serde_json::Map<String, serde_json::Value>,
    /// Output mapping produced at completion (exit-node outputs).
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Effective variables (workflow defaults overlaid with run options).
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    /// Error message if the run failed.
    #[serde(default)]
    pub error: Option<String>,
    /// Optimistic concurrency version, bumped on each status change.
    pub version: u64,
    /// When the execution record was created.
    pub created_at: DateTime<Utc>,
    /// When the execution record was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the execution started running.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the execution reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    /// Create a new pending execution over the given node keys.
    #[must_use]
    pub fn new(execution_id: ExecutionId, workflow_id: WorkflowId, node_keys: &[NodeKey]) -> Self {
        let now = Utc::now();
        let node_states = node_keys
            .iter()
            .map(|key| (key.clone(), NodeExecutionState::new()))
            .collect();

        Self {
            execution_id,
            workflow_id,
            status: ExecutionStatus::Pending,
            node_states,
            input: serde_json::Map::new(),
            output: None,
            variables: serde_json::Map::new(),
            error: None,
            version: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Get a node's execution state.
    #[must_use]
    pub fn node_state(&self, key: &NodeKey) -> Option<&NodeExecutionState> {
        self.node_states.get(key)
    }

    /// Get a node's execution state mutably.
    pub fn node_state_mut(&mut self, key: &NodeKey) -> Result<&mut NodeExecutionState, ExecutionError> {
        self.node_states
            .get_mut(key)
            .ok_or_else(|| ExecutionError::NodeNotFound(key.clone()))
    }

    /// Keys of all nodes currently in `Completed`.
    #[must_use]
    pub fn completed_node_keys(&self) -> Vec<NodeKey> {
        self.node_states
            .iter()
            .filter(|(_, ns)| ns.state == NodeState::Completed)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Keys of all nodes currently active (running or retrying).
    #[must_use]
    pub fn active_node_keys(&self) -> Vec<NodeKey> {
        self.node_states
            .iter()
            .filter(|(_, ns)| ns.state.is_active())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns `true` if every node is in a terminal state.
    #[must_use]
    pub fn all_nodes_terminal(&self) -> bool {
        self.node_states.values().all(|ns| ns.state.is_terminal())
    }

    /// Transition the execution status, validating and bumping the
    /// version.
    pub fn transition_status(&mut self, new_status: ExecutionStatus) -> Result<(), ExecutionError> {
        validate_execution_transition(self.status, new_status)?;
        self.status = new_status;
        self.version += 1;
        self.updated_at = Utc::now();

        if new_status == ExecutionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if new_status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nk(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    fn make_state() -> ExecutionState {
        ExecutionState::new(
            ExecutionId::v4(),
            WorkflowId::v4(),
            &[nk("a"), nk("b")],
        )
    }

    #[test]
    fn new_execution_state() {
        let state = make_state();
        assert_eq!(state.status, ExecutionStatus::Pending);
        assert_eq!(state.version, 0);
        assert_eq!(state.node_states.len(), 2);
        assert_eq!(state.node_state(&nk("a")).unwrap().state, NodeState::Pending);
    }

    #[test]
    fn node_lifecycle_happy_path() {
        let mut nes = NodeExecutionState::new();
        nes.transition_to(NodeState::Running).unwrap();
        assert!(nes.started_at.is_some());
        nes.transition_to(NodeState::Completed).unwrap();
        assert!(nes.completed_at.is_some());
        assert!(nes.duration_ms().is_some());
    }

    #[test]
    fn node_invalid_transition_rejected() {
        let mut nes = NodeExecutionState::new();
        let err = nes.transition_to(NodeState::Completed).unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
        assert_eq!(nes.state, NodeState::Pending);
    }

    #[test]
    fn loop_requeue_clears_completion() {
        let mut nes = NodeExecutionState::new();
        nes.transition_to(NodeState::Running).unwrap();
        nes.transition_to(NodeState::Completed).unwrap();
        nes.transition_to(NodeState::Pending).unwrap();
        assert!(nes.completed_at.is_none());
        assert_eq!(nes.state, NodeState::Pending);
    }

    #[test]
    fn execution_transitions_bump_version() {
        let mut state = make_state();
        state.transition_status(ExecutionStatus::Running).unwrap();
        assert_eq!(state.version, 1);
        assert!(state.started_at.is_some());

        state.transition_status(ExecutionStatus::Completed).unwrap();
        assert_eq!(state.version, 2);
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn execution_invalid_transition_keeps_version() {
        let mut state = make_state();
        assert!(state
            .transition_status(ExecutionStatus::Completed)
            .is_err());
        assert_eq!(state.version, 0);
    }

    #[test]
    fn completed_and_active_keys() {
        let mut state = make_state();
        state
            .node_state_mut(&nk("a"))
            .unwrap()
            .transition_to(NodeState::Running)
            .unwrap();
        state
            .node_state_mut(&nk("a"))
            .unwrap()
            .transition_to(NodeState::Completed)
            .unwrap();
        state
            .node_state_mut(&nk("b"))
            .unwrap()
            .transition_to(NodeState::Running)
            .unwrap();

        assert_eq!(state.completed_node_keys(), vec![nk("a")]);
        assert_eq!(state.active_node_keys(), vec![nk("b")]);
        assert!(!state.all_nodes_terminal());
    }

    #[test]
    fn node_state_mut_unknown_key() {
        let mut state = make_state();
        let err = state.node_state_mut(&nk("ghost")).unwrap_err();
        assert!(matches!(err, ExecutionError::NodeNotFound(_)));
    }

    #[test]
    fn serde_roundtrip() {
        let mut state = make_state();
        state.transition_status(ExecutionStatus::Running).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: ExecutionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.execution_id, state.execution_id);
        assert_eq!(back.status, ExecutionStatus::Running);
        assert_eq!(back.node_states.len(), 2);
    }
}
