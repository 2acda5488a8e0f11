//! Checkpointing: snapshots between waves, restore on resume.

use std::collections::HashMap;

use async_trait::async_trait;
use cascade_core::{ExecutionId, NodeKey, WorkflowId};
use cascade_workflow::{NodeState, WorkflowDefinition};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::state::ExecutionState;

/// A snapshot of an execution between waves.
///
/// The serialized layout is part of the persistence contract; field names
/// are exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The execution this snapshot belongs to.
    pub execution_id: ExecutionId,
    /// The workflow the execution was derived from.
    pub workflow_id: WorkflowId,
    /// Index of the last completed wave.
    pub wave_index: u32,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Nodes in `completed` status at snapshot time.
    pub completed_nodes: Vec<NodeKey>,
    /// Output per completed node.
    pub node_outputs: HashMap<NodeKey, serde_json::Value>,
    /// Status per settled node (anything past `pending`).
    pub node_statuses: HashMap<NodeKey, NodeState>,
    /// Variables at snapshot time.
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl Checkpoint {
    /// Capture a snapshot of an execution after `wave_index` completed.
    #[must_use]
    pub fn capture(state: &ExecutionState, wave_index: u32) -> Self {
        let mut completed_nodes = Vec::new();
        let mut node_outputs = HashMap::new();
        let mut node_statuses = HashMap::new();

        for (key, node) in &state.node_states {
            if node.state == NodeState::Pending {
                continue;
            }
            node_statuses.insert(key.clone(), node.state);
            if node.state == NodeState::Completed {
                completed_nodes.push(key.clone());
                if let Some(output) = &node.output {
                    node_outputs.insert(key.clone(), output.clone());
                }
            }
        }
        completed_nodes.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        Self {
            execution_id: state.execution_id,
            workflow_id: state.workflow_id,
            wave_index,
            timestamp: Utc::now(),
            completed_nodes,
            node_outputs,
            node_statuses,
            variables: state.variables.clone(),
        }
    }

    /// Check compatibility with a live workflow definition.
    ///
    /// A checkpoint is compatible iff its workflow id matches and every
    /// node it references exists in the workflow's node set.
    pub fn validate_against(&self, workflow: &WorkflowDefinition) -> Result<(), ExecutionError> {
        if self.workflow_id != workflow.id {
            return Err(ExecutionError::CheckpointIncompatible(format!(
                "checkpoint is for workflow {}, not {}",
                self.workflow_id, workflow.id
            )));
        }
        for key in self.completed_nodes.iter().chain(self.node_statuses.keys()) {
            if !workflow.has_node(key) {
                return Err(ExecutionError::CheckpointIncompatible(format!(
                    "checkpoint references unknown node '{key}'"
                )));
            }
        }
        Ok(())
    }

    /// Restore this snapshot into a fresh execution state.
    ///
    /// Node statuses and outputs are written directly; nodes the
    /// checkpoint does not mention stay `pending`.
    pub fn apply(&self, state: &mut ExecutionState) -> Result<(), ExecutionError> {
        for (key, status) in &self.node_statuses {
            let node = state.node_state_mut(key)?;
            node.state = *status;
            node.completed_at = Some(self.timestamp);
            if let Some(output) = self.node_outputs.get(key) {
                node.output = Some(output.clone());
            }
        }
        state.variables = self.variables.clone();
        Ok(())
    }
}

/// Storage for checkpoints. Multiple snapshots per execution may coexist.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ExecutionError>;

    /// The most recent snapshot for an execution, by wave index.
    async fn latest(&self, execution_id: ExecutionId) -> Result<Option<Checkpoint>, ExecutionError>;

    /// All snapshots for an execution, oldest first.
    async fn list(&self, execution_id: ExecutionId) -> Result<Vec<Checkpoint>, ExecutionError>;

    /// Drop all snapshots for an execution.
    async fn delete(&self, execution_id: ExecutionId) -> Result<(), ExecutionError>;
}

/// In-memory checkpoint store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<ExecutionId, Vec<Checkpoint>>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), ExecutionError> {
        self.checkpoints
            .write()
            .entry(checkpoint.execution_id)
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn latest(&self, execution_id: ExecutionId) -> Result<Option<Checkpoint>, ExecutionError> {
        Ok(self
            .checkpoints
            .read()
            .get(&execution_id)
            .and_then(|list| list.iter().max_by_key(|c| c.wave_index))
            .cloned())
    }

    async fn list(&self, execution_id: ExecutionId) -> Result<Vec<Checkpoint>, ExecutionError> {
        Ok(self
            .checkpoints
            .read()
            .get(&execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, execution_id: ExecutionId) -> Result<(), ExecutionError> {
        self.checkpoints.write().remove(&execution_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use cascade_workflow::NodeDefinition;
    use serde_json::json;

    fn nk(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    fn workflow_with(nodes: &[&str]) -> WorkflowDefinition {
        let mut wf = WorkflowDefinition::new(WorkflowId::v4(), "wf");
        wf.nodes = nodes
            .iter()
            .map(|id| NodeDefinition::new(nk(id), *id, "t"))
            .collect();
        wf
    }

    fn state_with_progress(workflow: &WorkflowDefinition) -> ExecutionState {
        let keys: Vec<NodeKey> = workflow.nodes.iter().map(|n| n.id.clone()).collect();
        let mut state = ExecutionState::new(ExecutionId::v4(), workflow.id, &keys);
        {
            let node = state.node_state_mut(&nk("a")).unwrap();
            node.transition_to(NodeState::Running).unwrap();
            node.output = Some(json!({"value": 1}));
            node.transition_to(NodeState::Completed).unwrap();
        }
        {
            let node = state.node_state_mut(&nk("b")).unwrap();
            node.transition_to(NodeState::Skipped).unwrap();
        }
        state.variables.insert("k".into(), json!("v"));
        state
    }

    #[test]
    fn capture_collects_settled_nodes() {
        let wf = workflow_with(&["a", "b", "c"]);
        let state = state_with_progress(&wf);
        let checkpoint = Checkpoint::capture(&state, 2);

        assert_eq!(checkpoint.wave_index, 2);
        assert_eq!(checkpoint.completed_nodes, vec![nk("a")]);
        assert_eq!(checkpoint.node_outputs[&nk("a")], json!({"value": 1}));
        assert_eq!(checkpoint.node_statuses[&nk("b")], NodeState::Skipped);
        assert!(!checkpoint.node_statuses.contains_key(&nk("c")));
        assert_eq!(checkpoint.variables["k"], json!("v"));
    }

    #[test]
    fn serialized_layout_has_exact_field_names() {
        let wf = workflow_with(&["a", "b"]);
        let state = state_with_progress(&wf);
        let json = serde_json::to_value(Checkpoint::capture(&state, 1)).unwrap();

        for field in [
            "execution_id",
            "workflow_id",
            "wave_index",
            "timestamp",
            "completed_nodes",
            "node_outputs",
            "node_statuses",
            "variables",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn validate_against_matching_workflow() {
        let wf = workflow_with(&["a", "b"]);
        let checkpoint = Checkpoint::capture(&state_with_progress(&wf), 1);
        assert!(checkpoint.validate_against(&wf).is_ok());
    }

    #[test]
    fn validate_rejects_wrong_workflow_id() {
        let wf = workflow_with(&["a", "b"]);
        let checkpoint = Checkpoint::capture(&state_with_progress(&wf), 1);
        let other = workflow_with(&["a", "b"]);
        let err = checkpoint.validate_against(&other).unwrap_err();
        assert!(matches!(err, ExecutionError::CheckpointIncompatible(_)));
    }

    #[test]
    fn validate_rejects_unknown_nodes() {
        let wf = workflow_with(&["a", "b"]);
        let checkpoint = Checkpoint::capture(&state_with_progress(&wf), 1);
        let mut shrunk = wf.clone();
        shrunk.nodes.retain(|n| n.id != nk("a"));
        let err = checkpoint.validate_against(&shrunk).unwrap_err();
        assert!(err.to_string().contains("unknown node 'a'"));
    }

    #[test]
    fn apply_restores_state() {
        let wf = workflow_with(&["a", "b", "c"]);
        let original = state_with_progress(&wf);
        let checkpoint = Checkpoint::capture(&original, 1);

        let keys: Vec<NodeKey> = wf.nodes.iter().map(|n| n.id.clone()).collect();
        let mut restored = ExecutionState::new(original.execution_id, wf.id, &keys);
        checkpoint.apply(&mut restored).unwrap();

        assert_eq!(restored.node_state(&nk("a")).unwrap().state, NodeState::Completed);
        assert_eq!(
            restored.node_state(&nk("a")).unwrap().output,
            Some(json!({"value": 1}))
        );
        assert_eq!(restored.node_state(&nk("b")).unwrap().state, NodeState::Skipped);
        assert_eq!(restored.node_state(&nk("c")).unwrap().state, NodeState::Pending);
        assert_eq!(restored.variables["k"], json!("v"));
    }

    #[tokio::test]
    async fn memory_store_latest_by_wave_index() {
        let wf = workflow_with(&["a", "b"]);
        let state = state_with_progress(&wf);
        let store = MemoryCheckpointStore::new();

        store.save(Checkpoint::capture(&state, 0)).await.unwrap();
        store.save(Checkpoint::capture(&state, 2)).await.unwrap();
        store.save(Checkpoint::capture(&state, 1)).await.unwrap();

        let latest = store.latest(state.execution_id).await.unwrap().unwrap();
        assert_eq!(latest.wave_index, 2);
        assert_eq!(store.list(state.execution_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn memory_store_delete() {
        let wf = workflow_with(&["a", "b"]);
        let state = state_with_progress(&wf);
        let store = MemoryCheckpointStore::new();
        store.save(Checkpoint::capture(&state, 0)).await.unwrap();

        store.delete(state.execution_id).await.unwrap();
        assert!(store.latest(state.execution_id).await.unwrap().is_none());
        assert!(store.list(state.execution_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_missing_execution() {
        let store = MemoryCheckpointStore::new();
        assert!(store.latest(ExecutionId::v4()).await.unwrap().is_none());
    }
}
