//! The seam between triggers and the engine.

use async_trait::async_trait;
use cascade_core::{ExecutionId, WorkflowId};
use cascade_engine::{ExecutionManager, RunOptions};

use crate::error::TriggerError;

/// Starts runs on behalf of triggers.
///
/// Implementations start the run in the background and return its
/// execution id; trigger ingress never waits for a run to finish.
#[async_trait]
pub trait WorkflowLauncher: Send + Sync {
    /// Start a run with the given input.
    async fn launch(
        &self,
        workflow_id: WorkflowId,
        input: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ExecutionId, TriggerError>;
}

#[async_trait]
impl WorkflowLauncher for ExecutionManager {
    async fn launch(
        &self,
        workflow_id: WorkflowId,
        input: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ExecutionId, TriggerError> {
        Ok(self.start(workflow_id, input, RunOptions::default()))
    }
}
