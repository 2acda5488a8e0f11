//! Execution repository contract.

use async_trait::async_trait;
use cascade_core::{ExecutionId, WorkflowId};
use cascade_execution::{ExecutionEvent, ExecutionState, ExecutionStatus};

use crate::error::StorageError;

/// Storage contract for execution records and their event logs.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Persist a new execution record. Fails on duplicate id.
    async fn create(&self, execution: ExecutionState) -> Result<(), StorageError>;

    /// Replace an existing execution record. Fails if absent.
    async fn update(&self, execution: ExecutionState) -> Result<(), StorageError>;

    /// Load an execution with its node executions.
    async fn find_by_id_with_relations(
        &self,
        id: ExecutionId,
    ) -> Result<ExecutionState, StorageError>;

    /// List executions, paginated, newest first.
    async fn find_all(&self, limit: usize, offset: usize)
        -> Result<Vec<ExecutionState>, StorageError>;

    /// List executions of one workflow, newest first.
    async fn find_by_workflow_id(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<ExecutionState>, StorageError>;

    /// List executions in a given status.
    async fn find_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<ExecutionState>, StorageError>;

    /// Append an event to an execution's log. Events are append-only;
    /// delivery order is the append order.
    async fn append_event(&self, event: ExecutionEvent) -> Result<(), StorageError>;

    /// Read an execution's event log in append order.
    async fn get_events(&self, id: ExecutionId) -> Result<Vec<ExecutionEvent>, StorageError>;
}
