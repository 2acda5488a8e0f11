//! Workflow repository contract.

use async_trait::async_trait;
use cascade_core::WorkflowId;
use cascade_workflow::{ResourceBinding, WorkflowDefinition, WorkflowStatus};

use crate::error::StorageError;

/// Filters for workflow listings.
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilters {
    /// Restrict to a lifecycle status.
    pub status: Option<WorkflowStatus>,
    /// Restrict to names containing this substring.
    pub name_contains: Option<String>,
}

/// Storage contract for workflow definitions.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Load a workflow with its nodes, edges, and bindings.
    async fn find_by_id_with_relations(
        &self,
        id: WorkflowId,
    ) -> Result<WorkflowDefinition, StorageError>;

    /// Persist a new workflow. Fails on duplicate id.
    async fn create(&self, workflow: WorkflowDefinition) -> Result<(), StorageError>;

    /// Replace an existing workflow. Fails if absent.
    async fn update(&self, workflow: WorkflowDefinition) -> Result<(), StorageError>;

    /// Delete a workflow. Fails if absent.
    async fn delete(&self, id: WorkflowId) -> Result<(), StorageError>;

    /// List workflows matching the filters, paginated.
    async fn find_all_with_filters(
        &self,
        filters: &WorkflowFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WorkflowDefinition>, StorageError>;

    /// Count workflows matching the filters.
    async fn count_with_filters(&self, filters: &WorkflowFilters) -> Result<usize, StorageError>;

    /// Attach a resource binding to a workflow.
    async fn assign_resource(
        &self,
        id: WorkflowId,
        binding: ResourceBinding,
    ) -> Result<(), StorageError>;

    /// Remove a resource binding by alias.
    async fn unassign_resource(&self, id: WorkflowId, alias: &str) -> Result<(), StorageError>;

    /// List a workflow's resource bindings.
    async fn get_workflow_resources(
        &self,
        id: WorkflowId,
    ) -> Result<Vec<ResourceBinding>, StorageError>;
}
