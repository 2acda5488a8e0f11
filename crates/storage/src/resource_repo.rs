//! Resource repository contract.

use async_trait::async_trait;
use cascade_core::{ExecutionId, ResourceId};
use serde_json::Value;

use crate::error::StorageError;

/// A stored resource payload (for example a decrypted credential).
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    /// The resource's identity.
    pub id: ResourceId,
    /// Resource kind, free-form (e.g. `"credential"`).
    pub kind: String,
    /// The resolved payload executors receive.
    pub payload: Value,
}

/// Storage contract for run-scoped resource resolution.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Resolve a resource bound to a run under `alias`.
    ///
    /// Aliases are established at run start from the workflow's bindings;
    /// an unknown alias is a [`StorageError::NotFound`].
    async fn get_by_alias(
        &self,
        run_id: ExecutionId,
        alias: &str,
    ) -> Result<ResourceRecord, StorageError>;

    /// Register an alias for a run. Called by the engine while resolving
    /// bindings at start.
    async fn bind_alias(
        &self,
        run_id: ExecutionId,
        alias: &str,
        resource_id: ResourceId,
    ) -> Result<(), StorageError>;

    /// Load a resource by id.
    async fn get(&self, id: ResourceId) -> Result<ResourceRecord, StorageError>;
}
