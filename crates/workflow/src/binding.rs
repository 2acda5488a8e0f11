//! Resource bindings: run-local aliases for externally stored resources.

use cascade_core::ResourceId;
use serde::{Deserialize, Serialize};

/// How a bound resource may be used by executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Read and write access.
    Write,
    /// Full control, including management operations.
    Admin,
}

/// Attaches an externally stored resource (for example a credential) to a
/// workflow under a run-local alias.
///
/// Bindings are resolved once at run start; executors reference resources
/// by alias only, never by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBinding {
    /// The stored resource being bound.
    pub resource_id: ResourceId,
    /// Run-local name under which executors see the resource.
    pub alias: String,
    /// Access mode granted to the run.
    pub access: AccessMode,
}

impl ResourceBinding {
    /// Create a binding.
    #[must_use]
    pub fn new(resource_id: ResourceId, alias: impl Into<String>, access: AccessMode) -> Self {
        Self {
            resource_id,
            alias: alias.into(),
            access,
        }
    }
}
