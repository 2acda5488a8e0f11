//! # Cascade Storage
//!
//! Repository contracts the engine consumes, plus in-memory
//! implementations used by tests and embedded deployments.
//!
//! Durable backends (relational databases, external caches) implement the
//! same traits elsewhere; the engine only ever sees the verbs defined
//! here.

pub mod cache;
pub mod error;
pub mod execution_repo;
pub mod memory;
pub mod resource_repo;
pub mod workflow_repo;

pub use cache::CacheBackend;
pub use error::StorageError;
pub use execution_repo::ExecutionRepository;
pub use memory::{MemoryCache, MemoryExecutionRepository, MemoryResourceRepository, MemoryWorkflowRepository};
pub use resource_repo::{ResourceRecord, ResourceRepository};
pub use workflow_repo::{WorkflowFilters, WorkflowRepository};
