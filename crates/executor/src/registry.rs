//! Type-name → executor resolution.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::executor::Executor;

/// Type names the engine handles itself; they can never be registered.
const RESERVED_TYPES: [&str; 2] = ["comment", "sub_workflow"];

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The type name is already taken.
    #[error("executor type '{0}' is already registered")]
    AlreadyRegistered(String),

    /// The type name is reserved for the engine.
    #[error("executor type '{0}' is reserved")]
    Reserved(String),

    /// No executor is registered under the type name.
    #[error("unknown executor type '{0}'")]
    Unknown(String),
}

/// Maps node type names to executor implementations.
///
/// The engine populates the registry at startup and resolves workflow
/// node types through it at validation and dispatch time. Executors are
/// stored as `Arc<dyn Executor>` for shared ownership across concurrent
/// executions.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under a type name.
    ///
    /// Fails if the name is reserved or already registered.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        executor: Arc<dyn Executor>,
    ) -> Result<(), RegistryError> {
        let type_name = type_name.into();
        if RESERVED_TYPES.contains(&type_name.as_str()) {
            return Err(RegistryError::Reserved(type_name));
        }
        if self.executors.contains_key(&type_name) {
            return Err(RegistryError::AlreadyRegistered(type_name));
        }
        self.executors.insert(type_name, executor);
        Ok(())
    }

    /// Remove an executor. Returns the removed executor, if any.
    pub fn unregister(&mut self, type_name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.remove(type_name)
    }

    /// Resolve a type name.
    pub fn get(&self, type_name: &str) -> Result<Arc<dyn Executor>, RegistryError> {
        self.executors
            .get(type_name)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(type_name.to_string()))
    }

    /// Returns `true` if the type name is registered.
    #[must_use]
    pub fn has(&self, type_name: &str) -> bool {
        self.executors.contains_key(type_name)
    }

    /// All registered type names.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.executors.keys().map(String::as_str).collect()
    }

    /// Number of registered executors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Returns `true` if no executors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("count", &self.executors.len())
            .field("types", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}
