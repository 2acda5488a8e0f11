//! Trigger repository contract and in-memory backend.

use async_trait::async_trait;
use cascade_core::{TriggerId, WorkflowId};
use cascade_storage::StorageError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::trigger::TriggerDefinition;

/// Storage contract for trigger registrations.
#[async_trait]
pub trait TriggerRepository: Send + Sync {
    /// Persist a new trigger. Fails on duplicate id.
    async fn create(&self, trigger: TriggerDefinition) -> Result<(), StorageError>;

    /// Replace an existing trigger. Fails if absent.
    async fn update(&self, trigger: TriggerDefinition) -> Result<(), StorageError>;

    /// Delete a trigger. Fails if absent.
    async fn delete(&self, id: TriggerId) -> Result<(), StorageError>;

    /// Load a trigger by id.
    async fn find_by_id(&self, id: TriggerId) -> Result<TriggerDefinition, StorageError>;

    /// All enabled triggers.
    async fn find_enabled(&self) -> Result<Vec<TriggerDefinition>, StorageError>;

    /// All triggers of one workflow.
    async fn find_by_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<TriggerDefinition>, StorageError>;

    /// Stamp the last-triggered time on a successful start.
    async fn mark_triggered(&self, id: TriggerId, at: DateTime<Utc>) -> Result<(), StorageError>;
}

/// In-memory [`TriggerRepository`].
#[derive(Debug, Default)]
pub struct MemoryTriggerRepository {
    triggers: DashMap<TriggerId, TriggerDefinition>,
}

impl MemoryTriggerRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggerRepository for MemoryTriggerRepository {
    async fn create(&self, trigger: TriggerDefinition) -> Result<(), StorageError> {
        if self.triggers.contains_key(&trigger.id) {
            return Err(StorageError::Conflict(format!(
                "trigger {} already exists",
                trigger.id
            )));
        }
        self.triggers.insert(trigger.id, trigger);
        Ok(())
    }

    async fn update(&self, trigger: TriggerDefinition) -> Result<(), StorageError> {
        if !self.triggers.contains_key(&trigger.id) {
            return Err(StorageError::NotFound(format!("trigger {}", trigger.id)));
        }
        self.triggers.insert(trigger.id, trigger);
        Ok(())
    }

    async fn delete(&self, id: TriggerId) -> Result<(), StorageError> {
        self.triggers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("trigger {id}")))
    }

    async fn find_by_id(&self, id: TriggerId) -> Result<TriggerDefinition, StorageError> {
        self.triggers
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StorageError::NotFound(format!("trigger {id}")))
    }

    async fn find_enabled(&self) -> Result<Vec<TriggerDefinition>, StorageError> {
        Ok(self
            .triggers
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn find_by_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<TriggerDefinition>, StorageError> {
        Ok(self
            .triggers
            .iter()
            .filter(|entry| entry.workflow_id == workflow_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn mark_triggered(&self, id: TriggerId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut entry = self
            .triggers
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("trigger {id}")))?;
        entry.last_triggered = Some(at);
        Ok(())
    }
}
