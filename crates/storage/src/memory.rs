//! In-memory backends for tests and embedded use.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cascade_core::{ExecutionId, ResourceId, WorkflowId};
use cascade_execution::{ExecutionEvent, ExecutionState, ExecutionStatus};
use cascade_workflow::{ResourceBinding, WorkflowDefinition};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::cache::CacheBackend;
use crate::error::StorageError;
use crate::execution_repo::ExecutionRepository;
use crate::resource_repo::{ResourceRecord, ResourceRepository};
use crate::workflow_repo::{WorkflowFilters, WorkflowRepository};

fn matches(workflow: &WorkflowDefinition, filters: &WorkflowFilters) -> bool {
    if let Some(status) = filters.status {
        if workflow.status != status {
            return false;
        }
    }
    if let Some(fragment) = &filters.name_contains {
        if !workflow.name.contains(fragment.as_str()) {
            return false;
        }
    }
    true
}

/// In-memory [`WorkflowRepository`].
#[derive(Debug, Default)]
pub struct MemoryWorkflowRepository {
    workflows: DashMap<WorkflowId, WorkflowDefinition>,
}

impl MemoryWorkflowRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for MemoryWorkflowRepository {
    async fn find_by_id_with_relations(
        &self,
        id: WorkflowId,
    ) -> Result<WorkflowDefinition, StorageError> {
        self.workflows
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StorageError::NotFound(format!("workflow {id}")))
    }

    async fn create(&self, workflow: WorkflowDefinition) -> Result<(), StorageError> {
        if self.workflows.contains_key(&workflow.id) {
            return Err(StorageError::Conflict(format!(
                "workflow {} already exists",
                workflow.id
            )));
        }
        self.workflows.insert(workflow.id, workflow);
        Ok(())
    }

    async fn update(&self, workflow: WorkflowDefinition) -> Result<(), StorageError> {
        if !self.workflows.contains_key(&workflow.id) {
            return Err(StorageError::NotFound(format!("workflow {}", workflow.id)));
        }
        self.workflows.insert(workflow.id, workflow);
        Ok(())
    }

    async fn delete(&self, id: WorkflowId) -> Result<(), StorageError> {
        self.workflows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("workflow {id}")))
    }

    async fn find_all_with_filters(
        &self,
        filters: &WorkflowFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WorkflowDefinition>, StorageError> {
        let mut all: Vec<WorkflowDefinition> = self
            .workflows
            .iter()
            .filter(|entry| matches(entry.value(), filters))
            .map(|entry| entry.clone())
            .collect();
        all.sort_by_key(|w| w.created_at);
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_with_filters(&self, filters: &WorkflowFilters) -> Result<usize, StorageError> {
        Ok(self
            .workflows
            .iter()
            .filter(|entry| matches(entry.value(), filters))
            .count())
    }

    async fn assign_resource(
        &self,
        id: WorkflowId,
        binding: ResourceBinding,
    ) -> Result<(), StorageError> {
        let mut entry = self
            .workflows
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("workflow {id}")))?;
        if entry.bindings.iter().any(|b| b.alias == binding.alias) {
            return Err(StorageError::Conflict(format!(
                "alias '{}' already bound",
                binding.alias
            )));
        }
        entry.bindings.push(binding);
        Ok(())
    }

    async fn unassign_resource(&self, id: WorkflowId, alias: &str) -> Result<(), StorageError> {
        let mut entry = self
            .workflows
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("workflow {id}")))?;
        let before = entry.bindings.len();
        entry.bindings.retain(|b| b.alias != alias);
        if entry.bindings.len() == before {
            return Err(StorageError::NotFound(format!("alias '{alias}'")));
        }
        Ok(())
    }

    async fn get_workflow_resources(
        &self,
        id: WorkflowId,
    ) -> Result<Vec<ResourceBinding>, StorageError> {
        self.workflows
            .get(&id)
            .map(|entry| entry.bindings.clone())
            .ok_or_else(|| StorageError::NotFound(format!("workflow {id}")))
    }
}

/// In-memory [`ExecutionRepository`].
#[derive(Debug, Default)]
pub struct MemoryExecutionRepository {
    executions: DashMap<ExecutionId, ExecutionState>,
    events: DashMap<ExecutionId, Vec<ExecutionEvent>>,
}

impl MemoryExecutionRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for MemoryExecutionRepository {
    async fn create(&self, execution: ExecutionState) -> Result<(), StorageError> {
        if self.executions.contains_key(&execution.execution_id) {
            return Err(StorageError::Conflict(format!(
                "execution {} already exists",
                execution.execution_id
            )));
        }
        self.executions.insert(execution.execution_id, execution);
        Ok(())
    }

    async fn update(&self, execution: ExecutionState) -> Result<(), StorageError> {
        if !self.executions.contains_key(&execution.execution_id) {
            return Err(StorageError::NotFound(format!(
                "execution {}",
                execution.execution_id
            )));
        }
        self.executions.insert(execution.execution_id, execution);
        Ok(())
    }

    async fn find_by_id_with_relations(
        &self,
        id: ExecutionId,
    ) -> Result<ExecutionState, StorageError> {
        self.executions
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StorageError::NotFound(format!("execution {id}")))
    }

    async fn find_all(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ExecutionState>, StorageError> {
        let mut all: Vec<ExecutionState> =
            self.executions.iter().map(|entry| entry.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_by_workflow_id(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<ExecutionState>, StorageError> {
        let mut found: Vec<ExecutionState> = self
            .executions
            .iter()
            .filter(|entry| entry.workflow_id == workflow_id)
            .map(|entry| entry.clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<ExecutionState>, StorageError> {
        Ok(self
            .executions
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn append_event(&self, event: ExecutionEvent) -> Result<(), StorageError> {
        self.events
            .entry(event.execution_id)
            .or_default()
            .push(event);
        Ok(())
    }

    async fn get_events(&self, id: ExecutionId) -> Result<Vec<ExecutionEvent>, StorageError> {
        Ok(self.events.get(&id).map(|entry| entry.clone()).unwrap_or_default())
    }
}

/// In-memory [`ResourceRepository`].
#[derive(Debug, Default)]
pub struct MemoryResourceRepository {
    resources: DashMap<ResourceId, ResourceRecord>,
    aliases: DashMap<(ExecutionId, String), ResourceId>,
}

impl MemoryResourceRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a resource.
    pub fn insert(&self, record: ResourceRecord) {
        self.resources.insert(record.id, record);
    }
}

#[async_trait]
impl ResourceRepository for MemoryResourceRepository {
    async fn get_by_alias(
        &self,
        run_id: ExecutionId,
        alias: &str,
    ) -> Result<ResourceRecord, StorageError> {
        let resource_id = self
            .aliases
            .get(&(run_id, alias.to_string()))
            .map(|entry| *entry)
            .ok_or_else(|| StorageError::NotFound(format!("alias '{alias}'")))?;
        self.get(resource_id).await
    }

    async fn bind_alias(
        &self,
        run_id: ExecutionId,
        alias: &str,
        resource_id: ResourceId,
    ) -> Result<(), StorageError> {
        if !self.resources.contains_key(&resource_id) {
            return Err(StorageError::NotFound(format!("resource {resource_id}")));
        }
        self.aliases.insert((run_id, alias.to_string()), resource_id);
        Ok(())
    }

    async fn get(&self, id: ResourceId) -> Result<ResourceRecord, StorageError> {
        self.resources
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or_else(|| StorageError::NotFound(format!("resource {id}")))
    }
}

/// In-memory [`CacheBackend`] with lazy TTL expiry and broadcast pub/sub.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Value, Option<Instant>)>,
    channels: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

const CHANNEL_CAPACITY: usize = 256;

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<Value> {
        let entry = self.entries.get(key)?;
        let (value, deadline) = entry.value();
        if deadline.is_some_and(|d| Instant::now() >= d) {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(value.clone())
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Value> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.live_value(key))
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, StorageError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| (Value::from(0), None));
        let (value, deadline) = entry.value_mut();
        if deadline.is_some_and(|d| Instant::now() >= d) {
            *value = Value::from(0);
            *deadline = None;
        }
        let current = value.as_i64().unwrap_or(0);
        let next = current + 1;
        *value = Value::from(next);
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.value_mut().1 = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn publish(&self, channel: &str, message: Value) -> Result<(), StorageError> {
        // No subscribers is fine; the send result is irrelevant then.
        let _ = self.sender(channel).send(message);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<Value>, StorageError> {
        Ok(self.sender(channel).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use cascade_core::NodeKey;
    use cascade_workflow::{AccessMode, NodeDefinition};
    use serde_json::json;

    fn workflow(name: &str) -> WorkflowDefinition {
        let mut wf = WorkflowDefinition::new(WorkflowId::v4(), name);
        wf.nodes = vec![NodeDefinition::new(
            NodeKey::new("a").unwrap(),
            "A",
            "t",
        )];
        wf
    }

    #[tokio::test]
    async fn workflow_crud() {
        let repo = MemoryWorkflowRepository::new();
        let wf = workflow("first");
        let id = wf.id;

        repo.create(wf.clone()).await.unwrap();
        assert!(matches!(
            repo.create(wf.clone()).await.unwrap_err(),
            StorageError::Conflict(_)
        ));

        let loaded = repo.find_by_id_with_relations(id).await.unwrap();
        assert_eq!(loaded.name, "first");

        let mut updated = loaded;
        updated.name = "renamed".into();
        repo.update(updated).await.unwrap();
        assert_eq!(
            repo.find_by_id_with_relations(id).await.unwrap().name,
            "renamed"
        );

        repo.delete(id).await.unwrap();
        assert!(matches!(
            repo.find_by_id_with_relations(id).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn workflow_filters_and_pagination() {
        let repo = MemoryWorkflowRepository::new();
        for name in ["alpha", "beta", "alphabet"] {
            repo.create(workflow(name)).await.unwrap();
        }

        let filters = WorkflowFilters {
            name_contains: Some("alpha".into()),
            ..WorkflowFilters::default()
        };
        assert_eq!(repo.count_with_filters(&filters).await.unwrap(), 2);

        let page = repo.find_all_with_filters(&filters, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);

        let all = repo
            .find_all_with_filters(&WorkflowFilters::default(), 10, 0)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn resource_assignment() {
        let repo = MemoryWorkflowRepository::new();
        let wf = workflow("with-resources");
        let id = wf.id;
        repo.create(wf).await.unwrap();

        let binding = ResourceBinding::new(ResourceId::v4(), "slack", AccessMode::Read);
        repo.assign_resource(id, binding.clone()).await.unwrap();
        assert!(matches!(
            repo.assign_resource(id, binding).await.unwrap_err(),
            StorageError::Conflict(_)
        ));

        let resources = repo.get_workflow_resources(id).await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].alias, "slack");

        repo.unassign_resource(id, "slack").await.unwrap();
        assert!(repo.get_workflow_resources(id).await.unwrap().is_empty());
        assert!(matches!(
            repo.unassign_resource(id, "slack").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn execution_crud_and_events() {
        let repo = MemoryExecutionRepository::new();
        let workflow_id = WorkflowId::v4();
        let state = ExecutionState::new(ExecutionId::v4(), workflow_id, &[]);
        let id = state.execution_id;

        repo.create(state.clone()).await.unwrap();
        assert!(matches!(
            repo.create(state.clone()).await.unwrap_err(),
            StorageError::Conflict(_)
        ));

        repo.append_event(ExecutionEvent::execution_started(id))
            .await
            .unwrap();
        repo.append_event(ExecutionEvent::execution_completed(id, 5))
            .await
            .unwrap();

        let events = repo.get_events(id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, cascade_execution::EventKind::ExecutionStarted);

        let by_workflow = repo.find_by_workflow_id(workflow_id).await.unwrap();
        assert_eq!(by_workflow.len(), 1);

        let pending = repo.find_by_status(ExecutionStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(repo
            .find_by_status(ExecutionStatus::Running)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn resource_alias_resolution() {
        let repo = MemoryResourceRepository::new();
        let resource_id = ResourceId::v4();
        repo.insert(ResourceRecord {
            id: resource_id,
            kind: "credential".into(),
            payload: json!({"token": "secret"}),
        });

        let run_id = ExecutionId::v4();
        repo.bind_alias(run_id, "slack", resource_id).await.unwrap();

        let record = repo.get_by_alias(run_id, "slack").await.unwrap();
        assert_eq!(record.payload["token"], "secret");

        assert!(matches!(
            repo.get_by_alias(run_id, "github").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
        assert!(matches!(
            repo.bind_alias(run_id, "x", ResourceId::v4()).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn cache_get_set_delete() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").await.unwrap().is_none());

        cache.set("k", json!(1), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!(1)));

        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_ttl_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("k", json!("v"), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_increment_and_expire() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("counter").await.unwrap(), 1);
        assert_eq!(cache.increment("counter").await.unwrap(), 2);

        assert!(cache.expire("counter", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Window elapsed, the counter restarts.
        assert_eq!(cache.increment("counter").await.unwrap(), 1);

        assert!(!cache.expire("ghost", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn cache_pub_sub() {
        let cache = MemoryCache::new();
        let mut rx = cache.subscribe("events:user.created").await.unwrap();

        cache
            .publish("events:user.created", json!({"id": 7}))
            .await
            .unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message["id"], 7);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let cache = MemoryCache::new();
        assert!(cache.publish("nobody", json!(null)).await.is_ok());
    }
}
