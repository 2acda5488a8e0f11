//! Per-dispatch context handed to executors.

use std::collections::HashMap;

use cascade_core::{ErrorClass, ExecutionId, NodeKey, WorkflowId};
use cascade_expression::{resolve_value, ResolveContext};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;

/// Run-scoped services and identity visible to an executor.
///
/// The context carries cooperative cancellation, the node's deadline, the
/// resources bound to the run (keyed by alias, never by resource id), and
/// the run's environment-variable proxy. It exposes nothing that would let
/// an executor mutate engine state.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// The execution this dispatch belongs to.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The node being executed.
    pub node_id: NodeKey,
    /// The node's display name.
    pub node_name: String,
    /// Cooperative cancellation token; cancelled on run cancellation and
    /// on deadline expiry.
    pub cancellation: CancellationToken,
    /// Absolute deadline for this dispatch, if any.
    pub deadline: Option<DateTime<Utc>>,
    /// Resources resolved at run start, keyed by binding alias.
    resources: HashMap<String, Value>,
    /// Environment-variable proxy configured for the run.
    env: HashMap<String, String>,
    /// Snapshot of the run namespace for nested template expansion.
    templates: Option<ResolveContext>,
}

impl NodeContext {
    /// Create a context with no resources or environment.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        node_id: NodeKey,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            execution_id,
            workflow_id,
            node_id,
            node_name: node_name.into(),
            cancellation: CancellationToken::new(),
            deadline: None,
            resources: HashMap::new(),
            env: HashMap::new(),
            templates: None,
        }
    }

    /// Replace the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Set the dispatch deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach resolved resources.
    #[must_use]
    pub fn with_resources(mut self, resources: HashMap<String, Value>) -> Self {
        self.resources = resources;
        self
    }

    /// Attach the environment proxy.
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Attach the run-namespace snapshot used by
    /// [`resolve_nested`](Self::resolve_nested).
    #[must_use]
    pub fn with_templates(mut self, templates: ResolveContext) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Expand `{{ }}` templates inside a value an executor assembled at
    /// run time (for example a request body built from its own input).
    /// The namespace is the same snapshot the node's configuration was
    /// resolved against.
    pub fn resolve_nested(&self, value: &Value) -> Result<Value, ExecutorError> {
        let Some(templates) = &self.templates else {
            return Ok(value.clone());
        };
        resolve_value(value, templates)
            .map_err(|e| ExecutorError::new(ErrorClass::TemplateUnresolved, e.to_string()))
    }

    /// Look up a resource by its run-local alias.
    #[must_use]
    pub fn resource(&self, alias: &str) -> Option<&Value> {
        self.resources.get(alias)
    }

    /// Look up an environment value.
    #[must_use]
    pub fn env(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), ExecutorError> {
        if self.cancellation.is_cancelled() {
            Err(ExecutorError::cancelled())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> NodeContext {
        NodeContext::new(
            ExecutionId::v4(),
            WorkflowId::v4(),
            NodeKey::new("fetch").unwrap(),
            "Fetch",
        )
    }

    #[test]
    fn resource_lookup_by_alias() {
        let ctx = context().with_resources(HashMap::from([(
            "slack".to_string(),
            json!({"token": "xoxb"}),
        )]));
        assert_eq!(ctx.resource("slack"), Some(&json!({"token": "xoxb"})));
        assert!(ctx.resource("github").is_none());
    }

    #[test]
    fn env_lookup() {
        let ctx = context().with_env(HashMap::from([("TZ".to_string(), "UTC".to_string())]));
        assert_eq!(ctx.env("TZ"), Some("UTC"));
        assert!(ctx.env("MISSING").is_none());
    }

    #[test]
    fn check_cancelled_reflects_token() {
        let ctx = context();
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancellation.cancel();
        assert_eq!(ctx.check_cancelled().unwrap_err(), ExecutorError::cancelled());
    }

    #[test]
    fn deadline_is_carried() {
        let deadline = Utc::now() + chrono::Duration::seconds(30);
        let ctx = context().with_deadline(deadline);
        assert_eq!(ctx.deadline, Some(deadline));
    }

    #[test]
    fn nested_resolution_uses_run_namespace() {
        let mut templates = ResolveContext::new();
        templates.set_variable("region", json!("eu"));
        let ctx = context().with_templates(templates);

        let resolved = ctx.resolve_nested(&json!({"url": "https://{{ region }}.api"})).unwrap();
        assert_eq!(resolved, json!({"url": "https://eu.api"}));
    }

    #[test]
    fn nested_resolution_without_snapshot_is_identity() {
        let ctx = context();
        let value = json!("{{ anything }}");
        assert_eq!(ctx.resolve_nested(&value).unwrap(), value);
    }
}
