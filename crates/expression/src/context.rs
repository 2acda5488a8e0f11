//! The namespace templates and conditions resolve against.

use std::collections::HashMap;

use serde_json::Value;

/// A snapshot of the run's resolvable names.
///
/// Resolution order for a dot-separated `path`:
///
/// 1. `env.NAME` — the run's environment-variable proxy.
/// 2. `variables.NAME` — the explicit variables namespace (escapes
///    shadowing by a node with the same id).
/// 3. A bare first segment naming a run variable.
/// 4. A first segment naming a node id — walks into that node's output.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// Run variables (workflow defaults overlaid with run options).
    variables: serde_json::Map<String, Value>,
    /// Completed node outputs keyed by node id.
    node_outputs: HashMap<String, Value>,
    /// Environment-variable proxy, configured per run.
    env: HashMap<String, String>,
}

impl ResolveContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the variables map.
    #[must_use]
    pub fn with_variables(mut self, variables: serde_json::Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Replace the environment proxy.
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Record a node's output.
    pub fn set_node_output(&mut self, node_id: impl Into<String>, output: Value) {
        self.node_outputs.insert(node_id.into(), output);
    }

    /// Set a single variable.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Look up a node's output.
    #[must_use]
    pub fn node_output(&self, node_id: &str) -> Option<&Value> {
        self.node_outputs.get(node_id)
    }

    /// Resolve a dot-separated path to a value, cloning the leaf.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let root = segments.next()?;

        match root {
            "env" => {
                let name = segments.next()?;
                if segments.next().is_some() {
                    return None;
                }
                self.env.get(name).map(|v| Value::String(v.clone()))
            }
            "variables" => {
                let name = segments.next()?;
                let value = self.variables.get(name)?;
                walk(value, segments)
            }
            _ => {
                if let Some(value) = self.variables.get(root) {
                    return walk(value, segments);
                }
                let value = self.node_outputs.get(root)?;
                walk(value, segments)
            }
        }
    }
}

/// Walk the remaining segments into a value. Object fields are accessed by
/// name; arrays accept numeric segments.
fn walk<'a>(mut value: &Value, segments: impl Iterator<Item = &'a str>) -> Option<Value> {
    for segment in segments {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ResolveContext {
        let mut ctx = ResolveContext::new()
            .with_variables(
                serde_json::from_value(json!({"region": "eu", "count": 3})).unwrap(),
            )
            .with_env(HashMap::from([("HOME".to_string(), "/root".to_string())]));
        ctx.set_node_output(
            "fetch",
            json!({"status": 200, "body": {"items": [{"id": 1}, {"id": 2}]}}),
        );
        ctx
    }

    #[test]
    fn resolves_bare_variable() {
        assert_eq!(context().resolve_path("region"), Some(json!("eu")));
    }

    #[test]
    fn resolves_env_proxy() {
        assert_eq!(context().resolve_path("env.HOME"), Some(json!("/root")));
        assert_eq!(context().resolve_path("env.MISSING"), None);
    }

    #[test]
    fn resolves_explicit_variables_namespace() {
        assert_eq!(context().resolve_path("variables.count"), Some(json!(3)));
    }

    #[test]
    fn variables_shadow_node_outputs() {
        let mut ctx = context();
        ctx.set_variable("fetch", json!("shadowed"));
        assert_eq!(ctx.resolve_path("fetch"), Some(json!("shadowed")));
        // The explicit namespace still reaches the variable.
        assert_eq!(ctx.resolve_path("variables.fetch"), Some(json!("shadowed")));
    }

    #[test]
    fn walks_node_output_fields() {
        assert_eq!(context().resolve_path("fetch.status"), Some(json!(200)));
        assert_eq!(
            context().resolve_path("fetch.body.items.1.id"),
            Some(json!(2))
        );
    }

    #[test]
    fn missing_paths_resolve_to_none() {
        assert_eq!(context().resolve_path("fetch.body.missing"), None);
        assert_eq!(context().resolve_path("ghost"), None);
        assert_eq!(context().resolve_path("fetch.status.deeper"), None);
    }
}
