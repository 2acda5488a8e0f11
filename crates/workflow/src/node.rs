//! Node definitions.

use cascade_core::NodeKey;
use serde::{Deserialize, Serialize};

/// Reserved type for inert annotation nodes; skipped at run time.
pub const NODE_TYPE_COMMENT: &str = "comment";

/// Reserved type for nodes that spawn a nested execution; handled by the
/// engine directly, never through a registered executor.
pub const NODE_TYPE_SUB_WORKFLOW: &str = "sub_workflow";

/// A 2-D canvas position. The engine ignores it; it exists so definitions
/// round-trip through editors without loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// A single node of a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Stable logical identifier, unique within the workflow.
    pub id: NodeKey,
    /// Human-readable display name.
    pub name: String,
    /// Executor type name, or a reserved sentinel
    /// ([`NODE_TYPE_COMMENT`] / [`NODE_TYPE_SUB_WORKFLOW`]).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Executor configuration; string values may contain `{{ }}` templates.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Optional editor position, ignored by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeDefinition {
    /// Create a node with an empty configuration.
    #[must_use]
    pub fn new(id: NodeKey, name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            node_type: node_type.into(),
            config: serde_json::Map::new(),
            position: None,
        }
    }

    /// Attach a configuration mapping.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Map<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    /// Returns `true` if the node is an inert comment.
    #[must_use]
    pub fn is_comment(&self) -> bool {
        self.node_type == NODE_TYPE_COMMENT
    }

    /// Returns `true` if the node spawns a nested execution.
    #[must_use]
    pub fn is_sub_workflow(&self) -> bool {
        self.node_type == NODE_TYPE_SUB_WORKFLOW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    #[test]
    fn new_node_has_empty_config() {
        let node = NodeDefinition::new(key("fetch"), "Fetch", "http.request");
        assert_eq!(node.id.as_str(), "fetch");
        assert!(node.config.is_empty());
        assert!(node.position.is_none());
    }

    #[test]
    fn reserved_type_predicates() {
        assert!(NodeDefinition::new(key("c"), "Note", NODE_TYPE_COMMENT).is_comment());
        assert!(NodeDefinition::new(key("s"), "Sub", NODE_TYPE_SUB_WORKFLOW).is_sub_workflow());
        assert!(!NodeDefinition::new(key("n"), "N", "transform").is_comment());
    }

    #[test]
    fn serde_uses_type_field() {
        let node = NodeDefinition::new(key("a"), "A", "transform");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "transform");
        let back: NodeDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back.node_type, "transform");
    }

    #[test]
    fn with_config_builder() {
        let mut config = serde_json::Map::new();
        config.insert("url".into(), serde_json::json!("{{ variables.base }}/x"));
        let node = NodeDefinition::new(key("a"), "A", "http.request").with_config(config);
        assert_eq!(node.config["url"], "{{ variables.base }}/x");
    }
}
