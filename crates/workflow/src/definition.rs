//! The workflow definition: the unit the engine snapshots at run start.

use std::collections::HashSet;

use cascade_core::constants::MAX_NODE_NAME_LEN;
use cascade_core::{NodeKey, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::binding::ResourceBinding;
use crate::edge::EdgeDefinition;
use crate::error::WorkflowError;
use crate::graph::DependencyGraph;
use crate::node::{NodeDefinition, NODE_TYPE_COMMENT, NODE_TYPE_SUB_WORKFLOW};
use crate::status::WorkflowStatus;

/// A complete workflow description.
///
/// The engine reads a definition at run start and treats the snapshot as
/// immutable for the duration of that run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Monotonically increasing version.
    pub version: u32,
    /// Lifecycle status.
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Ordered sequence of nodes.
    pub nodes: Vec<NodeDefinition>,
    /// Set of edges.
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// Default variables, overlaid by run options at start.
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    /// Free-form metadata; the engine ignores it.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Resource bindings resolved at run start.
    #[serde(default)]
    pub bindings: Vec<ResourceBinding>,
    /// When the definition was created.
    pub created_at: DateTime<Utc>,
    /// When the definition was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create an empty draft workflow.
    #[must_use]
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            version: 1,
            status: WorkflowStatus::Draft,
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: serde_json::Map::new(),
            metadata: serde_json::Map::new(),
            bindings: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a node by key.
    #[must_use]
    pub fn node(&self, key: &NodeKey) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| &n.id == key)
    }

    /// Returns `true` if a node with the given key exists.
    #[must_use]
    pub fn has_node(&self, key: &NodeKey) -> bool {
        self.node(key).is_some()
    }

    /// Validate the definition's structure.
    ///
    /// `has_type` reports whether an executor type name is registered;
    /// the reserved sentinels `comment` and `sub_workflow` are accepted
    /// without consulting it. Checks, in order: non-empty, unique node
    /// and edge keys, addressable node ids, name lengths, edge endpoints
    /// exist, no self-edges, loop bounds ≥ 1, resolvable node types, and
    /// acyclicity once loop edges are removed.
    pub fn validate(&self, has_type: impl Fn(&str) -> bool) -> Result<(), WorkflowError> {
        if self.nodes.is_empty() {
            return Err(WorkflowError::Empty);
        }

        let mut node_keys = HashSet::new();
        for node in &self.nodes {
            if !node_keys.insert(node.id.clone()) {
                return Err(WorkflowError::DuplicateNode(node.id.clone()));
            }
            // Template paths are dot-separated; a node id outside
            // `[A-Za-z0-9_-]` could not be referenced by `{{ id.field }}`.
            let addressable = node
                .id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !addressable {
                return Err(WorkflowError::UnaddressableNodeId(node.id.clone()));
            }
            if node.name.chars().count() > MAX_NODE_NAME_LEN {
                return Err(WorkflowError::NameTooLong {
                    node: node.id.clone(),
                    max: MAX_NODE_NAME_LEN,
                });
            }
            let reserved =
                node.node_type == NODE_TYPE_COMMENT || node.node_type == NODE_TYPE_SUB_WORKFLOW;
            if !reserved && !has_type(&node.node_type) {
                return Err(WorkflowError::UnknownNodeType {
                    node: node.id.clone(),
                    node_type: node.node_type.clone(),
                });
            }
        }

        let mut edge_keys = HashSet::new();
        for edge in &self.edges {
            if !edge_keys.insert(edge.id.clone()) {
                return Err(WorkflowError::DuplicateEdge(edge.id.clone()));
            }
            if edge.source == edge.target {
                return Err(WorkflowError::SelfEdge(edge.id.clone()));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !node_keys.contains(endpoint) {
                    return Err(WorkflowError::UnknownNode {
                        edge: edge.id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
            if let Some(spec) = edge.loop_spec {
                if spec.max_iterations == 0 {
                    return Err(WorkflowError::InvalidLoop(edge.id.clone()));
                }
            }
        }

        // Loop edges removed, what remains must be a DAG.
        let graph = DependencyGraph::new(self);
        graph.check_acyclic()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::edge::EdgeDefinition;
    use cascade_core::EdgeKey;

    fn nk(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    fn ek(s: &str) -> EdgeKey {
        EdgeKey::new(s).unwrap()
    }

    fn node(id: &str, node_type: &str) -> NodeDefinition {
        NodeDefinition::new(nk(id), id.to_uppercase(), node_type)
    }

    fn edge(id: &str, from: &str, to: &str) -> EdgeDefinition {
        EdgeDefinition::new(ek(id), nk(from), nk(to))
    }

    fn workflow(nodes: Vec<NodeDefinition>, edges: Vec<EdgeDefinition>) -> WorkflowDefinition {
        let mut wf = WorkflowDefinition::new(WorkflowId::v4(), "test");
        wf.nodes = nodes;
        wf.edges = edges;
        wf
    }

    fn any_type(_: &str) -> bool {
        true
    }

    #[test]
    fn valid_linear_workflow() {
        let wf = workflow(
            vec![node("a", "t"), node("b", "t")],
            vec![edge("e1", "a", "b")],
        );
        assert!(wf.validate(any_type).is_ok());
    }

    #[test]
    fn empty_workflow_rejected() {
        let wf = workflow(vec![], vec![]);
        assert_eq!(wf.validate(any_type).unwrap_err(), WorkflowError::Empty);
    }

    #[test]
    fn duplicate_node_rejected() {
        let wf = workflow(vec![node("a", "t"), node("a", "t")], vec![]);
        assert_eq!(
            wf.validate(any_type).unwrap_err(),
            WorkflowError::DuplicateNode(nk("a"))
        );
    }

    #[test]
    fn duplicate_edge_rejected() {
        let wf = workflow(
            vec![node("a", "t"), node("b", "t")],
            vec![edge("e", "a", "b"), edge("e", "a", "b")],
        );
        assert_eq!(
            wf.validate(any_type).unwrap_err(),
            WorkflowError::DuplicateEdge(ek("e"))
        );
    }

    #[test]
    fn unknown_endpoint_rejected() {
        let wf = workflow(vec![node("a", "t")], vec![edge("e", "a", "ghost")]);
        assert_eq!(
            wf.validate(any_type).unwrap_err(),
            WorkflowError::UnknownNode {
                edge: ek("e"),
                node: nk("ghost"),
            }
        );
    }

    #[test]
    fn self_edge_rejected_even_as_loop() {
        let wf = workflow(
            vec![node("a", "t")],
            vec![EdgeDefinition::new(ek("e"), nk("a"), nk("a")).with_loop(3)],
        );
        assert_eq!(
            wf.validate(any_type).unwrap_err(),
            WorkflowError::SelfEdge(ek("e"))
        );
    }

    #[test]
    fn zero_iteration_loop_rejected() {
        let wf = workflow(
            vec![node("a", "t"), node("b", "t")],
            vec![edge("fwd", "a", "b"), edge("back", "b", "a").with_loop(0)],
        );
        assert_eq!(
            wf.validate(any_type).unwrap_err(),
            WorkflowError::InvalidLoop(ek("back"))
        );
    }

    #[test]
    fn cycle_without_loop_edge_rejected() {
        let wf = workflow(
            vec![node("a", "t"), node("b", "t")],
            vec![edge("e1", "a", "b"), edge("e2", "b", "a")],
        );
        assert!(matches!(
            wf.validate(any_type).unwrap_err(),
            WorkflowError::CycleDetected(_)
        ));
    }

    #[test]
    fn cycle_through_loop_edge_accepted() {
        let wf = workflow(
            vec![node("a", "t"), node("b", "t")],
            vec![edge("e1", "a", "b"), edge("e2", "b", "a").with_loop(2)],
        );
        assert!(wf.validate(any_type).is_ok());
    }

    #[test]
    fn unknown_type_rejected_but_sentinels_pass() {
        let wf = workflow(
            vec![
                node("a", NODE_TYPE_COMMENT),
                node("b", NODE_TYPE_SUB_WORKFLOW),
                node("c", "mystery"),
            ],
            vec![],
        );
        assert_eq!(
            wf.validate(|_| false).unwrap_err(),
            WorkflowError::UnknownNodeType {
                node: nk("c"),
                node_type: "mystery".into(),
            }
        );
    }

    #[test]
    fn long_name_rejected() {
        let mut n = node("a", "t");
        n.name = "x".repeat(MAX_NODE_NAME_LEN + 1);
        let wf = workflow(vec![n], vec![]);
        assert!(matches!(
            wf.validate(any_type).unwrap_err(),
            WorkflowError::NameTooLong { .. }
        ));
    }

    #[test]
    fn dotted_node_id_rejected() {
        // The key type itself admits dots; the workflow does not, because
        // `{{ a.b }}` would be ambiguous against `{{ a.b.field }}`.
        let dotted = NodeKey::new("fetch.data").unwrap();
        let wf = workflow(vec![NodeDefinition::new(dotted.clone(), "F", "t")], vec![]);
        assert_eq!(
            wf.validate(any_type).unwrap_err(),
            WorkflowError::UnaddressableNodeId(dotted)
        );
    }

    #[test]
    fn node_lookup() {
        let wf = workflow(vec![node("a", "t")], vec![]);
        assert!(wf.has_node(&nk("a")));
        assert!(!wf.has_node(&nk("b")));
        assert_eq!(wf.node(&nk("a")).unwrap().name, "A");
    }

    #[test]
    fn serde_roundtrip() {
        let wf = workflow(
            vec![node("a", "t"), node("b", "t")],
            vec![edge("e", "a", "b").with_condition("x == 1")],
        );
        let json = serde_json::to_string(&wf).unwrap();
        let back: WorkflowDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, wf.id);
        assert_eq!(back.nodes.len(), 2);
        assert_eq!(back.edges[0].condition.as_deref(), Some("x == 1"));
    }
}
