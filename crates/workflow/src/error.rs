//! Workflow validation errors.

use cascade_core::{EdgeKey, NodeKey};
use thiserror::Error;

/// Errors produced when a workflow definition fails structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The workflow has no nodes.
    #[error("workflow has no nodes")]
    Empty,

    /// Two nodes share the same key.
    #[error("duplicate node id '{0}'")]
    DuplicateNode(NodeKey),

    /// Two edges share the same key.
    #[error("duplicate edge id '{0}'")]
    DuplicateEdge(EdgeKey),

    /// An edge references a node that does not exist.
    #[error("edge '{edge}' references unknown node '{node}'")]
    UnknownNode {
        /// The offending edge.
        edge: EdgeKey,
        /// The missing node key.
        node: NodeKey,
    },

    /// An edge connects a node to itself.
    #[error("edge '{0}' connects a node to itself")]
    SelfEdge(EdgeKey),

    /// A loop edge has a zero iteration bound.
    #[error("loop edge '{0}' must allow at least one iteration")]
    InvalidLoop(EdgeKey),

    /// The graph contains a cycle not expressed through loop edges.
    #[error("workflow graph contains a cycle through nodes {0:?}")]
    CycleDetected(Vec<NodeKey>),

    /// A node names a type that is neither registered nor reserved.
    #[error("node '{node}' has unresolvable type '{node_type}'")]
    UnknownNodeType {
        /// The offending node.
        node: NodeKey,
        /// The unresolvable type name.
        node_type: String,
    },

    /// A node display name exceeds the maximum length.
    #[error("node '{node}' name exceeds {max} characters")]
    NameTooLong {
        /// The offending node.
        node: NodeKey,
        /// The enforced limit.
        max: usize,
    },

    /// A node id contains characters template paths cannot address.
    #[error("node id '{0}' contains characters templates cannot address")]
    UnaddressableNodeId(NodeKey),
}
