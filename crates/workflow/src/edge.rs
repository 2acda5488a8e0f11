//! Edge definitions: unconditional, conditional, and loop edges.

use cascade_core::{EdgeKey, NodeKey};
use serde::{Deserialize, Serialize};

/// Marks an edge as a bounded back-edge.
///
/// A loop edge may be traversed repeatedly within one run, up to
/// `max_iterations` times. Loops are the only permitted form of cycle in
/// a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSpec {
    /// Upper bound on traversals of this edge per run.
    pub max_iterations: u32,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// Stable identifier, unique within the workflow.
    pub id: EdgeKey,
    /// Source node.
    pub source: NodeKey,
    /// Target node.
    pub target: NodeKey,
    /// Distinguishes multiple named outputs of the source node. When set,
    /// the edge only fires if the source output carries this handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Boolean expression over the run namespace; the edge fires only when
    /// it evaluates to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Present iff this is a loop edge.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "loop")]
    pub loop_spec: Option<LoopSpec>,
}

impl EdgeDefinition {
    /// Create an unconditional edge.
    #[must_use]
    pub fn new(id: EdgeKey, source: NodeKey, target: NodeKey) -> Self {
        Self {
            id,
            source,
            target,
            source_handle: None,
            condition: None,
            loop_spec: None,
        }
    }

    /// Attach a condition expression.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Attach a source handle.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// Turn this edge into a loop edge with the given iteration bound.
    #[must_use]
    pub fn with_loop(mut self, max_iterations: u32) -> Self {
        self.loop_spec = Some(LoopSpec { max_iterations });
        self
    }

    /// Returns `true` if this is a loop edge.
    #[must_use]
    pub fn is_loop(&self) -> bool {
        self.loop_spec.is_some()
    }
}
