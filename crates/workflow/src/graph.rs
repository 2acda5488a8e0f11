//! Dependency indexing over a workflow definition.
//!
//! The scheduler routes through keys and indices, never through ambient
//! references, so the only cycles a graph can express are explicit loop
//! edges.

use std::collections::HashMap;

use cascade_core::NodeKey;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::definition::WorkflowDefinition;
use crate::edge::EdgeDefinition;
use crate::error::WorkflowError;

/// An index of a workflow's nodes and edges for scheduling.
///
/// Loop edges are kept out of the dependency relation: they participate in
/// routing (the edge router re-queues their targets) but never in
/// readiness computation or the acyclicity check.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<NodeKey>,
    edges: Vec<EdgeDefinition>,
    /// node key → indices into `edges` of incoming non-loop edges.
    incoming_non_loop: HashMap<NodeKey, Vec<usize>>,
    /// node key → indices into `edges` of all outgoing edges.
    outgoing: HashMap<NodeKey, Vec<usize>>,
}

impl DependencyGraph {
    /// Build the index from a definition.
    ///
    /// Assumes edge endpoints reference existing nodes; callers get that
    /// guarantee from [`WorkflowDefinition::validate`].
    #[must_use]
    pub fn new(workflow: &WorkflowDefinition) -> Self {
        let nodes: Vec<NodeKey> = workflow.nodes.iter().map(|n| n.id.clone()).collect();
        let edges: Vec<EdgeDefinition> = workflow.edges.clone();

        let mut incoming_non_loop: HashMap<NodeKey, Vec<usize>> = HashMap::new();
        let mut outgoing: HashMap<NodeKey, Vec<usize>> = HashMap::new();
        for key in &nodes {
            incoming_non_loop.insert(key.clone(), Vec::new());
            outgoing.insert(key.clone(), Vec::new());
        }
        for (idx, edge) in edges.iter().enumerate() {
            if let Some(out) = outgoing.get_mut(&edge.source) {
                out.push(idx);
            }
            if !edge.is_loop() {
                if let Some(inc) = incoming_non_loop.get_mut(&edge.target) {
                    inc.push(idx);
                }
            }
        }

        Self {
            nodes,
            edges,
            incoming_non_loop,
            outgoing,
        }
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All node keys, in definition order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeKey] {
        &self.nodes
    }

    /// Returns `true` if the graph contains the node.
    #[must_use]
    pub fn contains(&self, key: &NodeKey) -> bool {
        self.outgoing.contains_key(key)
    }

    /// Nodes with no incoming non-loop edges — the run's source nodes.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeKey> {
        self.nodes
            .iter()
            .filter(|key| {
                self.incoming_non_loop
                    .get(*key)
                    .is_none_or(|v| v.is_empty())
            })
            .cloned()
            .collect()
    }

    /// Incoming non-loop edges of a node.
    #[must_use]
    pub fn incoming_non_loop(&self, key: &NodeKey) -> Vec<&EdgeDefinition> {
        self.incoming_non_loop
            .get(key)
            .map(|indices| indices.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// All outgoing edges of a node, loop edges included.
    #[must_use]
    pub fn outgoing(&self, key: &NodeKey) -> Vec<&EdgeDefinition> {
        self.outgoing
            .get(key)
            .map(|indices| indices.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    /// Verify that the graph is acyclic once loop edges are removed.
    pub fn check_acyclic(&self) -> Result<(), WorkflowError> {
        let mut graph: DiGraph<NodeKey, ()> = DiGraph::new();
        let mut index: HashMap<&NodeKey, NodeIndex> = HashMap::new();
        for key in &self.nodes {
            index.insert(key, graph.add_node(key.clone()));
        }
        for edge in &self.edges {
            if edge.is_loop() {
                continue;
            }
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                graph.add_edge(s, t, ());
            }
        }

        for component in tarjan_scc(&graph) {
            if component.len() > 1 {
                let cycle: Vec<NodeKey> =
                    component.iter().map(|&ix| graph[ix].clone()).collect();
                return Err(WorkflowError::CycleDetected(cycle));
            }
        }
        Ok(())
    }
}
