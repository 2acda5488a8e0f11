//! Wave planning: which pending nodes are ready, which are unreachable.

use std::collections::{HashMap, HashSet};

use cascade_core::{EdgeKey, NodeKey};
use cascade_execution::ExecutionState;
use cascade_workflow::{DependencyGraph, NodeState};

use crate::router::EdgeOutcome;

/// The planner's verdict for the next wave.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Nodes to dispatch now, in definition order.
    pub ready: Vec<NodeKey>,
    /// Nodes whose every incoming non-loop edge resolved without one
    /// firing; they are unreachable and must be marked skipped.
    pub skip: Vec<NodeKey>,
}

/// Plans waves from the edge-resolution state.
///
/// The planner tracks, per non-loop edge, whether routing has resolved it
/// (satisfied or evaluated-false). A pending node becomes ready once all
/// its incoming non-loop edges are resolved and at least one fired — or
/// when it has no incoming non-loop edges at all. A pending node whose
/// edges all resolved without firing is unreachable; skipping it resolves
/// its own outgoing edges as false, which may cascade.
#[derive(Debug, Default)]
pub struct WavePlanner {
    edge_state: HashMap<EdgeKey, EdgeOutcome>,
}

impl WavePlanner {
    /// Create a planner with no resolved edges.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the routing outcome of a non-loop edge. Later loop
    /// iterations may overwrite earlier resolutions.
    pub fn resolve_edge(&mut self, edge: EdgeKey, outcome: EdgeOutcome) {
        self.edge_state.insert(edge, outcome);
    }

    /// The current resolution of an edge, if any.
    #[must_use]
    pub fn edge_outcome(&self, edge: &EdgeKey) -> Option<EdgeOutcome> {
        self.edge_state.get(edge).copied()
    }

    /// Compute the next wave.
    ///
    /// Skip verdicts cascade within this call: a node skipped here
    /// resolves its outgoing non-loop edges to false before the fixpoint
    /// continues.
    #[must_use]
    pub fn plan(&mut self, graph: &DependencyGraph, state: &ExecutionState) -> PlanOutcome {
        let mut outcome = PlanOutcome::default();
        let mut settled: HashSet<NodeKey> = HashSet::new();

        loop {
            let mut progressed = false;

            for key in graph.nodes() {
                if settled.contains(key) {
                    continue;
                }
                let is_pending = state
                    .node_state(key)
                    .is_some_and(|ns| ns.state == NodeState::Pending);
                if !is_pending {
                    continue;
                }

                let incoming = graph.incoming_non_loop(key);
                if incoming.is_empty() {
                    outcome.ready.push(key.clone());
                    settled.insert(key.clone());
                    progressed = true;
                    continue;
                }

                let mut all_resolved = true;
                let mut any_satisfied = false;
                for edge in &incoming {
                    match self.edge_state.get(&edge.id) {
                        Some(EdgeOutcome::Satisfied) => any_satisfied = true,
                        Some(EdgeOutcome::False) => {}
                        None => {
                            all_resolved = false;
                            break;
                        }
                    }
                }
                if !all_resolved {
                    continue;
                }

                if any_satisfied {
                    outcome.ready.push(key.clone());
                } else {
                    outcome.skip.push(key.clone());
                    for edge in graph.outgoing(key) {
                        if !edge.is_loop() {
                            self.edge_state.insert(edge.id.clone(), EdgeOutcome::False);
                        }
                    }
                }
                settled.insert(key.clone());
                progressed = true;
            }

            if !progressed {
                break;
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use cascade_core::{ExecutionId, WorkflowId};
    use cascade_workflow::{EdgeDefinition, NodeDefinition, WorkflowDefinition};

    fn nk(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    fn ek(s: &str) -> EdgeKey {
        EdgeKey::new(s).unwrap()
    }

    fn edge(id: &str, from: &str, to: &str) -> EdgeDefinition {
        EdgeDefinition::new(ek(id), nk(from), nk(to))
    }

    fn setup(nodes: &[&str], edges: Vec<EdgeDefinition>) -> (DependencyGraph, ExecutionState) {
        let mut wf = WorkflowDefinition::new(WorkflowId::v4(), "g");
        wf.nodes = nodes
            .iter()
            .map(|id| NodeDefinition::new(nk(id), *id, "t"))
            .collect();
        wf.edges = edges;
        let keys: Vec<NodeKey> = wf.nodes.iter().map(|n| n.id.clone()).collect();
        let state = ExecutionState::new(ExecutionId::v4(), wf.id, &keys);
        (DependencyGraph::new(&wf), state)
    }

    fn complete(state: &mut ExecutionState, key: &NodeKey) {
        let ns = state.node_state_mut(key).unwrap();
        ns.transition_to(NodeState::Running).unwrap();
        ns.transition_to(NodeState::Completed).unwrap();
    }

    #[test]
    fn first_wave_is_entry_nodes() {
        let (graph, state) = setup(
            &["a", "b", "c"],
            vec![edge("e1", "a", "c"), edge("e2", "b", "c")],
        );
        let mut planner = WavePlanner::new();
        let outcome = planner.plan(&graph, &state);
        assert_eq!(outcome.ready, vec![nk("a"), nk("b")]);
        assert!(outcome.skip.is_empty());
    }

    #[test]
    fn node_waits_for_all_incoming_edges() {
        let (graph, mut state) = setup(
            &["a", "b", "c"],
            vec![edge("e1", "a", "c"), edge("e2", "b", "c")],
        );
        let mut planner = WavePlanner::new();
        complete(&mut state, &nk("a"));
        planner.resolve_edge(ek("e1"), EdgeOutcome::Satisfied);

        // "b" has not settled: "c" is not ready yet.
        let outcome = planner.plan(&graph, &state);
        assert!(outcome.ready.is_empty());

        complete(&mut state, &nk("b"));
        planner.resolve_edge(ek("e2"), EdgeOutcome::Satisfied);
        let outcome = planner.plan(&graph, &state);
        assert_eq!(outcome.ready, vec![nk("c")]);
    }

    #[test]
    fn one_satisfied_edge_suffices() {
        let (graph, mut state) = setup(
            &["a", "b", "c"],
            vec![edge("e1", "a", "c"), edge("e2", "b", "c")],
        );
        let mut planner = WavePlanner::new();
        complete(&mut state, &nk("a"));
        complete(&mut state, &nk("b"));
        planner.resolve_edge(ek("e1"), EdgeOutcome::Satisfied);
        planner.resolve_edge(ek("e2"), EdgeOutcome::False);

        let outcome = planner.plan(&graph, &state);
        assert_eq!(outcome.ready, vec![nk("c")]);
    }

    #[test]
    fn all_false_edges_skip_the_node() {
        let (graph, mut state) = setup(&["a", "b"], vec![edge("e1", "a", "b")]);
        let mut planner = WavePlanner::new();
        complete(&mut state, &nk("a"));
        planner.resolve_edge(ek("e1"), EdgeOutcome::False);

        let outcome = planner.plan(&graph, &state);
        assert!(outcome.ready.is_empty());
        assert_eq!(outcome.skip, vec![nk("b")]);
    }

    #[test]
    fn skip_cascades_downstream() {
        let (graph, mut state) = setup(
            &["a", "b", "c", "d"],
            vec![
                edge("e1", "a", "b"),
                edge("e2", "b", "c"),
                edge("e3", "c", "d"),
            ],
        );
        let mut planner = WavePlanner::new();
        complete(&mut state, &nk("a"));
        planner.resolve_edge(ek("e1"), EdgeOutcome::False);

        let outcome = planner.plan(&graph, &state);
        assert_eq!(outcome.skip, vec![nk("b"), nk("c"), nk("d")]);
    }

    #[test]
    fn loop_edges_never_gate_readiness() {
        let (graph, state) = setup(
            &["a", "b"],
            vec![
                edge("fwd", "a", "b"),
                edge("back", "b", "a").with_loop(3),
            ],
        );
        let mut planner = WavePlanner::new();
        let outcome = planner.plan(&graph, &state);
        // "a" is ready although the loop edge back into it is unresolved.
        assert_eq!(outcome.ready, vec![nk("a")]);
    }

    #[test]
    fn requeued_node_is_ready_again() {
        let (graph, mut state) = setup(&["a", "b"], vec![edge("e1", "a", "b")]);
        let mut planner = WavePlanner::new();
        complete(&mut state, &nk("a"));
        complete(&mut state, &nk("b"));
        planner.resolve_edge(ek("e1"), EdgeOutcome::Satisfied);

        // A loop traversal re-queues "b".
        state
            .node_state_mut(&nk("b"))
            .unwrap()
            .transition_to(NodeState::Pending)
            .unwrap();

        let outcome = planner.plan(&graph, &state);
        assert_eq!(outcome.ready, vec![nk("b")]);
    }

    #[test]
    fn nothing_to_do_when_all_terminal() {
        let (graph, mut state) = setup(&["a"], vec![]);
        let mut planner = WavePlanner::new();
        complete(&mut state, &nk("a"));
        let outcome = planner.plan(&graph, &state);
        assert_eq!(outcome, PlanOutcome::default());
    }
}
