//! Edge routing: which edges fire when a node settles.

use std::collections::HashMap;

use cascade_core::{EdgeKey, NodeKey};
use cascade_expression::{Condition, ResolveContext};
use cascade_workflow::{DependencyGraph, EdgeDefinition};
use serde_json::Value;
use tracing::warn;

/// Resolution of a non-loop edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// The edge fired; its target is satisfied by this source.
    Satisfied,
    /// The edge's condition or handle did not match.
    False,
}

/// A non-loop edge that fired, with the value it routes to its target.
#[derive(Debug, Clone)]
pub struct SatisfiedEdge {
    /// The edge that fired.
    pub edge: EdgeKey,
    /// Its source node.
    pub source: NodeKey,
    /// Its target node.
    pub target: NodeKey,
    /// The routed value: the handle's sub-value when a source handle is
    /// set, the whole source output otherwise.
    pub input: Value,
}

/// The routing decision for one settled node.
#[derive(Debug, Default)]
pub struct RouteResult {
    /// Non-loop edges that fired.
    pub satisfied: Vec<SatisfiedEdge>,
    /// Non-loop edges that resolved false.
    pub unsatisfied: Vec<EdgeKey>,
    /// Loop traversals: target node and the input it re-runs with.
    pub requeue: Vec<(NodeKey, Value)>,
}

/// Routes outgoing edges of settled nodes, owning the per-run loop
/// counters.
#[derive(Debug, Default)]
pub struct EdgeRouter {
    loop_counters: HashMap<EdgeKey, u32>,
}

impl EdgeRouter {
    /// Create a router with zeroed loop counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How often a loop edge has been traversed this run.
    #[must_use]
    pub fn loop_count(&self, edge: &EdgeKey) -> u32 {
        self.loop_counters.get(edge).copied().unwrap_or(0)
    }

    /// Route all outgoing edges of `source`, which settled with `output`.
    ///
    /// Conditions evaluate over the run namespace with the source's
    /// output fields overlaid as top-level names, so `severity == 'x'`
    /// reads the source output directly. When several conditional edges
    /// match, all of them fire.
    pub fn route(
        &mut self,
        graph: &DependencyGraph,
        source: &NodeKey,
        output: &Value,
        ctx: &ResolveContext,
    ) -> RouteResult {
        let eval_ctx = overlay_output(ctx, output);
        let mut result = RouteResult::default();

        for edge in graph.outgoing(source) {
            let selected = handle_matches(edge, output) && condition_holds(edge, &eval_ctx);

            if let Some(spec) = edge.loop_spec {
                if !selected {
                    continue;
                }
                let count = self.loop_counters.entry(edge.id.clone()).or_insert(0);
                if *count < spec.max_iterations {
                    *count += 1;
                    result
                        .requeue
                        .push((edge.target.clone(), routed_input(edge, output)));
                }
                continue;
            }

            if selected {
                result.satisfied.push(SatisfiedEdge {
                    edge: edge.id.clone(),
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    input: routed_input(edge, output),
                });
            } else {
                result.unsatisfied.push(edge.id.clone());
            }
        }

        result
    }
}

/// The input value an edge routes to its target: the source handle's
/// sub-value when a handle is set, the whole output otherwise.
fn routed_input(edge: &EdgeDefinition, output: &Value) -> Value {
    match &edge.source_handle {
        Some(handle) => output.get(handle.as_str()).cloned().unwrap_or(Value::Null),
        None => output.clone(),
    }
}

/// A handle-gated edge fires only when the named handle is present in the
/// source output.
fn handle_matches(edge: &EdgeDefinition, output: &Value) -> bool {
    match &edge.source_handle {
        Some(handle) => output.get(handle.as_str()).is_some(),
        None => true,
    }
}

fn condition_holds(edge: &EdgeDefinition, ctx: &ResolveContext) -> bool {
    match &edge.condition {
        None => true,
        Some(source) => match Condition::parse(source) {
            Ok(condition) => condition.evaluate(ctx),
            Err(error) => {
                // Validation catches this at import; at run time an
                // unparseable condition never fires.
                warn!(edge = %edge.id, %error, "edge condition failed to parse");
                false
            }
        },
    }
}

/// Overlay the fields of an object output as top-level names.
fn overlay_output(ctx: &ResolveContext, output: &Value) -> ResolveContext {
    let mut eval_ctx = ctx.clone();
    if let Value::Object(fields) = output {
        for (name, value) in fields {
            eval_ctx.set_variable(name.clone(), value.clone());
        }
    }
    eval_ctx
}
