//! The execution manager: run start, the wave loop, resume, cancel.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use cascade_core::constants::MAX_SUB_WORKFLOW_DEPTH;
use cascade_core::{ErrorClass, ExecutionId, NodeKey, WorkflowId};
use cascade_eventbus::{EventEmitter, EventPipeline, EventSink, RunWebhookSink};
use cascade_execution::{
    Checkpoint, CheckpointStore, ExecutionEvent, ExecutionState, ExecutionStatus, NodeAttempt,
};
use cascade_expression::{Condition, ResolveContext, Template};
use cascade_executor::ExecutorRegistry;
use cascade_storage::{ExecutionRepository, ResourceRepository, WorkflowRepository};
use cascade_workflow::{DependencyGraph, NodeDefinition, NodeState, WorkflowDefinition};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::options::RunOptions;
use crate::planner::WavePlanner;
use crate::router::{EdgeOutcome, EdgeRouter, RouteResult};
use crate::runner::{run_node, Dispatch, NodeOutcome, NodeRun};

/// How a run comes into being: fresh under a pre-assigned id, or resumed
/// from a checkpoint.
enum RunMode {
    Fresh(ExecutionId),
    Resume(Checkpoint),
}

/// Removes an execution from the active set when its run ends, however it
/// ends.
struct ActiveGuard {
    active: Arc<DashMap<ExecutionId, CancellationToken>>,
    id: ExecutionId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.remove(&self.id);
    }
}

/// Orchestrates runs: validation, the wave loop, checkpointing, resume,
/// and cancellation. One manager serves many concurrent executions; each
/// run's state is owned by its scheduler task.
///
/// Cloning is cheap and clones share the active-run set, so a clone can
/// cancel what the original started.
#[derive(Clone)]
pub struct ExecutionManager {
    registry: Arc<ExecutorRegistry>,
    workflows: Arc<dyn WorkflowRepository>,
    executions: Arc<dyn ExecutionRepository>,
    resources: Arc<dyn ResourceRepository>,
    checkpoints: Arc<dyn CheckpointStore>,
    sinks: Vec<Arc<dyn EventSink>>,
    active: Arc<DashMap<ExecutionId, CancellationToken>>,
}

impl ExecutionManager {
    /// Create a manager over the given collaborators. No sinks are
    /// registered initially.
    #[must_use]
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        workflows: Arc<dyn WorkflowRepository>,
        executions: Arc<dyn ExecutionRepository>,
        resources: Arc<dyn ResourceRepository>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            registry,
            workflows,
            executions,
            resources,
            checkpoints,
            sinks: Vec::new(),
            active: Arc::new(DashMap::new()),
        }
    }

    /// Register a sink that receives every run's events.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// The executor registry this manager resolves node types through.
    #[must_use]
    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Returns `true` while the execution's scheduler task is live.
    #[must_use]
    pub fn is_active(&self, execution_id: ExecutionId) -> bool {
        self.active.contains_key(&execution_id)
    }

    /// Request cancellation of an active run. Returns `false` if the
    /// execution is not active.
    pub fn cancel(&self, execution_id: ExecutionId) -> bool {
        match self.active.get(&execution_id) {
            Some(token) => {
                info!(execution_id = %execution_id, "cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Statically validate a workflow: structure, executor configs, edge
    /// conditions, and template syntax.
    pub fn validate_workflow(&self, workflow: &WorkflowDefinition) -> Result<(), EngineError> {
        workflow.validate(|node_type| self.registry.has(node_type))?;

        for node in &workflow.nodes {
            check_templates(&node.id, &Value::Object(node.config.clone()))?;
            if let Ok(executor) = self.registry.get(&node.node_type) {
                executor
                    .validate(&node.config)
                    .map_err(|e| EngineError::NodeConfig {
                        node: node.id.to_string(),
                        message: e.message,
                    })?;
            }
        }
        for edge in &workflow.edges {
            if let Some(condition) = &edge.condition {
                Condition::parse(condition).map_err(|e| EngineError::InvalidCondition {
                    edge: edge.id.to_string(),
                    message: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Validate and persist a workflow. Invalid workflows are refused and
    /// not persisted.
    pub async fn import_workflow(&self, workflow: WorkflowDefinition) -> Result<(), EngineError> {
        self.validate_workflow(&workflow)?;
        self.workflows.create(workflow).await?;
        Ok(())
    }

    /// Start a run of a stored workflow and await its terminal state.
    pub async fn execute(
        &self,
        workflow_id: WorkflowId,
        input: serde_json::Map<String, Value>,
        options: RunOptions,
    ) -> Result<ExecutionState, EngineError> {
        let workflow = self
            .workflows
            .find_by_id_with_relations(workflow_id)
            .await
            .map_err(|_| EngineError::WorkflowNotFound(workflow_id))?;
        self.run(
            Arc::new(workflow),
            input,
            options,
            0,
            RunMode::Fresh(ExecutionId::v4()),
            None,
        )
        .await
    }

    /// Start a run in the background and return its execution id
    /// immediately. Trigger ingress uses this; the run's fate is visible
    /// through the execution repository and the event sinks.
    pub fn start(
        &self,
        workflow_id: WorkflowId,
        input: serde_json::Map<String, Value>,
        options: RunOptions,
    ) -> ExecutionId {
        let execution_id = ExecutionId::v4();
        let manager = self.clone();
        tokio::spawn(async move {
            let workflow = match manager.workflows.find_by_id_with_relations(workflow_id).await {
                Ok(workflow) => workflow,
                Err(err) => {
                    error!(%workflow_id, %err, "triggered workflow not found");
                    return;
                }
            };
            if let Err(err) = manager
                .run(
                    Arc::new(workflow),
                    input,
                    options,
                    0,
                    RunMode::Fresh(execution_id),
                    None,
                )
                .await
            {
                warn!(%execution_id, %err, "triggered execution failed to run");
            }
        });
        execution_id
    }

    /// Start a run of a definition that is not necessarily stored.
    pub async fn execute_definition(
        &self,
        workflow: WorkflowDefinition,
        input: serde_json::Map<String, Value>,
        options: RunOptions,
    ) -> Result<ExecutionState, EngineError> {
        self.run(
            Arc::new(workflow),
            input,
            options,
            0,
            RunMode::Fresh(ExecutionId::v4()),
            None,
        )
        .await
    }

    /// Resume an execution from its latest checkpoint.
    ///
    /// The checkpoint must be compatible with the live workflow; nodes it
    /// records as settled are not re-executed, and scheduling continues
    /// at the wave after the snapshot.
    pub async fn resume(
        &self,
        execution_id: ExecutionId,
        options: RunOptions,
    ) -> Result<ExecutionState, EngineError> {
        let checkpoint = self
            .checkpoints
            .latest(execution_id)
            .await?
            .ok_or_else(|| {
                EngineError::Storage(cascade_storage::StorageError::NotFound(format!(
                    "no checkpoint for execution {execution_id}"
                )))
            })?;
        let workflow = self
            .workflows
            .find_by_id_with_relations(checkpoint.workflow_id)
            .await
            .map_err(|_| EngineError::WorkflowNotFound(checkpoint.workflow_id))?;
        let input = self
            .executions
            .find_by_id_with_relations(execution_id)
            .await
            .map(|state| state.input)
            .unwrap_or_default();
        self.run(
            Arc::new(workflow),
            input,
            options,
            0,
            RunMode::Resume(checkpoint),
            None,
        )
        .await
    }

    /// The scheduler loop: plan wave → dispatch → barrier → record →
    /// route → checkpoint → repeat.
    #[allow(clippy::too_many_lines)]
    fn run<'a>(
        &'a self,
        workflow: Arc<WorkflowDefinition>,
        input: serde_json::Map<String, Value>,
        options: RunOptions,
        depth: usize,
        mode: RunMode,
        parent_cancel: Option<CancellationToken>,
    ) -> Pin<Box<dyn Future<Output = Result<ExecutionState, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            if depth > MAX_SUB_WORKFLOW_DEPTH {
                return Err(EngineError::SubWorkflowDepthExceeded(MAX_SUB_WORKFLOW_DEPTH));
            }
            workflow.validate(|node_type| self.registry.has(node_type))?;
            let graph = DependencyGraph::new(&workflow);
            let node_keys: Vec<NodeKey> = workflow.nodes.iter().map(|n| n.id.clone()).collect();

            let resuming = matches!(mode, RunMode::Resume(_));
            let (mut state, start_wave) = match &mode {
                RunMode::Resume(checkpoint) => {
                    checkpoint.validate_against(&workflow)?;
                    let mut state =
                        ExecutionState::new(checkpoint.execution_id, workflow.id, &node_keys);
                    checkpoint.apply(&mut state)?;
                    (state, checkpoint.wave_index + 1)
                }
                RunMode::Fresh(id) => {
                    let state = ExecutionState::new(*id, workflow.id, &node_keys);
                    (state, 0)
                }
            };
            let execution_id = state.execution_id;

            // At most one active run per execution id.
            let token = match parent_cancel {
                Some(parent) => parent.child_token(),
                None => CancellationToken::new(),
            };
            {
                use dashmap::mapref::entry::Entry;
                match self.active.entry(execution_id) {
                    Entry::Occupied(_) => return Err(EngineError::AlreadyActive(execution_id)),
                    Entry::Vacant(vacant) => {
                        vacant.insert(token.clone());
                    }
                }
            }
            let _guard = ActiveGuard {
                active: Arc::clone(&self.active),
                id: execution_id,
            };

            // Effective variables: workflow defaults, checkpoint snapshot
            // (on resume), then the run options overlay.
            if !resuming {
                state.variables = workflow.variables.clone();
            }
            for (key, value) in &options.variables {
                state.variables.insert(key.clone(), value.clone());
            }
            state.input = input;

            if resuming {
                self.executions.update(state.clone()).await?;
            } else {
                self.executions.create(state.clone()).await?;
            }

            // Resource bindings resolve before any node runs; an
            // unresolved alias fails the run outright.
            let mut resources: HashMap<String, Value> = HashMap::new();
            for binding in &workflow.bindings {
                let resolved = async {
                    self.resources
                        .bind_alias(execution_id, &binding.alias, binding.resource_id)
                        .await?;
                    self.resources.get_by_alias(execution_id, &binding.alias).await
                }
                .await;
                match resolved {
                    Ok(record) => {
                        resources.insert(binding.alias.clone(), record.payload);
                    }
                    Err(err) => {
                        error!(
                            execution_id = %execution_id,
                            alias = %binding.alias,
                            %err,
                            "resource alias failed to resolve"
                        );
                        state.error = Some(format!(
                            "unresolved resource alias '{}'",
                            binding.alias
                        ));
                        state.transition_status(ExecutionStatus::Failed)?;
                        self.executions.update(state).await?;
                        return Err(EngineError::UnresolvedAlias(binding.alias.clone()));
                    }
                }
            }

            // Event pipeline: shared sinks plus this run's webhooks.
            let mut sinks = self.sinks.clone();
            for webhook in &options.webhooks {
                sinks.push(Arc::new(RunWebhookSink::new(webhook.clone())) as Arc<dyn EventSink>);
            }
            let pipeline = EventPipeline::spawn(sinks, options.observer_buffer_size);
            let emitter = pipeline.emitter();

            // The pipeline drains even when the loop below errors out, so
            // sinks never miss already-emitted events.
            let result: Result<ExecutionState, EngineError> = async {
                state.transition_status(ExecutionStatus::Running)?;
                self.executions.update(state.clone()).await?;
                emitter.emit(ExecutionEvent::execution_started(execution_id)).await;
                info!(
                    execution_id = %execution_id,
                    workflow_id = %workflow.id,
                    resumed = resuming,
                    "execution started"
                );

                let run_started = Instant::now();
                let deadline = run_started + options.timeout;

                let mut ctx = ResolveContext::new()
                    .with_variables(state.variables.clone())
                    .with_env(options.env.clone());
                let mut planner = WavePlanner::new();
                let mut router = EdgeRouter::new();
                let mut contributions: HashMap<NodeKey, BTreeMap<String, Value>> = HashMap::new();
                let mut loop_inputs: HashMap<NodeKey, Value> = HashMap::new();
                let mut total_output_bytes: u64 = 0;

                // On resume, replay routing from the recorded outputs so the
                // planner sees the same edge resolutions the crashed run did.
                if resuming {
                    for key in graph.nodes() {
                        if let Some(ns) = state.node_state(key) {
                            if let (NodeState::Completed, Some(output)) = (ns.state, &ns.output) {
                                ctx.set_node_output(key.as_str(), output.clone());
                                total_output_bytes += value_bytes(output);
                            }
                        }
                    }
                    for key in graph.nodes() {
                        let Some(ns) = state.node_state(key) else { continue };
                        match ns.state {
                            NodeState::Completed => {
                                let output = ns.output.clone().unwrap_or(Value::Null);
                                let route = router.route(&graph, key, &output, &ctx);
                                apply_route(&route, &mut planner, &mut contributions, &mut loop_inputs);
                            }
                            NodeState::Skipped | NodeState::Failed => {
                                for edge in graph.outgoing(key) {
                                    if !edge.is_loop() {
                                        planner.resolve_edge(edge.id.clone(), EdgeOutcome::False);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }

                let mut wave_index = start_wave;
                let mut run_failure: Option<(String, String)> = None;
                let mut deadlocked = false;
                let mut timed_out = false;

                'waves: loop {
                    if token.is_cancelled() {
                        break 'waves;
                    }
                    if Instant::now() >= deadline {
                        timed_out = true;
                        break 'waves;
                    }

                    let plan = planner.plan(&graph, &state);
                    for key in &plan.skip {
                        state.node_state_mut(key)?.transition_to(NodeState::Skipped)?;
                        let name = node_name(&workflow, key);
                        emitter
                            .emit(ExecutionEvent::node_skipped(
                                execution_id,
                                wave_index,
                                key.clone(),
                                name,
                            ))
                            .await;
                    }

                    if plan.ready.is_empty() {
                        let frontier_remains = state
                            .node_states
                            .values()
                            .any(|ns| ns.state == NodeState::Pending);
                        if frontier_remains {
                            deadlocked = true;
                        }
                        break 'waves;
                    }

                    emitter
                        .emit(ExecutionEvent::wave_started(execution_id, wave_index))
                        .await;
                    debug!(
                        execution_id = %execution_id,
                        wave_index,
                        nodes = plan.ready.len(),
                        "wave dispatch"
                    );

                    let semaphore = Arc::new(Semaphore::new(options.max_parallelism));
                    let mut join_set: JoinSet<NodeRun> = JoinSet::new();
                    let mut results: Vec<NodeRun> = Vec::new();
                    let mut dispatched: HashSet<NodeKey> = HashSet::new();

                    for key in &plan.ready {
                        let Some(node) = workflow.node(key).cloned() else {
                            continue;
                        };

                        // Comment nodes are inert: skipped, never dispatched.
                        if node.is_comment() {
                            state.node_state_mut(key)?.transition_to(NodeState::Skipped)?;
                            for edge in graph.outgoing(key) {
                                if !edge.is_loop() {
                                    planner.resolve_edge(edge.id.clone(), EdgeOutcome::False);
                                }
                            }
                            emitter
                                .emit(ExecutionEvent::node_skipped(
                                    execution_id,
                                    wave_index,
                                    key.clone(),
                                    node.name.clone(),
                                ))
                                .await;
                            continue;
                        }

                        let input_value = next_input(
                            key,
                            &mut loop_inputs,
                            &mut contributions,
                            &state.input,
                        );
                        {
                            let ns = state.node_state_mut(key)?;
                            ns.transition_to(NodeState::Running)?;
                            ns.input = Some(input_value.clone());
                        }
                        emitter
                            .emit(ExecutionEvent::node_started(
                                execution_id,
                                wave_index,
                                key.clone(),
                                node.name.clone(),
                            ))
                            .await;
                        dispatched.insert(key.clone());

                        if node.is_sub_workflow() {
                            // Nested runs execute inline in the scheduler
                            // task; the node deadline bounds the child run.
                            let run = self
                                .run_sub_workflow(&node, &input_value, &ctx, &options, depth, &token)
                                .await;
                            results.push(run);
                            continue;
                        }

                        match self.registry.get(&node.node_type) {
                            Ok(executor) => {
                                let dispatch = Dispatch {
                                    execution_id,
                                    workflow_id: workflow.id,
                                    node,
                                    input: input_value,
                                    ctx: ctx.clone(),
                                    resources: resources.clone(),
                                    env: options.env.clone(),
                                    cancellation: token.clone(),
                                    node_timeout: options.node_timeout,
                                    max_output_size: options.max_output_size,
                                    retry_policy: options.retry_policy.clone(),
                                    wave_index,
                                    emitter: emitter.clone(),
                                };
                                let semaphore = Arc::clone(&semaphore);
                                join_set.spawn(async move {
                                    let _permit = semaphore.acquire_owned().await.ok();
                                    run_node(dispatch, executor).await
                                });
                            }
                            Err(err) => {
                                results.push(NodeRun {
                                    node: key.clone(),
                                    outcome: NodeOutcome::Failure {
                                        class: ErrorClass::ExecutorError,
                                        message: err.to_string(),
                                    },
                                    attempts: vec![NodeAttempt::start(1)],
                                    resolved_config: None,
                                });
                            }
                        }
                    }

                    // The wave barrier: every dispatched node terminates
                    // before the next wave is planned.
                    while let Some(joined) = join_set.join_next().await {
                        match joined {
                            Ok(run) => results.push(run),
                            Err(join_error) => {
                                error!(execution_id = %execution_id, %join_error, "node task aborted");
                            }
                        }
                    }

                    // A panicked task leaves its node running; fail it.
                    let mut results_by_key: HashMap<NodeKey, NodeRun> = results
                        .into_iter()
                        .map(|run| (run.node.clone(), run))
                        .collect();
                    for key in &dispatched {
                        if !results_by_key.contains_key(key) {
                            results_by_key.insert(
                                key.clone(),
                                NodeRun {
                                    node: key.clone(),
                                    outcome: NodeOutcome::Failure {
                                        class: ErrorClass::ExecutorError,
                                        message: "node task aborted".into(),
                                    },
                                    attempts: Vec::new(),
                                    resolved_config: None,
                                },
                            );
                        }
                    }

                    // Record results in dispatch order; the scheduler task is
                    // the only writer of execution state.
                    for key in &plan.ready {
                        let Some(run) = results_by_key.remove(key) else {
                            continue;
                        };
                        let run_attempt_count = run.attempts.len() as u32;
                        {
                            let ns = state.node_state_mut(key)?;
                            ns.retry_count += run_attempt_count.saturating_sub(1);
                            ns.attempts.extend(run.attempts);
                            if run.resolved_config.is_some() {
                                ns.resolved_config = run.resolved_config;
                            }
                        }

                        match run.outcome {
                            NodeOutcome::Success(output) => {
                                let bytes = value_bytes(&output);
                                let over_budget = options.max_total_memory > 0
                                    && total_output_bytes + bytes > options.max_total_memory;
                                if over_budget {
                                    let message = format!(
                                        "run output memory {} bytes exceeds limit of {}",
                                        total_output_bytes + bytes,
                                        options.max_total_memory
                                    );
                                    self.record_failure(
                                        &mut state,
                                        &workflow,
                                        key,
                                        ErrorClass::ResourceExceeded,
                                        message.clone(),
                                        wave_index,
                                        &emitter,
                                    )
                                    .await?;
                                    absorb_or_fail(
                                        &options,
                                        &mut run_failure,
                                        &workflow,
                                        key,
                                        &message,
                                        &mut ctx,
                                        &graph,
                                        &mut router,
                                        &mut planner,
                                        &mut contributions,
                                        &mut loop_inputs,
                                        &mut state,
                                    )?;
                                    continue;
                                }
                                total_output_bytes += bytes;

                                {
                                    let ns = state.node_state_mut(key)?;
                                    ns.output = Some(output.clone());
                                    ns.transition_to(NodeState::Completed)?;
                                }
                                let duration = state
                                    .node_state(key)
                                    .and_then(cascade_execution::NodeExecutionState::duration_ms)
                                    .unwrap_or(0);
                                emitter
                                    .emit(ExecutionEvent::node_completed(
                                        execution_id,
                                        wave_index,
                                        key.clone(),
                                        node_name(&workflow, key),
                                        duration,
                                    ))
                                    .await;

                                ctx.set_node_output(key.as_str(), output.clone());
                                let route = router.route(&graph, key, &output, &ctx);
                                apply_route(&route, &mut planner, &mut contributions, &mut loop_inputs);
                                requeue_targets(&route, &mut state)?;
                            }
                            NodeOutcome::Failure { class, message } => {
                                self.record_failure(
                                    &mut state,
                                    &workflow,
                                    key,
                                    class,
                                    message.clone(),
                                    wave_index,
                                    &emitter,
                                )
                                .await?;

                                if class == ErrorClass::Cancelled && token.is_cancelled() {
                                    // The run-level cancellation handler owns
                                    // the terminal transition.
                                    continue;
                                }
                                absorb_or_fail(
                                    &options,
                                    &mut run_failure,
                                    &workflow,
                                    key,
                                    &message,
                                    &mut ctx,
                                    &graph,
                                    &mut router,
                                    &mut planner,
                                    &mut contributions,
                                    &mut loop_inputs,
                                    &mut state,
                                )?;
                            }
                        }
                    }

                    emitter
                        .emit(ExecutionEvent::wave_completed(execution_id, wave_index))
                        .await;

                    // Snapshot between waves.
                    self.checkpoints
                        .save(Checkpoint::capture(&state, wave_index))
                        .await?;
                    self.executions.update(state.clone()).await?;
                    wave_index += 1;

                    if run_failure.is_some() {
                        break 'waves;
                    }
                }

                // Terminalize.
                let duration_ms = run_started.elapsed().as_millis() as u64;
                if token.is_cancelled() {
                    state.transition_status(ExecutionStatus::Cancelled)?;
                    emitter.emit(ExecutionEvent::execution_cancelled(execution_id)).await;
                    info!(execution_id = %execution_id, "execution cancelled");
                } else if timed_out {
                    state.error = Some(format!(
                        "execution exceeded its {}ms deadline",
                        options.timeout.as_millis()
                    ));
                    state.transition_status(ExecutionStatus::Failed)?;
                    emitter
                        .emit(ExecutionEvent::execution_failed(
                            execution_id,
                            duration_ms,
                            state.error.clone().unwrap_or_default(),
                        ))
                        .await;
                } else if deadlocked {
                    state.error = Some("deadlock".into());
                    state.transition_status(ExecutionStatus::Failed)?;
                    emitter
                        .emit(ExecutionEvent::execution_failed(
                            execution_id,
                            duration_ms,
                            "deadlock",
                        ))
                        .await;
                    error!(execution_id = %execution_id, "scheduler deadlock");
                } else if let Some((node_name, message)) = run_failure {
                    state.error = Some(format!("node '{node_name}' failed: {message}"));
                    state.transition_status(ExecutionStatus::Failed)?;
                    emitter
                        .emit(ExecutionEvent::execution_failed(
                            execution_id,
                            duration_ms,
                            state.error.clone().unwrap_or_default(),
                        ))
                        .await;
                } else {
                    state.output = Some(run_output(&graph, &state));
                    state.transition_status(ExecutionStatus::Completed)?;
                    emitter
                        .emit(ExecutionEvent::execution_completed(execution_id, duration_ms))
                        .await;
                    info!(execution_id = %execution_id, duration_ms, "execution completed");
                }

                self.executions.update(state.clone()).await?;
                Ok(state)
            }
            .await;

            pipeline.shutdown().await;
            result
        })
    }

    /// Record a node failure into state and emit `node.failed`.
    #[allow(clippy::too_many_arguments)]
    async fn record_failure(
        &self,
        state: &mut ExecutionState,
        workflow: &WorkflowDefinition,
        key: &NodeKey,
        class: ErrorClass,
        message: String,
        wave_index: u32,
        emitter: &EventEmitter,
    ) -> Result<(), EngineError> {
        {
            let ns = state.node_state_mut(key)?;
            ns.error = Some(message.clone());
            ns.error_class = Some(class);
            ns.transition_to(NodeState::Failed)?;
        }
        let duration = state
            .node_state(key)
            .and_then(cascade_execution::NodeExecutionState::duration_ms)
            .unwrap_or(0);
        emitter
            .emit(ExecutionEvent::node_failed(
                state.execution_id,
                wave_index,
                key.clone(),
                node_name(workflow, key),
                duration,
                message,
            ))
            .await;
        Ok(())
    }

    /// Run a `sub_workflow` node as a nested execution. The child's
    /// output becomes the node's output.
    async fn run_sub_workflow(
        &self,
        node: &NodeDefinition,
        input: &Value,
        ctx: &ResolveContext,
        options: &RunOptions,
        depth: usize,
        token: &CancellationToken,
    ) -> NodeRun {
        let mut attempt = NodeAttempt::start(1);
        let fail = |mut attempt: NodeAttempt, class: ErrorClass, message: String| {
            attempt.fail(class, message.clone());
            NodeRun {
                node: node.id.clone(),
                outcome: NodeOutcome::Failure { class, message },
                attempts: vec![attempt],
                resolved_config: None,
            }
        };

        let config = match cascade_expression::resolve_config(&node.config, ctx) {
            Ok(config) => config,
            Err(err) => {
                return fail(attempt, ErrorClass::TemplateUnresolved, err.to_string());
            }
        };

        let workflow_id = match config
            .get("workflow_id")
            .and_then(Value::as_str)
            .map(WorkflowId::parse)
        {
            Some(Ok(id)) => id,
            Some(Err(err)) => {
                return fail(attempt, ErrorClass::Validation, format!("bad workflow id: {err}"));
            }
            None => {
                return fail(
                    attempt,
                    ErrorClass::Validation,
                    "sub_workflow config requires a 'workflow_id' string".into(),
                );
            }
        };

        let child_workflow = match self.workflows.find_by_id_with_relations(workflow_id).await {
            Ok(workflow) => workflow,
            Err(err) => return fail(attempt, ErrorClass::NotFound, err.to_string()),
        };

        let child_input = match config.get("input") {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("value".into(), other.clone());
                map
            }
            None => match input {
                Value::Object(map) => map.clone(),
                other => {
                    let mut map = serde_json::Map::new();
                    map.insert("value".into(), other.clone());
                    map
                }
            },
        };

        let child_options = RunOptions {
            env: options.env.clone(),
            // The parent's node deadline bounds the whole child run.
            timeout: options.node_timeout,
            node_timeout: options.node_timeout,
            ..RunOptions::default()
        };

        let result = self
            .run(
                Arc::new(child_workflow),
                child_input,
                child_options,
                depth + 1,
                RunMode::Fresh(ExecutionId::v4()),
                Some(token.clone()),
            )
            .await;

        match result {
            Ok(child) if child.status == ExecutionStatus::Completed => {
                attempt.succeed();
                NodeRun {
                    node: node.id.clone(),
                    outcome: NodeOutcome::Success(child.output.unwrap_or(Value::Null)),
                    attempts: vec![attempt],
                    resolved_config: Some(config),
                }
            }
            Ok(child) if child.status == ExecutionStatus::Cancelled => fail(
                attempt,
                ErrorClass::Cancelled,
                "sub-workflow cancelled".into(),
            ),
            Ok(child) => fail(
                attempt,
                ErrorClass::ExecutorError,
                child
                    .error
                    .unwrap_or_else(|| "sub-workflow failed".into()),
            ),
            Err(err) => {
                let class = err.class();
                fail(attempt, class, err.to_string())
            }
        }
    }
}

/// Reject malformed `{{` templates anywhere inside a config value.
fn check_templates(node: &NodeKey, value: &Value) -> Result<(), EngineError> {
    match value {
        Value::String(text) => Template::parse(text)
            .map(|_| ())
            .map_err(|e| EngineError::NodeConfig {
                node: node.to_string(),
                message: e.to_string(),
            }),
        Value::Array(items) => items.iter().try_for_each(|item| check_templates(node, item)),
        Value::Object(map) => map.values().try_for_each(|item| check_templates(node, item)),
        _ => Ok(()),
    }
}

fn node_name(workflow: &WorkflowDefinition, key: &NodeKey) -> String {
    workflow
        .node(key)
        .map_or_else(|| key.to_string(), |node| node.name.clone())
}

fn value_bytes(value: &Value) -> u64 {
    serde_json::to_vec(value).map(|v| v.len() as u64).unwrap_or(0)
}

/// Feed a routing decision into the planner and the input ledger.
fn apply_route(
    route: &RouteResult,
    planner: &mut WavePlanner,
    contributions: &mut HashMap<NodeKey, BTreeMap<String, Value>>,
    loop_inputs: &mut HashMap<NodeKey, Value>,
) {
    for satisfied in &route.satisfied {
        planner.resolve_edge(satisfied.edge.clone(), EdgeOutcome::Satisfied);
        contributions
            .entry(satisfied.target.clone())
            .or_default()
            .insert(satisfied.source.to_string(), satisfied.input.clone());
    }
    for edge in &route.unsatisfied {
        planner.resolve_edge(edge.clone(), EdgeOutcome::False);
    }
    for (target, input) in &route.requeue {
        loop_inputs.insert(target.clone(), input.clone());
    }
}

/// Re-queue settled nodes that a satisfied edge or loop traversal makes
/// reachable again.
fn requeue_targets(route: &RouteResult, state: &mut ExecutionState) -> Result<(), EngineError> {
    for satisfied in &route.satisfied {
        let ns = state.node_state_mut(&satisfied.target)?;
        if matches!(ns.state, NodeState::Completed | NodeState::Skipped) {
            ns.transition_to(NodeState::Pending)?;
        }
    }
    for (target, _) in &route.requeue {
        let ns = state.node_state_mut(target)?;
        if matches!(ns.state, NodeState::Completed | NodeState::Skipped) {
            ns.transition_to(NodeState::Pending)?;
        }
    }
    Ok(())
}

/// Route a failure that `continue_on_error` absorbs, or record it as the
/// run's failure.
#[allow(clippy::too_many_arguments)]
fn absorb_or_fail(
    options: &RunOptions,
    run_failure: &mut Option<(String, String)>,
    workflow: &WorkflowDefinition,
    key: &NodeKey,
    message: &str,
    ctx: &mut ResolveContext,
    graph: &DependencyGraph,
    router: &mut EdgeRouter,
    planner: &mut WavePlanner,
    contributions: &mut HashMap<NodeKey, BTreeMap<String, Value>>,
    loop_inputs: &mut HashMap<NodeKey, Value>,
    state: &mut ExecutionState,
) -> Result<(), EngineError> {
    let absorb = options.continue_on_error && !options.strict_mode;
    if absorb {
        // Downstream scheduling continues as if the node produced an
        // empty output.
        let empty = Value::Object(serde_json::Map::new());
        ctx.set_node_output(key.as_str(), empty.clone());
        let route = router.route(graph, key, &empty, ctx);
        apply_route(&route, planner, contributions, loop_inputs);
        requeue_targets(&route, state)?;
        warn!(node = key.as_str(), message, "node failure absorbed");
    } else if run_failure.is_none() {
        *run_failure = Some((node_name(workflow, key), message.to_string()));
    }
    Ok(())
}

/// The run's output: outputs of completed exit nodes (no outgoing
/// non-loop edges). One exit yields its output directly; several yield a
/// mapping keyed by node id.
fn run_output(graph: &DependencyGraph, state: &ExecutionState) -> Value {
    let mut exits: Vec<(&NodeKey, Value)> = Vec::new();
    for key in graph.nodes() {
        let structural_exit = graph.outgoing(key).iter().all(|edge| edge.is_loop());
        if !structural_exit {
            continue;
        }
        if let Some(ns) = state.node_state(key) {
            if ns.state == NodeState::Completed {
                exits.push((key, ns.output.clone().unwrap_or(Value::Null)));
            }
        }
    }
    match exits.len() {
        0 => Value::Null,
        1 => exits.remove(0).1,
        _ => Value::Object(
            exits
                .into_iter()
                .map(|(key, output)| (key.to_string(), output))
                .collect(),
        ),
    }
}

/// The input a node is dispatched with: a pending loop traversal's value
/// wins, then routed predecessor contributions, then the run input.
fn next_input(
    key: &NodeKey,
    loop_inputs: &mut HashMap<NodeKey, Value>,
    contributions: &mut HashMap<NodeKey, BTreeMap<String, Value>>,
    run_input: &serde_json::Map<String, Value>,
) -> Value {
    if let Some(input) = loop_inputs.remove(key) {
        contributions.remove(key);
        return input;
    }
    if let Some(contrib) = contributions.remove(key) {
        if contrib.len() == 1 {
            if let Some((_, value)) = contrib.into_iter().next() {
                return value;
            }
            return Value::Null;
        }
        return Value::Object(contrib.into_iter().collect());
    }
    Value::Object(run_input.clone())
}
