//! Per-node dispatch: template resolution, attempt loop, deadlines.

use std::sync::Arc;
use std::time::Duration;

use cascade_core::{ErrorClass, ExecutionId, NodeKey, WorkflowId};
use cascade_eventbus::EventEmitter;
use cascade_execution::{ExecutionEvent, NodeAttempt, RetryPolicy};
use cascade_expression::{resolve_config, ResolveContext};
use cascade_executor::{Executor, ExecutorError, NodeContext};
use cascade_workflow::NodeDefinition;
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What a dispatched node produced.
#[derive(Debug)]
pub(crate) enum NodeOutcome {
    /// The node completed with this output.
    Success(Value),
    /// The node failed terminally.
    Failure {
        /// Failure class of the final attempt.
        class: ErrorClass,
        /// Message of the final attempt.
        message: String,
    },
}

/// The result of one node dispatch, handed back over the wave barrier.
#[derive(Debug)]
pub(crate) struct NodeRun {
    /// Which node ran.
    pub node: NodeKey,
    /// Success or terminal failure.
    pub outcome: NodeOutcome,
    /// Attempt history, oldest first.
    pub attempts: Vec<NodeAttempt>,
    /// Configuration after template expansion, when resolution got that
    /// far.
    pub resolved_config: Option<serde_json::Map<String, Value>>,
}

/// Everything a dispatch needs besides the executor itself.
pub(crate) struct Dispatch {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub node: NodeDefinition,
    pub input: Value,
    pub ctx: ResolveContext,
    pub resources: std::collections::HashMap<String, Value>,
    pub env: std::collections::HashMap<String, String>,
    pub cancellation: CancellationToken,
    pub node_timeout: Duration,
    pub max_output_size: u64,
    pub retry_policy: RetryPolicy,
    pub wave_index: u32,
    pub emitter: EventEmitter,
}

/// Run one node to a terminal outcome, driving the retry loop.
///
/// Templates resolve inside each attempt (lazily, against the wave-start
/// snapshot), `node.retrying` is emitted between attempts, and backoff
/// sleeps race against cancellation.
pub(crate) async fn run_node(dispatch: Dispatch, executor: Arc<dyn Executor>) -> NodeRun {
    let Dispatch {
        execution_id,
        workflow_id,
        node,
        input,
        ctx,
        resources,
        env,
        cancellation,
        node_timeout,
        max_output_size,
        retry_policy,
        wave_index,
        emitter,
    } = dispatch;

    let mut attempts: Vec<NodeAttempt> = Vec::new();
    let mut resolved_config = None;

    loop {
        let attempt_number = attempts.len() as u32 + 1;
        let mut attempt = NodeAttempt::start(attempt_number);

        let result = run_attempt(
            execution_id,
            workflow_id,
            &node,
            &input,
            &ctx,
            &resources,
            &env,
            &cancellation,
            node_timeout,
            max_output_size,
            &mut resolved_config,
            executor.as_ref(),
        )
        .await;

        match result {
            Ok(output) => {
                attempt.succeed();
                attempts.push(attempt);
                return NodeRun {
                    node: node.id,
                    outcome: NodeOutcome::Success(output),
                    attempts,
                    resolved_config,
                };
            }
            Err(error) => {
                attempt.fail(error.class, error.message.clone());
                attempts.push(attempt);

                let retryable = error.class != ErrorClass::Cancelled
                    && retry_policy.should_retry(error.class, attempt_number);
                if !retryable {
                    // Exhausting a multi-attempt policy reclassifies the
                    // failure; a filtered class or single-attempt policy
                    // keeps the original.
                    let class = if error.class != ErrorClass::Cancelled
                        && retry_policy.max_attempts > 1
                        && attempt_number >= retry_policy.max_attempts
                    {
                        ErrorClass::RetryExhausted
                    } else {
                        error.class
                    };
                    return NodeRun {
                        node: node.id,
                        outcome: NodeOutcome::Failure {
                            class,
                            message: error.message,
                        },
                        attempts,
                        resolved_config,
                    };
                }

                debug!(
                    node = node.id.as_str(),
                    attempt = attempt_number,
                    error = %error,
                    "node attempt failed, backing off"
                );
                emitter
                    .emit(ExecutionEvent::node_retrying(
                        execution_id,
                        wave_index,
                        node.id.clone(),
                        node.name.clone(),
                        attempt_number,
                    ))
                    .await;

                let delay = retry_policy.delay_for(attempt_number);
                tokio::select! {
                    () = cancellation.cancelled() => {
                        return NodeRun {
                            node: node.id,
                            outcome: NodeOutcome::Failure {
                                class: ErrorClass::Cancelled,
                                message: "execution cancelled".into(),
                            },
                            attempts,
                            resolved_config,
                        };
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_attempt(
    execution_id: ExecutionId,
    workflow_id: WorkflowId,
    node: &NodeDefinition,
    input: &Value,
    ctx: &ResolveContext,
    resources: &std::collections::HashMap<String, Value>,
    env: &std::collections::HashMap<String, String>,
    cancellation: &CancellationToken,
    node_timeout: Duration,
    max_output_size: u64,
    resolved_config: &mut Option<serde_json::Map<String, Value>>,
    executor: &dyn Executor,
) -> Result<Value, ExecutorError> {
    if cancellation.is_cancelled() {
        return Err(ExecutorError::cancelled());
    }

    let config = resolve_config(&node.config, ctx).map_err(|error| {
        ExecutorError::new(ErrorClass::TemplateUnresolved, error.to_string())
    })?;
    *resolved_config = Some(config.clone());

    let attempt_token = cancellation.child_token();
    let mut node_ctx = NodeContext::new(execution_id, workflow_id, node.id.clone(), &node.name)
        .with_cancellation(attempt_token.clone())
        .with_resources(resources.clone())
        .with_env(env.clone())
        .with_templates(ctx.clone());
    if let Ok(delta) = chrono::Duration::from_std(node_timeout) {
        node_ctx = node_ctx.with_deadline(Utc::now() + delta);
    }

    let output = tokio::select! {
        result = executor.execute(&node_ctx, &config, input) => result?,
        () = cancellation.cancelled() => {
            return Err(ExecutorError::cancelled());
        }
        () = tokio::time::sleep(node_timeout) => {
            attempt_token.cancel();
            return Err(ExecutorError::timeout(format!(
                "node '{}' exceeded its {}ms deadline",
                node.name,
                node_timeout.as_millis()
            )));
        }
    };

    if max_output_size > 0 {
        let bytes = serde_json::to_vec(&output).map(|v| v.len() as u64).unwrap_or(0);
        if bytes > max_output_size {
            return Err(ExecutorError::new(
                ErrorClass::ResourceExceeded,
                format!("output of {bytes} bytes exceeds limit of {max_output_size}"),
            ));
        }
    }

    Ok(output)
}
