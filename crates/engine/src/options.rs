//! Per-run configuration.

use std::collections::HashMap;
use std::time::Duration;

use cascade_core::constants::{
    DEFAULT_MAX_PARALLELISM, DEFAULT_NODE_TIMEOUT, DEFAULT_OBSERVER_BUFFER_SIZE,
    DEFAULT_RUN_TIMEOUT,
};
use cascade_eventbus::RunWebhook;
use cascade_execution::RetryPolicy;

/// Options governing one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Abort the run on the first node failure, retries included.
    pub strict_mode: bool,
    /// Upper bound on concurrently running nodes.
    pub max_parallelism: usize,
    /// Overall run deadline.
    pub timeout: Duration,
    /// Per-node deadline.
    pub node_timeout: Duration,
    /// Initial variables overlaid on the workflow defaults.
    pub variables: serde_json::Map<String, serde_json::Value>,
    /// Environment-variable proxy exposed to templates as `env.NAME`.
    pub env: HashMap<String, String>,
    /// Default retry policy applied to every node.
    pub retry_policy: RetryPolicy,
    /// Keep scheduling after non-retryable node failures; failed nodes
    /// route as if they produced an empty output.
    pub continue_on_error: bool,
    /// Per-node output size bound in bytes. Zero means unlimited.
    pub max_output_size: u64,
    /// Total output memory bound across the run in bytes. Zero means
    /// unlimited.
    pub max_total_memory: u64,
    /// Per-run webhook sinks.
    pub webhooks: Vec<RunWebhook>,
    /// Capacity of the per-execution observer queue.
    pub observer_buffer_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            timeout: DEFAULT_RUN_TIMEOUT,
            node_timeout: DEFAULT_NODE_TIMEOUT,
            variables: serde_json::Map::new(),
            env: HashMap::new(),
            retry_policy: RetryPolicy::default(),
            continue_on_error: false,
            max_output_size: 0,
            max_total_memory: 0,
            webhooks: Vec::new(),
            observer_buffer_size: DEFAULT_OBSERVER_BUFFER_SIZE,
        }
    }
}

impl RunOptions {
    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Overlay initial variables.
    #[must_use]
    pub fn with_variables(mut self, variables: serde_json::Map<String, serde_json::Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Bound concurrent nodes.
    #[must_use]
    pub fn with_max_parallelism(mut self, limit: usize) -> Self {
        self.max_parallelism = limit.max(1);
        self
    }

    /// Continue scheduling after non-retryable failures.
    #[must_use]
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}
