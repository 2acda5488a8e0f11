//! Engine-wide defaults and limits.

use std::time::Duration;

/// Maximum length of a [`NodeKey`](crate::NodeKey) or
/// [`EdgeKey`](crate::EdgeKey) in characters.
pub const MAX_KEY_LEN: usize = 100;

/// Maximum length of a node display name in characters.
pub const MAX_NODE_NAME_LEN: usize = 255;

/// Default upper bound on concurrently running nodes per execution.
pub const DEFAULT_MAX_PARALLELISM: usize = 10;

/// Default overall execution deadline.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default per-node deadline.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default capacity of the per-execution observer event queue.
pub const DEFAULT_OBSERVER_BUFFER_SIZE: usize = 256;

/// Maximum nesting depth for `sub_workflow` executions.
pub const MAX_SUB_WORKFLOW_DEPTH: usize = 8;

/// Default webhook rate limit: requests per window.
pub const DEFAULT_WEBHOOK_RATE_LIMIT: u64 = 100;

/// Default webhook rate limit window.
pub const DEFAULT_WEBHOOK_RATE_WINDOW: Duration = Duration::from_secs(60);
