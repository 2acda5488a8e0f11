//! The executor capability trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::NodeContext;
use crate::error::ExecutorError;

/// A node implementation.
///
/// Object-safe; the registry stores executors as `Arc<dyn Executor>`
/// shared across concurrent executions.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Statically check a node configuration at workflow import/update
    /// time. The config is the raw (unresolved) mapping; template strings
    /// are permitted anywhere, so implementations should only reject
    /// structure they can judge without a run context.
    fn validate(&self, config: &serde_json::Map<String, Value>) -> Result<(), ExecutorError> {
        let _ = config;
        Ok(())
    }

    /// Execute the node against its resolved configuration and input,
    /// producing an output value.
    ///
    /// Implementations must honor `ctx.cancellation` across long waits
    /// and must not mutate shared engine state.
    async fn execute(
        &self,
        ctx: &NodeContext,
        config: &serde_json::Map<String, Value>,
        input: &Value,
    ) -> Result<Value, ExecutorError>;
}
