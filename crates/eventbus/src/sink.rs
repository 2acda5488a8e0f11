//! The sink capability.

use async_trait::async_trait;
use cascade_execution::ExecutionEvent;
use thiserror::Error;

/// A sink delivery failure.
///
/// Dispatch logs failures and moves on; a failing sink never stalls the
/// pipeline or affects other sinks.
#[derive(Debug, Clone, Error)]
#[error("sink '{sink}': {message}")]
pub struct SinkError {
    /// The sink that failed.
    pub sink: String,
    /// What went wrong.
    pub message: String,
}

impl SinkError {
    /// Create a sink error.
    #[must_use]
    pub fn new(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

/// A registered consumer of lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Deliver one event. Events of one execution arrive in emission
    /// order; the call may suspend (HTTP posts, store writes).
    async fn notify(&self, event: &ExecutionEvent) -> Result<(), SinkError>;
}
