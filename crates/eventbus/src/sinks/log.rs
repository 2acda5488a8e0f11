//! Structured log sink.

use async_trait::async_trait;
use cascade_execution::ExecutionEvent;
use tracing::info;

use crate::sink::{EventSink, SinkError};

/// Emits every event as one structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LogSink {
    /// Create a log sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &ExecutionEvent) -> Result<(), SinkError> {
        info!(
            execution_id = %event.execution_id,
            kind = %event.kind,
            wave_index = event.wave_index,
            node_id = event.node_id.as_ref().map(cascade_core::NodeKey::as_str),
            duration_ms = event.duration_ms,
            error = event.error.as_deref(),
            attempt = event.attempt,
            "execution event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::ExecutionId;

    #[tokio::test]
    async fn notify_never_fails() {
        let sink = LogSink::new();
        let event = ExecutionEvent::execution_started(ExecutionId::v4());
        assert!(sink.notify(&event).await.is_ok());
    }
}
