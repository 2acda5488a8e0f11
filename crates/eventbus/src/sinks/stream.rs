//! Live-stream sink: broadcast to subscribed clients.

use async_trait::async_trait;
use cascade_execution::ExecutionEvent;
use tokio::sync::broadcast;

use crate::sink::{EventSink, SinkError};

/// Pushes events to live subscribers through a broadcast channel.
///
/// Slow subscribers lag and eventually observe
/// [`broadcast::error::RecvError::Lagged`] — they are cut off rather than
/// ever blocking the producer.
pub struct LiveStreamSink {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl LiveStreamSink {
    /// Create a sink with the given per-subscriber buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe a live client.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    /// Number of currently connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LiveStreamSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for LiveStreamSink {
    fn name(&self) -> &str {
        "live_stream"
    }

    async fn notify(&self, event: &ExecutionEvent) -> Result<(), SinkError> {
        // Returns Err only when no subscriber exists, which is fine.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
