//! Persistent sink: appends events to the execution store.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_execution::ExecutionEvent;
use cascade_storage::ExecutionRepository;

use crate::sink::{EventSink, SinkError};

/// Writes every event to the event store.
///
/// Delivery awaits the write, so backpressure from the store slows the
/// dispatcher rather than losing events.
pub struct PersistentSink {
    repo: Arc<dyn ExecutionRepository>,
}

impl PersistentSink {
    /// Create a sink writing through the given repository.
    #[must_use]
    pub fn new(repo: Arc<dyn ExecutionRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl EventSink for PersistentSink {
    fn name(&self) -> &str {
        "persistent"
    }

    async fn notify(&self, event: &ExecutionEvent) -> Result<(), SinkError> {
        self.repo
            .append_event(event.clone())
            .await
            .map_err(|error| SinkError::new("persistent", error.to_string()))
    }
}
