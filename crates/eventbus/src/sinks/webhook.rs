//! Per-run webhook sink with event and node filters.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use cascade_core::NodeKey;
use cascade_execution::{EventKind, ExecutionEvent};
use serde::{Deserialize, Serialize};

use crate::sink::{EventSink, SinkError};
use crate::sinks::http::{HttpCallbackSink, HttpRetry};

/// A webhook supplied in run options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWebhook {
    /// Callback URL.
    pub url: String,
    /// Deliver only these event kinds. `None` delivers all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<HashSet<EventKind>>,
    /// Deliver only events about these nodes. `None` delivers all.
    /// Events without a node (execution/wave) always pass this filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<HashSet<NodeKey>>,
}

impl RunWebhook {
    /// A webhook with no filters.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            events: None,
            nodes: None,
        }
    }

    /// Restrict to specific event kinds.
    #[must_use]
    pub fn with_events(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.events = Some(kinds.into_iter().collect());
        self
    }

    /// Restrict to specific nodes.
    #[must_use]
    pub fn with_nodes(mut self, nodes: impl IntoIterator<Item = NodeKey>) -> Self {
        self.nodes = Some(nodes.into_iter().collect());
        self
    }

    fn accepts(&self, event: &ExecutionEvent) -> bool {
        if let Some(kinds) = &self.events {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(nodes) = &self.nodes {
            if let Some(node_id) = &event.node_id {
                if !nodes.contains(node_id) {
                    return false;
                }
            }
        }
        true
    }
}

/// Delivers a run's filtered events to its configured webhook.
pub struct RunWebhookSink {
    filter: RunWebhook,
    inner: HttpCallbackSink,
}

impl RunWebhookSink {
    /// Build the sink for a run webhook.
    #[must_use]
    pub fn new(webhook: RunWebhook) -> Self {
        let inner = HttpCallbackSink::new(webhook.url.clone());
        Self {
            filter: webhook,
            inner,
        }
    }

    /// Override the delivery timeout and retry policy.
    #[must_use]
    pub fn with_delivery(mut self, timeout: Duration, retry: HttpRetry) -> Self {
        self.inner = HttpCallbackSink::new(self.filter.url.clone())
            .with_timeout(timeout)
            .with_retry(retry);
        self
    }
}

#[async_trait]
impl EventSink for RunWebhookSink {
    fn name(&self) -> &str {
        "run_webhook"
    }

    async fn notify(&self, event: &ExecutionEvent) -> Result<(), SinkError> {
        if !self.filter.accepts(event) {
            return Ok(());
        }
        self.inner.notify(event).await
    }
}
