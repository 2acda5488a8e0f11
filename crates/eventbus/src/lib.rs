//! # Cascade Eventbus
//!
//! Observer fan-out for execution lifecycle events.
//!
//! From the engine's viewpoint, emitting an event is a non-blocking append
//! to a bounded per-execution queue. A dispatcher task drains the queue
//! and delivers each event to every registered [`EventSink`] in emission
//! order. When a queue overflows, the oldest droppable event is discarded
//! and a counter incremented; execution-boundary events are never dropped
//! — the emitting path blocks for them instead.
//!
//! Sink variants: structured log, persistent store, retrying HTTP
//! callback, live-stream broadcast, and per-run filtered webhooks.

pub mod pipeline;
pub mod sink;
pub mod sinks;

pub use pipeline::{EventEmitter, EventPipeline};
pub use sink::{EventSink, SinkError};
pub use sinks::http::{HttpCallbackSink, HttpRetry};
pub use sinks::log::LogSink;
pub use sinks::persistent::PersistentSink;
pub use sinks::stream::LiveStreamSink;
pub use sinks::webhook::{RunWebhook, RunWebhookSink};
