//! # Cascade Execution
//!
//! Execution-time state for the Cascade workflow engine.
//!
//! This crate models state, not orchestration. It defines:
//!
//! - [`ExecutionStatus`] and the node-level state machine, with
//!   transitions validated by the [`transition`] module
//! - [`ExecutionState`] and [`NodeExecutionState`] — the persistent
//!   record of a run
//! - [`NodeAttempt`] — per-attempt history
//! - [`RetryPolicy`] — bounded attempt loops with constant, linear, or
//!   exponential backoff and an error-class filter
//! - [`Checkpoint`] and [`CheckpointStore`] — the snapshot/resume
//!   protocol between waves
//! - [`ExecutionEvent`] — the append-only lifecycle event vocabulary,
//!   strictly ordered within one execution

pub mod attempt;
pub mod checkpoint;
pub mod error;
pub mod event;
pub mod retry;
pub mod state;
pub mod status;
pub mod transition;

pub use attempt::NodeAttempt;
pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use error::ExecutionError;
pub use event::{EventKind, ExecutionEvent};
pub use retry::{Backoff, RetryPolicy};
pub use state::{ExecutionState, NodeExecutionState};
pub use status::ExecutionStatus;

/// Serde helper for `Duration` serialized as integer milliseconds.
pub(crate) mod serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
