//! Execution state errors.

use cascade_core::NodeKey;
use thiserror::Error;

/// Errors produced by execution state handling.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A state transition is not valid for the current status.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// A referenced node does not exist in the execution state.
    #[error("node not found: {0}")]
    NodeNotFound(NodeKey),

    /// A checkpoint does not match the live workflow.
    #[error("incompatible checkpoint: {0}")]
    CheckpointIncompatible(String),

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
