//! Engine errors.

use cascade_core::{ErrorClass, ExecutionId, WorkflowId};
use cascade_execution::ExecutionError;
use cascade_executor::RegistryError;
use cascade_storage::StorageError;
use cascade_workflow::WorkflowError;
use thiserror::Error;

/// Errors surfaced by the execution manager.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The workflow failed structural validation.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Execution state handling failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A node type could not be resolved at dispatch.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An execution id is already running.
    #[error("execution {0} is already active")]
    AlreadyActive(ExecutionId),

    /// A resource alias did not resolve at run start.
    #[error("unresolved resource alias '{0}'")]
    UnresolvedAlias(String),

    /// The scheduler could not make progress.
    #[error("deadlock: no dispatchable nodes but the frontier is non-empty")]
    Deadlock,

    /// Nested sub-workflows exceeded the depth bound.
    #[error("sub-workflow nesting exceeds depth {0}")]
    SubWorkflowDepthExceeded(usize),

    /// A sub-workflow node referenced an invalid workflow id.
    #[error("node '{node}' has invalid sub-workflow reference: {message}")]
    InvalidSubWorkflow {
        /// The offending node.
        node: String,
        /// What is wrong with the reference.
        message: String,
    },

    /// A node configuration was rejected by its executor or contains a
    /// malformed template.
    #[error("node '{node}' configuration rejected: {message}")]
    NodeConfig {
        /// The offending node.
        node: String,
        /// The executor's or template parser's complaint.
        message: String,
    },

    /// An edge condition does not parse.
    #[error("edge '{edge}' condition rejected: {message}")]
    InvalidCondition {
        /// The offending edge.
        edge: String,
        /// The parser's complaint.
        message: String,
    },

    /// The referenced workflow does not exist.
    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),
}

impl EngineError {
    /// The error class this engine error surfaces as.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Workflow(_)
            | Self::InvalidSubWorkflow { .. }
            | Self::NodeConfig { .. }
            | Self::InvalidCondition { .. } => ErrorClass::Validation,
            Self::Execution(ExecutionError::CheckpointIncompatible(_)) => {
                ErrorClass::CheckpointIncompatible
            }
            Self::Execution(_) | Self::Registry(_) | Self::SubWorkflowDepthExceeded(_) => {
                ErrorClass::ExecutorError
            }
            Self::Storage(StorageError::NotFound(_)) | Self::WorkflowNotFound(_) => {
                ErrorClass::NotFound
            }
            Self::Storage(_) | Self::AlreadyActive(_) => ErrorClass::ExecutorError,
            Self::UnresolvedAlias(_) => ErrorClass::TemplateUnresolved,
            Self::Deadlock => ErrorClass::Deadlock,
        }
    }
}
