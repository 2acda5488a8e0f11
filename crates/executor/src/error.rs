//! Executor failure type.

use cascade_core::ErrorClass;
use thiserror::Error;

/// A classified executor failure.
///
/// The class drives retry filtering: a [`RetryPolicy`] may restrict
/// retries to a subset of classes.
///
/// [`RetryPolicy`]: https://docs.rs/cascade-execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class}: {message}")]
pub struct ExecutorError {
    /// Failure category.
    pub class: ErrorClass,
    /// Human-readable detail.
    pub message: String,
}

impl ExecutorError {
    /// Create an error with an explicit class.
    #[must_use]
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// A generic executor failure.
    #[must_use]
    pub fn executor(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::ExecutorError, message)
    }

    /// A configuration validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, message)
    }

    /// A deadline expiry.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Timeout, message)
    }

    /// A cooperative cancellation.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorClass::Cancelled, "execution cancelled")
    }
}
