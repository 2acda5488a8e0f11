//! Expression errors.

use thiserror::Error;

/// Errors produced while parsing or evaluating templates and conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// A `{{` had no matching `}}`.
    #[error("unclosed '{{{{' in template")]
    UnclosedDelimiter,

    /// The expression could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A referenced path did not resolve and no default was declared.
    #[error("unresolved reference '{0}'")]
    Unresolved(String),
}

/// Result alias for expression operations.
pub type ExpressionResult<T> = Result<T, ExpressionError>;
