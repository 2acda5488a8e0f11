//! Storage errors.

use thiserror::Error;

/// Errors surfaced by repository and cache backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The write conflicted with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend failed.
    #[error("backend: {0}")]
    Backend(String),

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_variants() {
        assert_eq!(
            StorageError::NotFound("workflow x".into()).to_string(),
            "not found: workflow x"
        );
        assert_eq!(
            StorageError::Conflict("duplicate id".into()).to_string(),
            "conflict: duplicate id"
        );
        assert!(StorageError::Backend("io".into()).to_string().starts_with("backend"));
    }
}
