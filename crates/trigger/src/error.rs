//! Trigger-surface errors and their HTTP mapping.

use cascade_core::ErrorClass;
use http::StatusCode;
use thiserror::Error;

/// Errors raised on the trigger surface. None of these create an
/// execution record.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The trigger does not exist.
    #[error("trigger not found")]
    NotFound,

    /// The trigger exists but is disabled.
    #[error("trigger is disabled")]
    Disabled,

    /// The webhook signature did not verify.
    #[error("invalid webhook signature")]
    SignatureInvalid,

    /// The source IP is not covered by the allow-list.
    #[error("source ip not allowed")]
    IpBlocked,

    /// The fixed-window rate limit was exceeded.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The request body was not usable.
    #[error("bad payload: {0}")]
    BadPayload(String),

    /// The trigger's configuration is unusable.
    #[error("bad trigger configuration: {0}")]
    BadConfig(String),

    /// A storage backend failed.
    #[error(transparent)]
    Storage(#[from] cascade_storage::StorageError),
}

impl TriggerError {
    /// The error class surfaced in logs and responses.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound | Self::Disabled => ErrorClass::NotFound,
            Self::SignatureInvalid => ErrorClass::WebhookSignatureInvalid,
            Self::IpBlocked => ErrorClass::WebhookIpBlocked,
            Self::RateLimited => ErrorClass::RateLimited,
            Self::BadPayload(_) | Self::BadConfig(_) => ErrorClass::Validation,
            Self::Storage(_) => ErrorClass::ExecutorError,
        }
    }

    /// The HTTP status a webhook response carries for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::Disabled => StatusCode::NOT_FOUND,
            Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
            Self::IpBlocked => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::BadPayload(_) | Self::BadConfig(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_mapping() {
        assert_eq!(TriggerError::SignatureInvalid.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(TriggerError::IpBlocked.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(TriggerError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(TriggerError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn class_mapping() {
        assert_eq!(
            TriggerError::SignatureInvalid.class(),
            ErrorClass::WebhookSignatureInvalid
        );
        assert_eq!(TriggerError::IpBlocked.class(), ErrorClass::WebhookIpBlocked);
        assert_eq!(TriggerError::RateLimited.class(), ErrorClass::RateLimited);
    }
}
