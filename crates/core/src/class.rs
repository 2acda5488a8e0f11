//! Failure classification shared across the engine.

use serde::{Deserialize, Serialize};

/// The closed set of failure categories visible in events, node errors,
/// retry filters, and trigger responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// A workflow or node configuration failed static validation.
    Validation,
    /// A template referenced a value that could not be resolved.
    TemplateUnresolved,
    /// An executor returned an error.
    ExecutorError,
    /// A run- or node-level deadline expired.
    Timeout,
    /// The run was cancelled.
    Cancelled,
    /// A node exceeded an output or memory bound.
    ResourceExceeded,
    /// All retry attempts were exhausted.
    RetryExhausted,
    /// The scheduler could not make progress.
    Deadlock,
    /// A checkpoint did not match the live workflow.
    CheckpointIncompatible,
    /// A webhook signature did not verify.
    WebhookSignatureInvalid,
    /// A webhook source IP was not in the allow-list.
    WebhookIpBlocked,
    /// A trigger exceeded its rate limit.
    RateLimited,
    /// A referenced entity does not exist.
    NotFound,
    /// The caller lacks access to a resource.
    PermissionDenied,
}

impl ErrorClass {
    /// The canonical snake_case name, as it appears in events and filters.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::TemplateUnresolved => "template_unresolved",
            Self::ExecutorError => "executor_error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ResourceExceeded => "resource_exceeded",
            Self::RetryExhausted => "retry_exhausted",
            Self::Deadlock => "deadlock",
            Self::CheckpointIncompatible => "checkpoint_incompatible",
            Self::WebhookSignatureInvalid => "webhook_signature_invalid",
            Self::WebhookIpBlocked => "webhook_ip_blocked",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_name() {
        let classes = [
            ErrorClass::Validation,
            ErrorClass::TemplateUnresolved,
            ErrorClass::ExecutorError,
            ErrorClass::Timeout,
            ErrorClass::Cancelled,
            ErrorClass::ResourceExceeded,
            ErrorClass::RetryExhausted,
            ErrorClass::Deadlock,
            ErrorClass::CheckpointIncompatible,
            ErrorClass::WebhookSignatureInvalid,
            ErrorClass::WebhookIpBlocked,
            ErrorClass::RateLimited,
            ErrorClass::NotFound,
            ErrorClass::PermissionDenied,
        ];
        for class in classes {
            let json = serde_json::to_string(&class).unwrap();
            assert_eq!(json, format!("\"{class}\""));
        }
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&ErrorClass::RetryExhausted).unwrap();
        assert_eq!(json, "\"retry_exhausted\"");
        let back: ErrorClass = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorClass::RetryExhausted);
    }
}
