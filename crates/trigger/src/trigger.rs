//! Trigger definitions.

use cascade_core::constants::{DEFAULT_WEBHOOK_RATE_LIMIT, DEFAULT_WEBHOOK_RATE_WINDOW};
use cascade_core::{TriggerId, WorkflowId};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The trigger variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Started explicitly by a caller.
    Manual,
    /// Fired on a cron schedule.
    Cron,
    /// Fired every fixed period (a cron special case).
    Interval,
    /// Fired by matching messages on the event bus.
    Event,
    /// Fired by inbound HTTP requests.
    Webhook,
}

/// Webhook-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    /// Shared secret for signature verification. Absent means unsigned
    /// webhooks are accepted. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub secret: Option<SecretString>,
    /// Exact IPs or CIDR blocks allowed to call this webhook. Empty
    /// means any source.
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    /// Requests allowed per window. `None` uses the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u64>,
    /// Telegram variant: verify `X-Telegram-Bot-Api-Secret-Token`
    /// verbatim and normalize the update payload.
    #[serde(default)]
    pub telegram: bool,
}

impl WebhookConfig {
    /// The effective rate limit for this webhook.
    #[must_use]
    pub fn effective_rate_limit(&self) -> u64 {
        self.rate_limit.unwrap_or(DEFAULT_WEBHOOK_RATE_LIMIT)
    }

    /// The fixed rate-limit window.
    #[must_use]
    pub fn rate_window(&self) -> Duration {
        DEFAULT_WEBHOOK_RATE_WINDOW
    }
}

/// Variant-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// No configuration.
    Manual,
    /// A cron expression (seconds-resolution, six or seven fields).
    Cron {
        /// The schedule expression.
        expression: String,
    },
    /// A fixed period.
    Interval {
        /// Milliseconds between firings.
        every_ms: u64,
    },
    /// An event-bus subscription.
    Event {
        /// Event type; subscribes to channel `events:<event_type>`.
        event_type: String,
        /// Required message source, when set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        /// Per-field equality filters over the message payload.
        #[serde(default)]
        filters: serde_json::Map<String, serde_json::Value>,
    },
    /// Webhook ingress.
    Webhook(WebhookConfig),
}

/// A registered trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDefinition {
    /// Unique identifier.
    pub id: TriggerId,
    /// The workflow this trigger starts.
    pub workflow_id: WorkflowId,
    /// The trigger variant.
    pub trigger_type: TriggerType,
    /// Disabled triggers never fire.
    pub enabled: bool,
    /// Variant-specific configuration.
    pub config: TriggerConfig,
    /// Input defaults merged under the fired payload.
    #[serde(default)]
    pub default_input: serde_json::Map<String, serde_json::Value>,
    /// When this trigger last started a run.
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
}

impl TriggerDefinition {
    /// Create an enabled trigger.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, trigger_type: TriggerType, config: TriggerConfig) -> Self {
        Self {
            id: TriggerId::v4(),
            workflow_id,
            trigger_type,
            enabled: true,
            config,
            default_input: serde_json::Map::new(),
            last_triggered: None,
        }
    }

    /// The webhook configuration, if this is a webhook trigger.
    #[must_use]
    pub fn webhook_config(&self) -> Option<&WebhookConfig> {
        match &self.config {
            TriggerConfig::Webhook(config) => Some(config),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trigger_is_enabled() {
        let trigger = TriggerDefinition::new(
            WorkflowId::v4(),
            TriggerType::Manual,
            TriggerConfig::Manual,
        );
        assert!(trigger.enabled);
        assert!(trigger.last_triggered.is_none());
    }

    #[test]
    fn webhook_config_accessor() {
        let trigger = TriggerDefinition::new(
            WorkflowId::v4(),
            TriggerType::Webhook,
            TriggerConfig::Webhook(WebhookConfig::default()),
        );
        assert!(trigger.webhook_config().is_some());

        let manual = TriggerDefinition::new(
            WorkflowId::v4(),
            TriggerType::Manual,
            TriggerConfig::Manual,
        );
        assert!(manual.webhook_config().is_none());
    }

    #[test]
    fn default_rate_limit() {
        let config = WebhookConfig::default();
        assert_eq!(config.effective_rate_limit(), 100);
        assert_eq!(config.rate_window(), Duration::from_secs(60));

        let custom = WebhookConfig {
            rate_limit: Some(5),
            ..WebhookConfig::default()
        };
        assert_eq!(custom.effective_rate_limit(), 5);
    }

    #[test]
    fn config_serde_tagging() {
        let config = TriggerConfig::Cron {
            expression: "0 0 * * * *".into(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["kind"], "cron");
        assert_eq!(json["expression"], "0 0 * * * *");
    }
}
