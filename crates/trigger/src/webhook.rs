//! Webhook ingress: signature, allow-list, rate limit, dispatch.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use cascade_core::{ExecutionId, TriggerId};
use cascade_storage::CacheBackend;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use ipnet::IpNet;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::error::TriggerError;
use crate::launcher::WorkflowLauncher;
use crate::repo::TriggerRepository;
use crate::state::TriggerState;
use crate::telegram::normalize_update;
use crate::trigger::WebhookConfig;

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Header carrying the verbatim Telegram secret token.
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

type HmacSha256 = Hmac<Sha256>;

/// A transport-independent view of an inbound webhook request.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// The raw request body; signatures are computed over these exact
    /// bytes.
    pub body: Vec<u8>,
    /// Request headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// The peer address the request arrived from.
    pub source_ip: IpAddr,
    /// When the request was received.
    pub received_at: DateTime<Utc>,
}

impl WebhookRequest {
    /// Build a request; header names are lowercased for lookup.
    #[must_use]
    pub fn new(
        body: Vec<u8>,
        headers: impl IntoIterator<Item = (String, String)>,
        source_ip: IpAddr,
    ) -> Self {
        Self {
            body,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
            source_ip,
            received_at: Utc::now(),
        }
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Validates and dispatches inbound webhooks.
///
/// Checks run in order: trigger lookup, enabled flag, signature, IP
/// allow-list, rate limit. A request that fails any check is rejected
/// without creating an execution record.
pub struct WebhookDispatcher {
    triggers: Arc<dyn TriggerRepository>,
    launcher: Arc<dyn WorkflowLauncher>,
    cache: Arc<dyn CacheBackend>,
}

impl WebhookDispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        triggers: Arc<dyn TriggerRepository>,
        launcher: Arc<dyn WorkflowLauncher>,
        cache: Arc<dyn CacheBackend>,
    ) -> Self {
        Self {
            triggers,
            launcher,
            cache,
        }
    }

    /// Handle one inbound request against one trigger. Returns the id of
    /// the started execution.
    pub async fn handle(
        &self,
        trigger_id: TriggerId,
        request: WebhookRequest,
    ) -> Result<ExecutionId, TriggerError> {
        let trigger = self
            .triggers
            .find_by_id(trigger_id)
            .await
            .map_err(|_| TriggerError::NotFound)?;
        if !trigger.enabled {
            return Err(TriggerError::Disabled);
        }
        let config = trigger
            .webhook_config()
            .ok_or_else(|| TriggerError::BadConfig("not a webhook trigger".into()))?;

        if let Some(secret) = &config.secret {
            if config.telegram {
                verify_telegram_secret(secret, &request)?;
            } else {
                verify_signature(secret, &request)?;
            }
        }
        if !ip_allowed(&config.allowed_ips, request.source_ip) {
            return Err(TriggerError::IpBlocked);
        }
        self.check_rate_limit(trigger_id, config).await?;

        let payload = parse_payload(config, &request)?;
        let mut input = trigger.default_input.clone();
        for (key, value) in payload {
            input.insert(key, value);
        }
        input.insert(
            "_webhook".into(),
            serde_json::json!({
                "trigger_id": trigger_id,
                "headers": request.headers,
                "source_ip": request.source_ip.to_string(),
                "timestamp": request.received_at,
            }),
        );

        let execution_id = self.launcher.launch(trigger.workflow_id, input).await?;
        info!(
            trigger_id = %trigger_id,
            execution_id = %execution_id,
            "webhook trigger fired"
        );

        let now = Utc::now();
        if let Err(err) = self.triggers.mark_triggered(trigger_id, now).await {
            warn!(trigger_id = %trigger_id, %err, "failed to stamp trigger");
        }
        let key = TriggerState::cache_key(trigger_id);
        let mut state: TriggerState = match self.cache.get(&key).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
            _ => TriggerState::default(),
        };
        state.record_fire(now, None);
        if let Ok(value) = serde_json::to_value(&state) {
            let _ = self.cache.set(&key, value, None).await;
        }

        Ok(execution_id)
    }

    /// Fixed-window rate limiting over the cache. Fails open when the
    /// cache is unavailable.
    async fn check_rate_limit(
        &self,
        trigger_id: TriggerId,
        config: &WebhookConfig,
    ) -> Result<(), TriggerError> {
        let key = format!("trigger:rate:{trigger_id}");
        match self.cache.increment(&key).await {
            Ok(count) => {
                if count == 1 {
                    let _ = self.cache.expire(&key, config.rate_window()).await;
                }
                if count.unsigned_abs() > config.effective_rate_limit() {
                    return Err(TriggerError::RateLimited);
                }
                Ok(())
            }
            Err(err) => {
                warn!(trigger_id = %trigger_id, %err, "rate limiter cache unavailable, failing open");
                Ok(())
            }
        }
    }
}

/// Verify the hex HMAC-SHA256 signature over the raw body.
fn verify_signature(secret: &SecretString, request: &WebhookRequest) -> Result<(), TriggerError> {
    let header = request
        .header(SIGNATURE_HEADER)
        .ok_or(TriggerError::SignatureInvalid)?;
    let claimed = hex::decode(header).map_err(|_| TriggerError::SignatureInvalid)?;

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| TriggerError::SignatureInvalid)?;
    mac.update(&request.body);
    let computed = mac.finalize().into_bytes();

    if bool::from(computed.ct_eq(claimed.as_slice())) {
        Ok(())
    } else {
        Err(TriggerError::SignatureInvalid)
    }
}

/// Verify the verbatim Telegram secret token.
fn verify_telegram_secret(
    secret: &SecretString,
    request: &WebhookRequest,
) -> Result<(), TriggerError> {
    let header = request
        .header(TELEGRAM_SECRET_HEADER)
        .ok_or(TriggerError::SignatureInvalid)?;
    if bool::from(
        header
            .as_bytes()
            .ct_eq(secret.expose_secret().as_bytes()),
    ) {
        Ok(())
    } else {
        Err(TriggerError::SignatureInvalid)
    }
}

/// Exact IPs and CIDR blocks. An empty list allows every source.
fn ip_allowed(allow_list: &[String], source: IpAddr) -> bool {
    if allow_list.is_empty() {
        return true;
    }
    allow_list.iter().any(|entry| {
        if let Ok(exact) = entry.parse::<IpAddr>() {
            return exact == source;
        }
        if let Ok(network) = entry.parse::<IpNet>() {
            return network.contains(&source);
        }
        warn!(%entry, "unparseable allow-list entry ignored");
        false
    })
}

/// Parse the request body into the run input mapping.
fn parse_payload(
    config: &WebhookConfig,
    request: &WebhookRequest,
) -> Result<serde_json::Map<String, Value>, TriggerError> {
    if request.body.is_empty() {
        return Ok(serde_json::Map::new());
    }
    let value: Value = serde_json::from_slice(&request.body)
        .map_err(|err| TriggerError::BadPayload(err.to_string()))?;

    if config.telegram {
        return Ok(normalize_update(&value));
    }
    match value {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".into(), other);
            Ok(map)
        }
    }
}
