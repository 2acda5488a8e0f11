//! Event-bus triggers.

use std::sync::Arc;

use cascade_core::ExecutionId;
use cascade_storage::CacheBackend;
use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::launcher::WorkflowLauncher;
use crate::repo::TriggerRepository;
use crate::state::TriggerState;
use crate::trigger::{TriggerConfig, TriggerDefinition};

/// Subscribes to `events:<event_type>` channels and fires matching
/// triggers.
///
/// A published message is an object of the form
/// `{"source": "...", "payload": {...}}`. A trigger matches when its
/// configured source equals the message source (if set) and every filter
/// field equals the corresponding payload field. Each match fires one
/// run whose input is the trigger's default input overlaid with the
/// payload (payload wins).
pub struct EventTriggerListener {
    triggers: Arc<dyn TriggerRepository>,
    launcher: Arc<dyn WorkflowLauncher>,
    cache: Arc<dyn CacheBackend>,
}

impl EventTriggerListener {
    /// Create a listener.
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

    /// Subscribe a trigger and fire it for every matching message.
    /// Cancel the returned token to stop the subscription.
    pub async fn spawn(
        self: Arc<Self>,
        trigger: TriggerDefinition,
    ) -> Result<(CancellationToken, JoinHandle<()>), crate::error::TriggerError> {
        let TriggerConfig::Event { event_type, .. } = &trigger.config else {
            return Err(crate::error::TriggerError::BadConfig(
                "not an event trigger".into(),
            ));
        };
        let channel = format!("events:{event_type}");
        let mut receiver = self.cache.subscribe(&channel).await?;

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            info!(trigger_id = %trigger.id, %channel, "event trigger subscribed");
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(message) => {
                            self.handle_message(&trigger, &message).await;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(trigger_id = %trigger.id, missed, "event trigger lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        Ok((token, handle))
    }

    /// Match one message against one trigger; fire on match.
    pub async fn handle_message(
        &self,
        trigger: &TriggerDefinition,
        message: &Value,
    ) -> Option<ExecutionId> {
        if !trigger.enabled || !matches(&trigger.config, message) {
            return None;
        }

        let payload = message
            .get("payload")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut input = trigger.default_input.clone();
        for (key, value) in payload {
            input.insert(key, value);
        }

        match self.launcher.launch(trigger.workflow_id, input).await {
            Ok(execution_id) => {
                debug!(
                    trigger_id = %trigger.id,
                    execution_id = %execution_id,
                    "event trigger fired"
                );
                let now = Utc::now();
                if let Err(err) = self.triggers.mark_triggered(trigger.id, now).await {
                    warn!(trigger_id = %trigger.id, %err, "failed to stamp trigger");
                }
                let key = TriggerState::cache_key(trigger.id);
                let mut state: TriggerState = match self.cache.get(&key).await {
                    Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
                    _ => TriggerState::default(),
                };
                state.record_fire(now, None);
                if let Ok(value) = serde_json::to_value(&state) {
                    let _ = self.cache.set(&key, value, None).await;
                }
                Some(execution_id)
            }
            Err(err) => {
                warn!(trigger_id = %trigger.id, %err, "event trigger failed to launch");
                None
            }
        }
    }
}

/// Does a message satisfy an event trigger's filter?
fn matches(config: &TriggerConfig, message: &Value) -> bool {
    let TriggerConfig::Event {
        source, filters, ..
    } = config
    else {
        return false;
    };

    if let Some(required) = source {
        if message.get("source").and_then(Value::as_str) != Some(required.as_str()) {
            return false;
        }
    }
    let payload = message.get("payload");
    filters.iter().all(|(key, expected)| {
        payload.and_then(|p| p.get(key)) == Some(expected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::testing::RecordingLauncher;
    use crate::repo::MemoryTriggerRepository;
    use crate::trigger::TriggerType;
    use cascade_core::WorkflowId;
    use cascade_storage::MemoryCache;
    use serde_json::json;

    fn event_trigger(
        source: Option<&str>,
        filters: serde_json::Map<String, Value>,
    ) -> TriggerDefinition {
        TriggerDefinition::new(
            WorkflowId::v4(),
            TriggerType::Event,
            TriggerConfig::Event {
                event_type: "user.created".into(),
                source: source.map(str::to_string),
                filters,
            },
        )
    }

    fn listener() -> (Arc<EventTriggerListener>, Arc<RecordingLauncher>, Arc<MemoryCache>) {
        let repo = Arc::new(MemoryTriggerRepository::new());
        let launcher = Arc::new(RecordingLauncher::default());
        let cache = Arc::new(MemoryCache::new());
        (
            Arc::new(EventTriggerListener::new(repo, launcher.clone(), cache.clone())),
            launcher,
            cache,
        )
    }

    #[test]
    fn source_equality() {
        let trigger = event_trigger(Some("billing"), serde_json::Map::new());
        assert!(matches(
            &trigger.config,
            &json!({"source": "billing", "payload": {}})
        ));
        assert!(!matches(
            &trigger.config,
            &json!({"source": "auth", "payload": {}})
        ));
    }

    #[test]
    fn per_field_filters() {
        let filters: serde_json::Map<String, Value> =
            serde_json::from_value(json!({"plan": "pro", "region": "eu"})).unwrap();
        let trigger = event_trigger(None, filters);

        assert!(matches(
            &trigger.config,
            &json!({"payload": {"plan": "pro", "region": "eu", "extra": 1}})
        ));
        assert!(!matches(
            &trigger.config,
            &json!({"payload": {"plan": "free", "region": "eu"}})
        ));
        assert!(!matches(&trigger.config, &json!({"payload": {}})));
    }

    #[tokio::test]
    async fn matching_message_fires_with_merged_input() {
        let (listener, launcher, _cache) = listener();
        let mut trigger = event_trigger(None, serde_json::Map::new());
        trigger.default_input =
            serde_json::from_value(json!({"channel": "email", "plan": "default"})).unwrap();

        let execution = listener
            .handle_message(&trigger, &json!({"payload": {"plan": "pro"}}))
            .await;
        assert!(execution.is_some());

        let launches = launcher.launches.lock().unwrap();
        assert_eq!(launches.len(), 1);
        // Payload wins over defaults; untouched defaults survive.
        assert_eq!(launches[0].1["plan"], json!("pro"));
        assert_eq!(launches[0].1["channel"], json!("email"));
    }

    #[tokio::test]
    async fn disabled_trigger_never_fires() {
        let (listener, launcher, _cache) = listener();
        let mut trigger = event_trigger(None, serde_json::Map::new());
        trigger.enabled = false;

        assert!(listener
            .handle_message(&trigger, &json!({"payload": {}}))
            .await
            .is_none());
        assert!(launcher.launches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscription_end_to_end() {
        let repo = Arc::new(MemoryTriggerRepository::new());
        let launcher = Arc::new(RecordingLauncher::default());
        let cache = Arc::new(MemoryCache::new());
        let trigger = event_trigger(None, serde_json::Map::new());
        repo.create(trigger.clone()).await.unwrap();

        let listener = Arc::new(EventTriggerListener::new(
            repo,
            launcher.clone(),
            cache.clone(),
        ));
        let (token, handle) = listener.spawn(trigger).await.unwrap();

        cache
            .publish("events:user.created", json!({"payload": {"id": 1}}))
            .await
            .unwrap();
        // Give the subscriber task a moment to drain.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(launcher.launches.lock().unwrap().len(), 1);
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn spawn_rejects_non_event_trigger() {
        let (listener, _launcher, _cache) = listener();
        let manual = TriggerDefinition::new(
            WorkflowId::v4(),
            TriggerType::Manual,
            TriggerConfig::Manual,
        );
        assert!(listener.spawn(manual).await.is_err());
    }
}
