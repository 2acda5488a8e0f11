//! Cron and interval scheduling.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cascade_storage::CacheBackend;
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::launcher::WorkflowLauncher;
use crate::repo::TriggerRepository;
use crate::state::TriggerState;
use crate::trigger::{TriggerConfig, TriggerDefinition};

/// Fires cron and interval triggers.
///
/// The scheduler polls registrations and fires any trigger whose next
/// due time has passed. Misfires are not back-filled: however long a
/// poll was delayed, a due trigger fires once and its next due time is
/// computed from now.
pub struct TriggerScheduler {
    triggers: Arc<dyn TriggerRepository>,
    launcher: Arc<dyn WorkflowLauncher>,
    cache: Arc<dyn CacheBackend>,
}

impl TriggerScheduler {
    /// Create a scheduler.
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

    /// Spawn the polling loop. Cancel the returned token to stop it.
    #[must_use]
    pub fn spawn(
        self: Arc<Self>,
        poll_interval: Duration,
    ) -> (CancellationToken, JoinHandle<()>) {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            info!(poll_ms = poll_interval.as_millis() as u64, "trigger scheduler started");
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    () = tokio::time::sleep(poll_interval) => {
                        self.poll_once(Utc::now()).await;
                    }
                }
            }
            info!("trigger scheduler stopped");
        });
        (token, handle)
    }

    /// One polling pass at `now`. Returns how many triggers fired.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> usize {
        let triggers = match self.triggers.find_enabled().await {
            Ok(triggers) => triggers,
            Err(err) => {
                warn!(%err, "failed to list enabled triggers");
                return 0;
            }
        };

        let mut fired = 0;
        for trigger in triggers {
            if self.poll_trigger(&trigger, now).await {
                fired += 1;
            }
        }
        fired
    }

    async fn poll_trigger(&self, trigger: &TriggerDefinition, now: DateTime<Utc>) -> bool {
        let Some(next_after) = next_execution(&trigger.config, now) else {
            return false;
        };

        let key = TriggerState::cache_key(trigger.id);
        let mut state = self.load_state(&key).await;

        let Some(due) = state.next_execution else {
            // First sighting: prime the schedule, fire on a later poll.
            state.next_execution = Some(next_after);
            self.store_state(&key, &state).await;
            return false;
        };
        if now < due {
            return false;
        }

        debug!(trigger_id = %trigger.id, workflow_id = %trigger.workflow_id, "schedule due");
        match self
            .launcher
            .launch(trigger.workflow_id, trigger.default_input.clone())
            .await
        {
            Ok(execution_id) => {
                info!(
                    trigger_id = %trigger.id,
                    execution_id = %execution_id,
                    "scheduled trigger fired"
                );
                // Due times that passed while we were not looking are
                // skipped, not back-filled.
                state.record_fire(now, Some(next_after));
                self.store_state(&key, &state).await;
                if let Err(err) = self.triggers.mark_triggered(trigger.id, now).await {
                    warn!(trigger_id = %trigger.id, %err, "failed to stamp trigger");
                }
                true
            }
            Err(err) => {
                warn!(trigger_id = %trigger.id, %err, "scheduled trigger failed to launch");
                false
            }
        }
    }

    async fn load_state(&self, key: &str) -> TriggerState {
        match self.cache.get(key).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
            Ok(None) => TriggerState::default(),
            Err(err) => {
                warn!(%err, "trigger state unreadable, starting fresh");
                TriggerState::default()
            }
        }
    }

    async fn store_state(&self, key: &str, state: &TriggerState) {
        match serde_json::to_value(state) {
            Ok(value) => {
                if let Err(err) = self.cache.set(key, value, None).await {
                    warn!(%err, "trigger state not persisted");
                }
            }
            Err(err) => warn!(%err, "trigger state not serializable"),
        }
    }
}

/// The next due time strictly after `now` for a schedule config.
fn next_execution(config: &TriggerConfig, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match config {
        TriggerConfig::Cron { expression } => {
            let schedule = Schedule::from_str(expression).ok()?;
            schedule.after(&now).next()
        }
        TriggerConfig::Interval { every_ms } => {
            let period = chrono::Duration::milliseconds(*every_ms as i64);
            Some(now + period)
        }
        _ => None,
    }
}
