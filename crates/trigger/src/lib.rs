//! # Cascade Trigger
//!
//! Entry points that start runs: manual calls, cron and interval
//! schedules, event-bus subscriptions, and webhook ingress.
//!
//! All four variants converge on [`WorkflowLauncher::launch`], which
//! starts a run in the background and returns its execution id. Webhook
//! ingress verifies an HMAC-SHA256 signature over the raw request body in
//! constant time, enforces an exact-IP/CIDR allow-list and a fixed-window
//! rate limit, merges trigger defaults with the payload, and attaches a
//! `_webhook` metadata envelope. Rejections map to HTTP 401/403/429 and
//! never create an execution record.

pub mod error;
pub mod events;
pub mod launcher;
pub mod repo;
pub mod router;
pub mod scheduler;
pub mod state;
pub mod telegram;
pub mod trigger;
pub mod webhook;

pub use error::TriggerError;
pub use events::EventTriggerListener;
pub use launcher::WorkflowLauncher;
pub use repo::{MemoryTriggerRepository, TriggerRepository};
pub use router::webhook_router;
pub use scheduler::TriggerScheduler;
pub use state::TriggerState;
pub use trigger::{TriggerConfig, TriggerDefinition, TriggerType, WebhookConfig};
pub use webhook::{WebhookDispatcher, WebhookRequest};
