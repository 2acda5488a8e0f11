//! Cache backend contract: key-value with TTLs, atomic counters, and
//! pub/sub channels.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::StorageError;

/// The cache verbs the engine and triggers rely on.
///
/// Counters follow atomic increment + expire-on-first-hit semantics: the
/// rate limiter increments, and only the caller that observes `1` sets
/// the window TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a value, optionally with a time-to-live.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>)
        -> Result<(), StorageError>;

    /// Remove a key.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Atomically increment an integer key, creating it at zero first.
    /// Returns the new value.
    async fn increment(&self, key: &str) -> Result<i64, StorageError>;

    /// Set a key's time-to-live. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError>;

    /// Publish a message on a channel.
    async fn publish(&self, channel: &str, message: Value) -> Result<(), StorageError>;

    /// Subscribe to a channel. Messages published after subscription are
    /// delivered in publish order; slow subscribers may observe lag.
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<Value>, StorageError>;
}
