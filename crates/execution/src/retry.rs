//! Per-node retry policy with backoff.

use std::collections::HashSet;
use std::time::Duration;

use cascade_core::ErrorClass;
use serde::{Deserialize, Serialize};

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Every delay equals the initial delay.
    Constant,
    /// Delay grows linearly: `initial × k`, capped at the maximum.
    Linear,
    /// Delay doubles: `initial × 2^(k-1)`, capped at the maximum.
    Exponential,
}

/// Bounded retry with backoff and an error-class filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retry).
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "crate::serde_millis")]
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    /// Backoff strategy.
    pub backoff: Backoff,
    /// Error classes eligible for retry. Empty means all classes retry.
    #[serde(default)]
    pub retryable_errors: HashSet<ErrorClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Exponential,
            retryable_errors: HashSet::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy with `max_attempts` exponential attempts.
    #[must_use]
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff: Backoff::Exponential,
            retryable_errors: HashSet::new(),
        }
    }

    /// Restrict retries to the given classes.
    #[must_use]
    pub fn with_retryable(mut self, classes: impl IntoIterator<Item = ErrorClass>) -> Self {
        self.retryable_errors = classes.into_iter().collect();
        self
    }

    /// The backoff delay after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            Backoff::Constant => self.initial_delay,
            Backoff::Linear => self.initial_delay.saturating_mul(attempt),
            Backoff::Exponential => {
                // 2^(k-1), saturating on large exponents.
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.initial_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    /// Whether a failure of `class` on `attempt` (1-based) should retry.
    #[must_use]
    pub fn should_retry(&self, class: ErrorClass, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        self.retryable_errors.is_empty() || self.retryable_errors.contains(&class)
    }
}
