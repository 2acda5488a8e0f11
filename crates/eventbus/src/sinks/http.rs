//! HTTP callback sink with per-call timeout and bounded retry.

use std::time::Duration;

use async_trait::async_trait;
use cascade_execution::ExecutionEvent;
use reqwest::Method;
use tracing::warn;

use crate::sink::{EventSink, SinkError};

/// Retry policy for callback delivery.
#[derive(Debug, Clone)]
pub struct HttpRetry {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
}

impl Default for HttpRetry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
        }
    }
}

/// Posts every event to a configured URL.
///
/// Failures retry up to the policy's bound with multiplicative backoff;
/// after exhaustion the event is logged and dropped, never retried
/// indefinitely.
pub struct HttpCallbackSink {
    client: reqwest::Client,
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    timeout: Duration,
    retry: HttpRetry,
}

impl HttpCallbackSink {
    /// Create a sink posting JSON to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            method: Method::POST,
            headers: Vec::new(),
            timeout: Duration::from_secs(10),
            retry: HttpRetry::default(),
        }
    }

    /// Override the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a request header to every delivery.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: HttpRetry) -> Self {
        self.retry = retry;
        self
    }

    async fn post_once(&self, event: &ExecutionEvent) -> Result<(), String> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .timeout(self.timeout)
            .json(event);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("callback returned {}", response.status()))
        }
    }
}

#[async_trait]
impl EventSink for HttpCallbackSink {
    fn name(&self) -> &str {
        "http_callback"
    }

    async fn notify(&self, event: &ExecutionEvent) -> Result<(), SinkError> {
        let mut delay = self.retry.initial_delay;
        let attempts = self.retry.max_retries + 1;

        for attempt in 1..=attempts {
            match self.post_once(event).await {
                Ok(()) => return Ok(()),
                Err(error) if attempt < attempts => {
                    warn!(
                        url = %self.url,
                        attempt,
                        %error,
                        "webhook delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(self.retry.backoff_factor);
                }
                Err(error) => {
                    // Exhausted: log and drop.
                    warn!(
                        url = %self.url,
                        attempts,
                        %error,
                        "webhook delivery failed, dropping event"
                    );
                    return Err(SinkError::new("http_callback", error));
                }
            }
        }
        Ok(())
    }
}
