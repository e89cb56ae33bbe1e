//! Retry with exponential backoff for transient provider failures.

use serde_json::Value;
use std::{fmt::Display, future::Future, time::Duration};
use tracing::warn;

/// How many times a retriable failure is retried and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(1000))
    }
}

/// Classify an error message.
///
/// A JSON body is retriable only when `error.status` is `UNAVAILABLE`. Any
/// other text is retriable when it mentions a 503 or "unavailable".
pub fn is_retriable(message: &str) -> bool {
    match serde_json::from_str::<Value>(message) {
        Ok(body) => body.pointer("/error/status").and_then(Value::as_str) == Some("UNAVAILABLE"),
        Err(_) => message.contains("503") || message.to_lowercase().contains("unavailable"),
    }
}

/// Run `operation`, retrying retriable failures according to `policy`.
///
/// The last error is returned unchanged once the failure is terminal or the
/// retries are exhausted.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries || !is_retriable(&err.to_string()) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "API call failed, retrying in {}ms (attempt {}/{}): {}",
                    delay.as_millis(),
                    attempt + 1,
                    policy.max_retries,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
