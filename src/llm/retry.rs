//! Retry manager with exponential backoff
//!
//! Bounded retries for transient failures (429, 5xx, transport errors):
//! binary exponential delay with ±25% jitter, capped per attempt.

use crate::errors::{LexiError, Result};
use std::time::Duration;
use tokio::time::sleep;

/// Default number of attempts, including the first
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff
const BASE_DELAY_MS: u64 = 500;

/// Maximum delay cap
const MAX_DELAY_MS: u64 = 8000;

/// Retry manager with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryManager {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    enable_jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    /// Create new retry manager with default settings
    pub fn new() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Create retry manager with custom settings
    pub fn with_config(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.enable_jitter = false;
        self
    }

    /// Run `operation`, retrying transient errors. The last error is returned
    /// once attempts are exhausted.
    pub async fn execute_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;

                    if !e.is_transient() || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Calculate delay before retry number `attempt` (1-based)
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as f64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter;
            ((delay_ms as f64) + random_jitter).max(0.0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Upper bound on total sleep, ignoring jitter
    pub fn max_total_wait_time(&self) -> Duration {
        let total_ms: u64 = (1..self.max_attempts)
            .map(|attempt| {
                self.base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt - 1))
                    .min(self.max_delay_ms)
            })
            .sum();
        Duration::from_millis(total_ms)
    }

    /// Get max attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_success_first_attempt() {
        let retry = RetryManager::with_config(3, 1);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry
            .execute_with_retry(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, LexiError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let retry = RetryManager::with_config(3, 1);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry
            .execute_with_retry(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(LexiError::OpenAiError("HTTP 503 Service Unavailable: ".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let retry = RetryManager::with_config(5, 1);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry
            .execute_with_retry(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(LexiError::OpenAiError("HTTP 401 Unauthorized: ".into()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let retry = RetryManager::with_config(3, 1);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry
            .execute_with_retry(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(LexiError::Timeout { duration_ms: 5 })
                }
            })
            .await;

        assert!(matches!(result, Err(LexiError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_is_capped() {
        let retry = RetryManager::with_config(10, 1000).without_jitter();
        assert_eq!(retry.calculate_delay(1), Duration::from_millis(1000));
        assert_eq!(retry.calculate_delay(2), Duration::from_millis(2000));
        assert_eq!(retry.calculate_delay(9), Duration::from_millis(MAX_DELAY_MS));
    }

    #[test]
    fn test_max_total_wait() {
        let retry = RetryManager::with_config(3, 500).without_jitter();
        assert_eq!(retry.max_total_wait_time(), Duration::from_millis(1500));
    }
}
