//! Bounded retry with exponential backoff for sink writes.

use std::future::Future;
use std::time::Duration;

use quill_core::RetryConfig;

use crate::error::{PipelineError, SinkError};

/// Retry schedule derived from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retry_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Timeout per individual attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retry_attempts: config.max_retry_attempts,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
            attempt_timeout: config.attempt_timeout,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `f` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    ///
    /// `f` receives the 0-based attempt number. Each attempt is bounded by
    /// `attempt_timeout`. On success returns the number of attempts made.
    pub async fn run<F, Fut>(&self, mut f: F) -> Result<u32, PipelineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), SinkError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, f(attempt)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(SinkError::Timeout(self.attempt_timeout)),
            };

            let error = match result {
                Ok(()) => return Ok(attempt + 1),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= self.max_retry_attempts {
                return Err(PipelineError::SinkPermanent {
                    attempts: attempt + 1,
                    source: error,
                });
            }

            let delay = self.backoff_for(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                retry_in_ms = delay.as_millis() as u64,
                error = %error,
                "sink write failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
