//! Queue, batching and retry configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ConfigError;

/// Accepted entries for [`PipelineConfig::capture`].
///
/// A bare operation captures the post-mutation (or stage-less) event; the
/// `BEFORE_` form captures the pre-mutation event.
pub const CAPTURE_ACTIONS: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "BEFORE_INSERT",
    "BEFORE_UPDATE",
    "BEFORE_DELETE",
];

/// Configuration for the event queue and the batcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum events per sink write; reaching it triggers a flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// A partial batch is flushed at least this often.
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Upper bound on queued events; submits beyond it are rejected.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Retry policy for failed sink writes.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Deadline for the final drain on shutdown.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Operation/stage pairs to capture (see [`CAPTURE_ACTIONS`]).
    /// Empty means everything.
    #[serde(default)]
    pub capture: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval: default_flush_interval(),
            queue_capacity: default_queue_capacity(),
            retry: RetryConfig::default(),
            shutdown_timeout: default_shutdown_timeout(),
            capture: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("pipeline.batch_size must be positive".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.queue_capacity must be positive".into(),
            ));
        }
        if self.queue_capacity < self.batch_size {
            return Err(ConfigError::Invalid(format!(
                "pipeline.queue_capacity ({}) must be at least pipeline.batch_size ({})",
                self.queue_capacity, self.batch_size
            )));
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "pipeline.flush_interval must be positive".into(),
            ));
        }
        if let Some(unknown) = self
            .capture
            .iter()
            .find(|entry| !CAPTURE_ACTIONS.contains(&entry.trim().to_ascii_uppercase().as_str()))
        {
            return Err(ConfigError::Invalid(format!(
                "pipeline.capture entry '{}' is not one of {:?}",
                unknown, CAPTURE_ACTIONS
            )));
        }
        self.retry.validate()
    }
}

/// Retry policy for sink writes: exponential backoff, bounded attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero disables retrying.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Ceiling for the delay between retries.
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,

    /// Growth factor applied to the delay after each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Timeout for a single sink write.
    #[serde(default = "default_attempt_timeout", with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
            attempt_timeout: default_attempt_timeout(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "pipeline.retry.multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::Invalid(
                "pipeline.retry.max_backoff must not be below initial_backoff".into(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "pipeline.retry.attempt_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_batch_size() -> usize {
    100
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(200)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(10)
}
