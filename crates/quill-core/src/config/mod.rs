//! Configuration types for the Quill audit pipeline.
//!
//! Configuration is loaded from a single YAML file (`quill.yaml`) into a
//! [`QuillConfig`]. Sections:
//!
//! - **server**: HTTP ingest bind address and log filter
//! - **pipeline**: batch size, flush interval, queue capacity, retry policy
//! - **sink**: durable store selection and Postgres connection
//! - **fallback**: where batches go when the sink gives up
//! - **mirror**: optional write-through copy of every accepted event

pub mod audit;
pub mod pipeline;
pub mod server;
pub mod upstream;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use audit::{FallbackConfig, MirrorConfig};
pub use pipeline::{CAPTURE_ACTIONS, PipelineConfig, RetryConfig};
pub use server::ServerConfig;
pub use upstream::{ConnectionPoolConfig, SinkBackend, SinkConfig, UpstreamConfig};

/// Complete Quill configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuillConfig {
    /// Deployment name, used in health output.
    #[serde(default)]
    pub project: Option<String>,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Queue and batcher settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Durable sink settings.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Fallback log settings.
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Write-through mirror settings.
    #[serde(default)]
    pub mirror: MirrorConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl QuillConfig {
    /// Load and validate configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects a completely empty document
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        self.sink.validate()?;
        if self.fallback.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("fallback.path must not be empty".into()));
        }
        if self.mirror.enabled && self.mirror.file_name.is_empty() {
            return Err(ConfigError::Invalid(
                "mirror.file_name must not be empty when the mirror is enabled".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = QuillConfig::from_yaml("").unwrap();
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.pipeline.flush_interval, Duration::from_secs(5));
        assert_eq!(config.sink.backend, SinkBackend::Postgres);
        assert!(!config.mirror.enabled);
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
project: billing
server:
  bind: 127.0.0.1:9000
pipeline:
  batch_size: 5
  flush_interval: 2s
  queue_capacity: 50
  capture: [INSERT, BEFORE_DELETE]
  retry:
    max_retry_attempts: 0
    initial_backoff: 50ms
sink:
  backend: console
fallback:
  path: /var/lib/quill/fallback.jsonl
mirror:
  enabled: true
  directory: /var/log/quill
"#;
        let config = QuillConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.project.as_deref(), Some("billing"));
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.pipeline.batch_size, 5);
        assert_eq!(config.pipeline.flush_interval, Duration::from_secs(2));
        assert_eq!(config.pipeline.queue_capacity, 50);
        assert_eq!(config.pipeline.capture, vec!["INSERT", "BEFORE_DELETE"]);
        assert_eq!(config.pipeline.retry.max_retry_attempts, 0);
        assert_eq!(config.pipeline.retry.initial_backoff, Duration::from_millis(50));
        assert_eq!(config.sink.backend, SinkBackend::Console);
        assert!(config.mirror.enabled);
        assert_eq!(config.mirror.file_name, "audit.log");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = QuillConfig::from_yaml("pipeline:\n  batch_size: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = QuillConfig::from_yaml("pipeline:\n  capture: [TRUNCATE]\n").unwrap_err();
        assert!(err.to_string().contains("TRUNCATE"));
    }

    #[test]
    fn test_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.yaml");
        std::fs::write(&path, "pipeline:\n  batch_size: 7\n").unwrap();

        let config = QuillConfig::from_file(&path).unwrap();
        assert_eq!(config.pipeline.batch_size, 7);

        let missing = dir.path().join("absent.yaml");
        assert!(QuillConfig::from_file(&missing).is_err());
        let config = QuillConfig::load_or_default(&missing).unwrap();
        assert_eq!(config.pipeline.batch_size, 100);
    }
}
