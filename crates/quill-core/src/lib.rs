//! # quill-core
//!
//! Configuration shared by the Quill crates.
//!
//! A deployment is described by a single `quill.yaml`:
//!
//! ```yaml
//! server:
//!   bind: 0.0.0.0:8080
//! pipeline:
//!   batch_size: 100
//!   flush_interval: 5s
//!   queue_capacity: 10000
//!   retry:
//!     max_retry_attempts: 3
//!     initial_backoff: 200ms
//! sink:
//!   backend: postgres
//!   upstream:
//!     database_url_env: DATABASE_URL
//! fallback:
//!   path: data/audit-fallback.jsonl
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

// Configuration types shared across all Quill crates
pub mod config;

pub use config::{
    CAPTURE_ACTIONS, ConfigError, ConnectionPoolConfig, FallbackConfig, MirrorConfig,
    PipelineConfig, QuillConfig, RetryConfig, ServerConfig, SinkBackend, SinkConfig,
    UpstreamConfig,
};
