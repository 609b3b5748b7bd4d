//! # quill-audit
//!
//! Batched, durable delivery of audit events.
//!
//! This crate provides:
//! - An [`IngestEndpoint`] producers submit [`AuditEvent`]s through, without
//!   ever waiting for storage
//! - A bounded [`EventQueue`] that rejects instead of blocking when full
//! - A single batcher task that flushes by size or by time, retries failed
//!   writes with backoff, and diverts what it cannot deliver to a
//!   [`FallbackLog`]
//! - The [`DurableSink`] trait plus in-process sinks (memory, console, null)
//!
//! ## Flush policy
//!
//! | Trigger | What is written |
//! |---------|-----------------|
//! | Queue reaches `batch_size` | Full batches, until fewer than `batch_size` remain |
//! | `flush_interval` elapses | Everything queued, in chunks of `batch_size` |
//! | Shutdown | Everything queued, within `shutdown_timeout` |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quill_audit::{AuditEvent, AuditPipeline, FallbackLog, MemorySink, Operation, RecordKey};
//! use quill_core::PipelineConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(MemorySink::new());
//! let pipeline = AuditPipeline::start(
//!     &PipelineConfig::default(),
//!     sink.clone(),
//!     FallbackLog::new("data/audit-fallback.jsonl"),
//!     None,
//! )?;
//!
//! let endpoint = pipeline.endpoint();
//! let event = AuditEvent::builder(
//!     "user:42",
//!     "orders",
//!     Operation::Update,
//!     RecordKey::single("id", "7"),
//! )
//! .changes(r#"{"status":"shipped"}"#)
//! .build();
//! endpoint.submit(event)?;
//!
//! pipeline.shutdown().await?;
//! assert_eq!(sink.events().len(), 1);
//! # Ok(())
//! # }
//! ```

mod batcher;
pub mod error;
pub mod event;
pub mod fallback;
pub mod ingest;
pub mod mirror;
pub mod pipeline;
pub mod queue;
pub mod record_key;
pub mod retry;
pub mod sink;
pub mod stats;

pub use error::{
    IngestError, PipelineError, QueueError, RecordKeyError, SinkError, ValidationError,
};
pub use event::{AuditEvent, AuditEventBuilder, IngestRequest, Operation, Stage};
pub use fallback::{FallbackContents, FallbackLog, SkippedLine};
pub use ingest::{CaptureFilter, IngestEndpoint, Submission};
pub use mirror::MirrorLog;
pub use pipeline::AuditPipeline;
pub use queue::EventQueue;
pub use record_key::RecordKey;
pub use retry::RetryPolicy;
pub use sink::{ConsoleSink, DurableSink, MemorySink, NullSink};
pub use stats::{PipelineStats, StatsSnapshot};
