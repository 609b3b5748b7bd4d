//! Durable sink backends.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::event::AuditEvent;

/// A store that receives batches of audit events.
///
/// A batch is either written completely or not at all, or the write is
/// idempotent on [`AuditEvent::idempotency_key`], so the batcher may retry a
/// batch without producing duplicates.
#[async_trait]
pub trait DurableSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Write one batch, preserving its order.
    async fn bulk_write(&self, batch: &[AuditEvent]) -> Result<(), SinkError>;
}

/// Console sink (one JSON line per event on stdout).
pub struct ConsoleSink;

#[async_trait]
impl DurableSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn bulk_write(&self, batch: &[AuditEvent]) -> Result<(), SinkError> {
        let mut out = String::new();
        for event in batch {
            let json = serde_json::to_string(event)
                .map_err(|e| SinkError::Rejected(e.to_string()))?;
            out.push_str(&json);
            out.push('\n');
        }
        print!("{out}");
        Ok(())
    }
}

/// Accepts and discards every batch.
pub struct NullSink;

#[async_trait]
impl DurableSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    async fn bulk_write(&self, _batch: &[AuditEvent]) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    batches: Vec<Vec<AuditEvent>>,
    attempts: usize,
}

/// In-memory sink that records every committed batch.
///
/// Can be told to fail a number of times first, or always, which makes it
/// the workhorse of the pipeline tests.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
    fail_first: usize,
    always_fail: bool,
    latency: Option<Duration>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `failures` writes with [`SinkError::Unavailable`].
    pub fn failing_first(failures: usize) -> Self {
        Self {
            fail_first: failures,
            ..Self::default()
        }
    }

    /// Fail every write with [`SinkError::Unavailable`].
    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Sleep for `latency` before each write completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Committed batches, in write order.
    pub fn batches(&self) -> Vec<Vec<AuditEvent>> {
        self.lock().batches.clone()
    }

    /// All committed events, flattened.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().batches.iter().flatten().cloned().collect()
    }

    /// Number of `bulk_write` calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }
}

#[async_trait]
impl DurableSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn bulk_write(&self, batch: &[AuditEvent]) -> Result<(), SinkError> {
        let attempt = {
            let mut state = self.lock();
            state.attempts += 1;
            state.attempts
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.always_fail || attempt <= self.fail_first {
            return Err(SinkError::Unavailable(format!(
                "simulated failure on attempt {attempt}"
            )));
        }

        self.lock().batches.push(batch.to_vec());
        Ok(())
    }
}
