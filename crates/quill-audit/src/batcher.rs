//! The single consumer of the event queue.
//!
//! The batcher waits for either the flush interval to elapse or the queue to
//! reach `batch_size`, drains at most `batch_size` events, and writes them to
//! the sink with retries. A batch that cannot be written goes to the fallback
//! log. Batches are resolved one at a time, so the sink sees events in
//! enqueue order.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::event::AuditEvent;
use crate::fallback::FallbackLog;
use crate::queue::EventQueue;
use crate::retry::RetryPolicy;
use crate::sink::DurableSink;
use crate::stats::{PipelineStats, bump};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    /// Flush interval elapsed: write everything, partial batch included.
    Timer,
    /// Queue reached `batch_size`: write full batches only.
    Watermark,
}

pub(crate) struct Batcher {
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) sink: Arc<dyn DurableSink>,
    pub(crate) fallback: FallbackLog,
    pub(crate) retry: RetryPolicy,
    pub(crate) stats: Arc<PipelineStats>,
    pub(crate) batch_size: usize,
    pub(crate) flush_interval: Duration,
    pub(crate) shutdown_timeout: Duration,
}

impl Batcher {
    /// Run until `cancel` fires, then drain what is left.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(sink = self.sink.name(), "batcher started");

        let interrupted = loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => break None,
                _ = ticker.tick() => FlushTrigger::Timer,
                _ = self.queue.wait_for_watermark() => FlushTrigger::Watermark,
            };
            if let Some(batch) = self.flush_pending(trigger, &cancel).await {
                break Some(batch);
            }
        };

        self.queue.close();
        self.drain_on_shutdown(interrupted).await;
    }

    /// Flush what the trigger calls for. Returns the in-flight batch if
    /// cancellation interrupted its write.
    async fn flush_pending(
        &self,
        trigger: FlushTrigger,
        cancel: &CancellationToken,
    ) -> Option<Vec<AuditEvent>> {
        loop {
            if trigger == FlushTrigger::Watermark && self.queue.len() < self.batch_size {
                return None;
            }

            let batch = self.queue.drain_up_to(self.batch_size);
            if batch.is_empty() {
                return None;
            }
            let partial = batch.len() < self.batch_size;

            let interrupted = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = self.write_batch(&batch) => false,
            };
            if interrupted {
                return Some(batch);
            }
            if partial {
                return None;
            }
        }
    }

    async fn write_batch(&self, batch: &[AuditEvent]) {
        match self.write_with_retry(batch).await {
            Ok(attempts) => self.record_flushed(batch, attempts),
            Err(e) => self.record_failure(batch, &e),
        }
    }

    async fn write_with_retry(&self, batch: &[AuditEvent]) -> Result<u32, PipelineError> {
        let sink: &dyn DurableSink = self.sink.as_ref();
        let stats: &PipelineStats = &self.stats;

        self.retry
            .run(move |attempt| {
                if attempt > 0 {
                    bump(&stats.retries, 1);
                }
                async move { sink.bulk_write(batch).await }
            })
            .await
    }

    fn record_flushed(&self, batch: &[AuditEvent], attempts: u32) {
        bump(&self.stats.batches_flushed, 1);
        bump(&self.stats.events_flushed, batch.len());
        tracing::debug!(
            sink = self.sink.name(),
            batch_len = batch.len(),
            attempts,
            "audit batch written"
        );
    }

    fn record_failure(&self, batch: &[AuditEvent], error: &PipelineError) {
        bump(&self.stats.batches_failed, 1);
        tracing::error!(
            sink = self.sink.name(),
            batch_len = batch.len(),
            error = %error,
            "audit batch could not be written, diverting to fallback log"
        );
        self.divert_to_fallback(batch);
    }

    fn divert_to_fallback(&self, batch: &[AuditEvent]) {
        match self.fallback.append_batch(batch) {
            Ok(()) => {
                bump(&self.stats.events_to_fallback, batch.len());
                tracing::warn!(
                    path = %self.fallback.path().display(),
                    batch_len = batch.len(),
                    "audit batch written to fallback log"
                );
            }
            Err(e) => {
                bump(&self.stats.events_lost, batch.len());
                tracing::error!(
                    path = %self.fallback.path().display(),
                    error = %e,
                    "fallback log write failed"
                );
                // Last resort: the full event goes to the process log as a
                // fallback-format line, so it can be copied back into a file
                for event in batch {
                    tracing::error!(event = %undeliverable_line(event), "undeliverable audit event");
                }
            }
        }
    }

    /// Write everything still queued within `shutdown_timeout`.
    async fn drain_on_shutdown(&self, interrupted: Option<Vec<AuditEvent>>) {
        let deadline = Instant::now() + self.shutdown_timeout;
        let mut carried = interrupted;
        let mut written = 0usize;

        loop {
            let batch = match carried.take() {
                Some(batch) => batch,
                None => self.queue.drain_up_to(self.batch_size),
            };
            if batch.is_empty() {
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.write_with_retry(&batch)).await {
                Ok(Ok(attempts)) => {
                    written += batch.len();
                    self.record_flushed(&batch, attempts);
                }
                Ok(Err(e)) => self.record_failure(&batch, &e),
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.shutdown_timeout.as_millis() as u64,
                        "shutdown deadline passed, diverting remaining events to fallback log"
                    );
                    bump(&self.stats.batches_failed, 1);
                    self.divert_to_fallback(&batch);
                    loop {
                        let rest = self.queue.drain_up_to(self.batch_size);
                        if rest.is_empty() {
                            break;
                        }
                        self.divert_to_fallback(&rest);
                    }
                    break;
                }
            }
        }

        tracing::info!(events_written = written, "batcher stopped");
    }
}

/// The event as one fallback log line, or the summary line if it will not
/// serialize.
fn undeliverable_line(event: &AuditEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| event.to_log_line())
}
