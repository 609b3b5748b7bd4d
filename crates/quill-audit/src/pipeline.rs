//! Wiring of queue, ingest endpoint and batcher.

use std::sync::Arc;

use quill_core::PipelineConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::batcher::Batcher;
use crate::error::PipelineError;
use crate::fallback::FallbackLog;
use crate::ingest::{CaptureFilter, IngestEndpoint};
use crate::mirror::MirrorLog;
use crate::queue::EventQueue;
use crate::retry::RetryPolicy;
use crate::sink::DurableSink;
use crate::stats::{PipelineStats, StatsSnapshot};

/// A running audit pipeline.
///
/// Each pipeline owns its own queue and batcher task; several can run side
/// by side in one process. Dropping the pipeline without calling
/// [`shutdown`](Self::shutdown) still cancels the batcher, which then drains
/// in the background.
pub struct AuditPipeline {
    endpoint: IngestEndpoint,
    queue: Arc<EventQueue>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    batcher: Option<JoinHandle<()>>,
}

impl AuditPipeline {
    /// Validate `config` and spawn the batcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &PipelineConfig,
        sink: Arc<dyn DurableSink>,
        fallback: FallbackLog,
        mirror: Option<MirrorLog>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let filter = CaptureFilter::from_actions(&config.capture)?;

        let queue = Arc::new(EventQueue::with_watermark(
            config.queue_capacity,
            config.batch_size,
        ));
        let stats = Arc::new(PipelineStats::new());
        let cancel = CancellationToken::new();

        tracing::info!(
            sink = sink.name(),
            batch_size = config.batch_size,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            queue_capacity = config.queue_capacity,
            fallback = %fallback.path().display(),
            mirror = mirror.is_some(),
            "audit pipeline starting"
        );

        let batcher = Batcher {
            queue: Arc::clone(&queue),
            sink,
            fallback,
            retry: RetryPolicy::from(&config.retry),
            stats: Arc::clone(&stats),
            batch_size: config.batch_size,
            flush_interval: config.flush_interval,
            shutdown_timeout: config.shutdown_timeout,
        };
        let handle = tokio::spawn(batcher.run(cancel.clone()));

        let endpoint = IngestEndpoint::new(
            Arc::clone(&queue),
            mirror.map(Arc::new),
            filter,
            Arc::clone(&stats),
        );

        Ok(Self {
            endpoint,
            queue,
            stats,
            cancel,
            batcher: Some(handle),
        })
    }

    /// A handle producers can clone freely.
    pub fn endpoint(&self) -> IngestEndpoint {
        self.endpoint.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.queue.len())
    }

    /// Stop accepting events, drain the queue and wait for the batcher.
    pub async fn shutdown(mut self) -> Result<StatsSnapshot, PipelineError> {
        tracing::info!(queued = self.queue.len(), "audit pipeline shutting down");
        self.queue.close();
        self.cancel.cancel();

        if let Some(handle) = self.batcher.take() {
            handle.await?;
        }

        let stats = self.stats();
        tracing::info!(
            accepted = stats.accepted,
            events_flushed = stats.events_flushed,
            events_to_fallback = stats.events_to_fallback,
            events_lost = stats.events_lost,
            "audit pipeline stopped"
        );
        Ok(stats)
    }
}

impl Drop for AuditPipeline {
    fn drop(&mut self) {
        self.queue.close();
        self.cancel.cancel();
    }
}
