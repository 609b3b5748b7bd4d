//! Pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters shared by the ingest endpoint and the batcher.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub(crate) accepted: AtomicU64,
    pub(crate) filtered: AtomicU64,
    pub(crate) rejected_invalid: AtomicU64,
    pub(crate) rejected_full: AtomicU64,
    pub(crate) rejected_closed: AtomicU64,
    pub(crate) batches_flushed: AtomicU64,
    pub(crate) events_flushed: AtomicU64,
    pub(crate) retries: AtomicU64,
    pub(crate) batches_failed: AtomicU64,
    pub(crate) events_to_fallback: AtomicU64,
    pub(crate) events_lost: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub filtered: u64,
    pub rejected_invalid: u64,
    pub rejected_full: u64,
    pub rejected_closed: u64,
    pub batches_flushed: u64,
    pub events_flushed: u64,
    pub retries: u64,
    pub batches_failed: u64,
    pub events_to_fallback: u64,
    pub events_lost: u64,
    pub queue_depth: usize,
}

pub(crate) fn bump(counter: &AtomicU64, by: usize) {
    counter.fetch_add(by as u64, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, queue_depth: usize) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            accepted: load(&self.accepted),
            filtered: load(&self.filtered),
            rejected_invalid: load(&self.rejected_invalid),
            rejected_full: load(&self.rejected_full),
            rejected_closed: load(&self.rejected_closed),
            batches_flushed: load(&self.batches_flushed),
            events_flushed: load(&self.events_flushed),
            retries: load(&self.retries),
            batches_failed: load(&self.batches_failed),
            events_to_fallback: load(&self.events_to_fallback),
            events_lost: load(&self.events_lost),
            queue_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = PipelineStats::new();
        bump(&stats.accepted, 3);
        bump(&stats.events_flushed, 2);
        bump(&stats.batches_flushed, 1);

        let snapshot = stats.snapshot(1);
        assert_eq!(snapshot.accepted, 3);
        assert_eq!(snapshot.events_flushed, 2);
        assert_eq!(snapshot.batches_flushed, 1);
        assert_eq!(snapshot.queue_depth, 1);
        assert_eq!(snapshot.events_lost, 0);

        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["accepted"], 3);
    }
}
