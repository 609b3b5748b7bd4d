//! Producer-facing entry point.

use std::sync::Arc;

use crate::error::{IngestError, ValidationError};
use crate::event::{AuditEvent, IngestRequest, Operation, Stage};
use crate::mirror::MirrorLog;
use crate::queue::EventQueue;
use crate::stats::{PipelineStats, StatsSnapshot, bump};

/// Outcome of an accepted submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Queued for the sink.
    Accepted,
    /// Acknowledged but not captured by the configured filter.
    Filtered,
}

/// Which operation/stage pairs are captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureFilter {
    // (operation, captured before the mutation); empty captures everything
    allowed: Vec<(Operation, bool)>,
}

impl CaptureFilter {
    /// Capture every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build from entries like `INSERT` or `BEFORE_UPDATE` (case-insensitive).
    pub fn from_actions(actions: &[String]) -> Result<Self, ValidationError> {
        let allowed = actions
            .iter()
            .map(|action| {
                let upper = action.trim().to_ascii_uppercase();
                let (operation, before) = match upper.strip_prefix("BEFORE_") {
                    Some(rest) => (rest, true),
                    None => (upper.as_str(), false),
                };
                operation
                    .parse::<Operation>()
                    .map(|op| (op, before))
                    .map_err(|_| ValidationError::UnknownCaptureAction(action.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { allowed })
    }

    pub fn captures(&self, event: &AuditEvent) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        let before = event.stage() == Some(Stage::Before);
        self.allowed.contains(&(event.operation(), before))
    }
}

/// Cloneable handle producers submit events through.
///
/// `submit` validates, enqueues and returns without waiting for any flush.
#[derive(Clone)]
pub struct IngestEndpoint {
    queue: Arc<EventQueue>,
    mirror: Option<Arc<MirrorLog>>,
    filter: CaptureFilter,
    stats: Arc<PipelineStats>,
}

impl IngestEndpoint {
    pub(crate) fn new(
        queue: Arc<EventQueue>,
        mirror: Option<Arc<MirrorLog>>,
        filter: CaptureFilter,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            queue,
            mirror,
            filter,
            stats,
        }
    }

    /// Hand an event to the pipeline.
    pub fn submit(&self, event: AuditEvent) -> Result<Submission, IngestError> {
        if let Err(e) = event.validate() {
            bump(&self.stats.rejected_invalid, 1);
            tracing::warn!(
                error = %e,
                entity = event.entity_name(),
                "rejected invalid audit event"
            );
            return Err(e.into());
        }

        if !self.filter.captures(&event) {
            bump(&self.stats.filtered, 1);
            tracing::debug!(
                operation = %event.operation(),
                entity = event.entity_name(),
                "audit event not captured by filter"
            );
            return Ok(Submission::Filtered);
        }

        let mirrored = self.mirror.as_ref().map(|mirror| (mirror, event.clone()));

        match self.queue.enqueue(event) {
            Ok(depth) => {
                bump(&self.stats.accepted, 1);
                if let Some((mirror, event)) = mirrored {
                    mirror.record(&event);
                }
                tracing::trace!(depth, "audit event queued");
                Ok(Submission::Accepted)
            }
            Err(e) => {
                let err = IngestError::from(e);
                match &err {
                    IngestError::QueueFull { .. } => bump(&self.stats.rejected_full, 1),
                    _ => bump(&self.stats.rejected_closed, 1),
                }
                tracing::warn!(code = err.code(), error = %err, "audit event rejected");
                Err(err)
            }
        }
    }

    /// Convert a wire request and submit it.
    pub fn submit_request(&self, request: IngestRequest) -> Result<Submission, IngestError> {
        match request.into_event() {
            Ok(event) => self.submit(event),
            Err(e) => {
                bump(&self.stats.rejected_invalid, 1);
                tracing::warn!(error = %e, "rejected invalid audit request");
                Err(e.into())
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.queue.len())
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }
}
