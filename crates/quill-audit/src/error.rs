//! Error types for the audit crate.

use std::time::Duration;

use quill_core::ConfigError;
use thiserror::Error;

/// An event failed validation at ingest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or blank.
    #[error("required field '{0}' is empty")]
    EmptyField(&'static str),

    #[error("unknown operation '{0}' (expected INSERT, UPDATE or DELETE)")]
    UnknownOperation(String),

    #[error("unknown stage '{0}' (expected BEFORE or AFTER)")]
    UnknownStage(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("unknown capture action '{0}'")]
    UnknownCaptureAction(String),
}

/// A canonical record key could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordKeyError {
    #[error("dangling escape at end of record key")]
    DanglingEscape,

    #[error("invalid escape sequence '\\{0}' in record key")]
    InvalidEscape(char),

    #[error("record key segment {0} has no '=' separator")]
    MissingSeparator(usize),

    #[error("record key segment {0} has more than one unescaped '='")]
    ExtraSeparator(usize),
}

/// The event queue refused an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("queue is full ({capacity} events)")]
    Full { capacity: usize },

    /// The queue no longer accepts events.
    #[error("queue is closed")]
    Closed,
}

/// A durable sink failed to write a batch.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// The store could not be reached or failed transiently.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// A single write exceeded the attempt timeout.
    #[error("sink write timed out after {0:?}")]
    Timeout(Duration),

    /// The store refused the batch; retrying will not help.
    #[error("sink rejected batch: {0}")]
    Rejected(String),
}

impl SinkError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Rejection returned synchronously to a producer.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] ValidationError),

    #[error("audit queue is full ({capacity} events)")]
    QueueFull { capacity: usize },

    #[error("audit pipeline is shutting down")]
    ShuttingDown,
}

impl IngestError {
    /// Stable rejection reason code for producers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::QueueFull { .. } => "QUEUE_FULL",
            Self::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}

impl From<QueueError> for IngestError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full { capacity } => Self::QueueFull { capacity },
            QueueError::Closed => Self::ShuttingDown,
        }
    }
}

/// Errors raised inside the pipeline (never returned to producers).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Retries exhausted, or the sink rejected the batch outright.
    #[error("sink write failed after {attempts} attempt(s): {source}")]
    SinkPermanent {
        attempts: u32,
        #[source]
        source: SinkError,
    },

    /// Writing or reading the fallback log failed.
    #[error("fallback log error: {0}")]
    Fallback(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid pipeline configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid capture filter.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The batcher task panicked or was aborted.
    #[error("batcher task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_codes() {
        assert_eq!(
            IngestError::from(ValidationError::EmptyField("actor_id")).code(),
            "INVALID_EVENT"
        );
        assert_eq!(
            IngestError::from(QueueError::Full { capacity: 3 }).code(),
            "QUEUE_FULL"
        );
        assert_eq!(IngestError::from(QueueError::Closed).code(), "SHUTTING_DOWN");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SinkError::Unavailable("refused".into()).is_retryable());
        assert!(SinkError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!SinkError::Rejected("bad row".into()).is_retryable());
    }
}
