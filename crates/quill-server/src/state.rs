use std::time::Instant;

use quill_audit::IngestEndpoint;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub endpoint: IngestEndpoint,
    /// Name of the durable sink, reported by `/health`.
    pub sink: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(endpoint: IngestEndpoint, sink: impl Into<String>) -> Self {
        Self {
            endpoint,
            sink: sink.into(),
            started_at: Instant::now(),
        }
    }
}
