//! Sink construction from configuration.

use std::sync::Arc;

use quill_adapter_pg::PostgresSink;
use quill_audit::{ConsoleSink, DurableSink, NullSink};
use quill_core::{SinkBackend, SinkConfig};

/// Build the configured durable sink.
///
/// For Postgres, table creation is attempted once; if the database is down
/// the sink is still returned and writes go through retries and the
/// fallback log until it comes back.
pub async fn build_sink(config: &SinkConfig) -> anyhow::Result<Arc<dyn DurableSink>> {
    match config.backend {
        SinkBackend::Postgres => {
            let sink = PostgresSink::connect(config)?;
            if config.create_table
                && let Err(e) = sink.ensure_table().await
            {
                tracing::warn!(
                    error = %e,
                    table = %config.table,
                    "could not prepare audit table, continuing with retries and fallback"
                );
            }
            Ok(Arc::new(sink))
        }
        SinkBackend::Console => Ok(Arc::new(ConsoleSink)),
        SinkBackend::Null => {
            tracing::warn!("null sink configured, audit events will be discarded");
            Ok(Arc::new(NullSink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_process_backends() {
        let config = SinkConfig {
            backend: SinkBackend::Console,
            ..SinkConfig::default()
        };
        assert_eq!(build_sink(&config).await.unwrap().name(), "console");

        let config = SinkConfig {
            backend: SinkBackend::Null,
            ..SinkConfig::default()
        };
        assert_eq!(build_sink(&config).await.unwrap().name(), "null");
    }
}
