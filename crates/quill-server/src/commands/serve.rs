//! `quill serve`: HTTP ingest in front of the audit pipeline.

use anyhow::Context;
use quill_audit::{AuditPipeline, FallbackLog, MirrorLog};
use quill_core::QuillConfig;

use crate::routes;
use crate::shutdown::create_shutdown_token;
use crate::sinks::build_sink;
use crate::state::AppState;

pub async fn run(config: QuillConfig, bind: Option<String>) -> anyhow::Result<()> {
    let sink = build_sink(&config.sink).await?;
    let sink_name = sink.name().to_string();

    let mirror = MirrorLog::from_config(&config.mirror).with_context(|| {
        format!("Failed to open mirror log {}", config.mirror.path().display())
    })?;
    let pipeline = AuditPipeline::start(
        &config.pipeline,
        sink,
        FallbackLog::from_config(&config.fallback),
        mirror,
    )?;

    let app = routes::router(AppState::new(pipeline.endpoint(), sink_name));

    let addr = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        addr = %addr,
        project = config.project.as_deref().unwrap_or("quill"),
        "quill listening"
    );

    let shutdown = create_shutdown_token();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await;

    drain_after_serve(served, pipeline).await
}

/// Flush what is queued once HTTP has stopped, whether it stopped cleanly
/// or not, then report the server's own result.
async fn drain_after_serve(
    served: std::io::Result<()>,
    pipeline: AuditPipeline,
) -> anyhow::Result<()> {
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server failed, draining audit pipeline");
    }

    let stats = pipeline.shutdown().await?;
    if stats.events_lost > 0 {
        tracing::error!(events_lost = stats.events_lost, "audit events were lost");
    }
    served.context("HTTP server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_audit::{AuditEvent, DurableSink, MemorySink, Operation};
    use quill_core::PipelineConfig;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_error_still_drains_pipeline() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MemorySink::new());
        let config = PipelineConfig {
            batch_size: 10,
            flush_interval: Duration::from_secs(3600),
            ..PipelineConfig::default()
        };
        let pipeline = AuditPipeline::start(
            &config,
            Arc::clone(&sink) as Arc<dyn DurableSink>,
            FallbackLog::new(dir.path().join("fallback.jsonl")),
            None,
        )
        .unwrap();
        for n in 0..3 {
            pipeline
                .endpoint()
                .submit(AuditEvent::new("t", "items", Operation::Insert, format!("id={n}")))
                .unwrap();
        }

        let served = Err(std::io::Error::other("accept failed"));
        let err = drain_after_serve(served, pipeline).await.unwrap_err();

        assert!(err.to_string().contains("HTTP server failed"));
        assert_eq!(sink.events().len(), 3);
    }
}
