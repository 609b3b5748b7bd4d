//! `quill replay`: push a fallback file back into the durable sink.
//!
//! The file is left untouched if any batch fails. Sinks are idempotent on
//! the event key, so running the replay again is safe. Lines that do not
//! parse (a write torn by a crash) are reported and skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use quill_audit::{DurableSink, FallbackContents, FallbackLog, RetryPolicy, SkippedLine};
use quill_core::QuillConfig;

use crate::sinks::build_sink;

pub async fn run(config: &QuillConfig, file: &Path, keep: bool) -> anyhow::Result<()> {
    let sink = build_sink(&config.sink).await?;
    let ReplaySummary { written, skipped } = replay_into(
        file,
        sink,
        config.pipeline.batch_size,
        &RetryPolicy::from(&config.pipeline.retry),
    )
    .await?;

    for line in &skipped {
        println!("  [WARN] line {} skipped: {}", line.line, line.error);
    }
    if !skipped.is_empty() {
        println!("Skipped {} unreadable line(s) in {}", skipped.len(), file.display());
    }

    if written == 0 {
        println!("No events to replay in {}", file.display());
        return Ok(());
    }

    println!("Replayed {} event(s) from {}", written, file.display());
    if !keep {
        let done = replayed_path(file);
        std::fs::rename(file, &done)
            .with_context(|| format!("Failed to rename {} to {}", file.display(), done.display()))?;
        println!("Moved {} to {}", file.display(), done.display());
    }
    Ok(())
}

#[derive(Debug)]
pub struct ReplaySummary {
    pub written: usize,
    pub skipped: Vec<SkippedLine>,
}

/// Write every readable event of `file` to `sink` in chunks of `batch_size`.
pub async fn replay_into(
    file: &Path,
    sink: Arc<dyn DurableSink>,
    batch_size: usize,
    retry: &RetryPolicy,
) -> anyhow::Result<ReplaySummary> {
    let FallbackContents { events, skipped } = FallbackLog::read(file)
        .with_context(|| format!("Failed to read fallback file {}", file.display()))?;

    let mut written = 0;
    for batch in events.chunks(batch_size.max(1)) {
        let sink = Arc::clone(&sink);
        retry
            .run(move |_| {
                let sink = Arc::clone(&sink);
                async move { sink.bulk_write(batch).await }
            })
            .await
            .with_context(|| {
                format!(
                    "Replay stopped after {} of {} event(s); {} left unchanged",
                    written,
                    events.len(),
                    file.display()
                )
            })?;
        written += batch.len();
        tracing::debug!(batch_len = batch.len(), written, "replayed batch");
    }

    Ok(ReplaySummary { written, skipped })
}

fn replayed_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".replayed");
    PathBuf::from(name)
}
