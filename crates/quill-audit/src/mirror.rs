//! Best-effort write-through copy of accepted events.
//!
//! Lines go through a `tracing_appender` non-blocking writer: a background
//! thread owns the file, and when its buffer is full lines are dropped
//! rather than stalling the producer.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use quill_core::MirrorConfig;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};

use crate::event::AuditEvent;

/// JSON Lines mirror of every accepted event.
pub struct MirrorLog {
    path: PathBuf,
    writer: NonBlocking,
    // Flushes pending lines when the log is dropped
    _guard: WorkerGuard,
}

impl MirrorLog {
    /// Open (or create) `file_name` under `directory` for appending.
    pub fn open(directory: &Path, file_name: &str) -> io::Result<Self> {
        fs::create_dir_all(directory)?;
        let path = directory.join(file_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let (writer, guard) = NonBlockingBuilder::default()
            .lossy(true)
            .thread_name("quill-mirror")
            .finish(file);

        Ok(Self {
            path,
            writer,
            _guard: guard,
        })
    }

    /// Open the mirror described by `config`, or `None` when disabled.
    pub fn from_config(config: &MirrorConfig) -> io::Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        Self::open(&config.directory, &config.file_name).map(Some)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue one event for the mirror file. Never blocks on disk I/O.
    pub fn record(&self, event: &AuditEvent) {
        let mut line = match serde_json::to_vec(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize event for mirror log");
                return;
            }
        };
        line.push(b'\n');

        let mut writer = self.writer.clone();
        if let Err(e) = writer.write_all(&line) {
            tracing::warn!(error = %e, path = %self.path.display(), "mirror log write failed");
        }
    }
}
