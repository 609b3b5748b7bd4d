//! Local append-only log for batches the sink could not take.
//!
//! One [`AuditEvent`] per line as JSON, the same field set the sink stores,
//! so the file can be replayed into the sink later.
//!
//! The file is opened for every append rather than held open. `quill replay`
//! renames the file once it has been written back, and the next diverted
//! batch must land in a fresh file at the configured path.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use quill_core::FallbackConfig;

use crate::error::PipelineError;
use crate::event::AuditEvent;

/// Append-only JSON Lines file of undeliverable events.
pub struct FallbackLog {
    path: PathBuf,
    sync: bool,
    write_lock: Mutex<()>,
}

/// A line of a fallback file that did not parse as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number.
    pub line: usize,
    pub error: String,
}

/// Everything readable from a fallback file.
#[derive(Debug, Default)]
pub struct FallbackContents {
    pub events: Vec<AuditEvent>,
    pub skipped: Vec<SkippedLine>,
}

impl FallbackLog {
    /// Create a log at `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync: true,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &FallbackConfig) -> Self {
        Self::new(&config.path).with_sync(config.sync)
    }

    /// Whether to `sync_data` after every batch.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
    }

    /// Append a batch, in order, as one write.
    ///
    /// If an earlier write was cut short the file ends mid-line; the batch
    /// then starts on a new line so only the torn line is lost.
    pub fn append_batch(&self, batch: &[AuditEvent]) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        // Serialize before taking the lock
        let mut buf = Vec::with_capacity(batch.len() * 256 + 1);
        for event in batch {
            serde_json::to_writer(&mut buf, event)?;
            buf.push(b'\n');
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.open()?;
        if ends_mid_line(&mut file)? {
            tracing::warn!(path = %self.path.display(), "fallback log ends with a torn line");
            buf.insert(0, b'\n');
        }
        file.write_all(&buf)?;
        if self.sync {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Read every event back from a fallback file.
    ///
    /// A missing file yields no events. Blank lines are skipped, and so are
    /// lines that do not parse; see [`FallbackLog::read`] for those.
    pub fn replay(path: &Path) -> Result<Vec<AuditEvent>, PipelineError> {
        let contents = Self::read(path)?;
        for skipped in &contents.skipped {
            tracing::warn!(
                path = %path.display(),
                line = skipped.line,
                error = %skipped.error,
                "skipping unreadable fallback line"
            );
        }
        Ok(contents.events)
    }

    /// Read a fallback file, keeping track of lines that could not be parsed.
    pub fn read(path: &Path) -> Result<FallbackContents, PipelineError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(FallbackContents::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut contents = FallbackContents::default();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => contents.events.push(event),
                Err(e) => contents.skipped.push(SkippedLine {
                    line: idx + 1,
                    error: e.to_string(),
                }),
            }
        }

        Ok(contents)
    }
}

fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
