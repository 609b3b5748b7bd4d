//! Local audit log file configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where batches go when the durable sink keeps failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// JSON Lines file, created on first write.
    #[serde(default = "default_fallback_path")]
    pub path: PathBuf,

    /// Whether to fsync after every appended batch.
    #[serde(default = "default_true")]
    pub sync: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            path: default_fallback_path(),
            sync: true,
        }
    }
}

/// Write-through copy of every accepted event, independent of the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Whether the mirror is written at all.
    #[serde(default)]
    pub enabled: bool,

    /// Directory holding the mirror file.
    #[serde(default = "default_mirror_directory")]
    pub directory: PathBuf,

    /// Mirror file name inside `directory`.
    #[serde(default = "default_mirror_file_name")]
    pub file_name: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_mirror_directory(),
            file_name: default_mirror_file_name(),
        }
    }
}

impl MirrorConfig {
    /// Full path of the mirror file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

fn default_true() -> bool {
    true
}

fn default_fallback_path() -> PathBuf {
    PathBuf::from("data/audit-fallback.jsonl")
}

fn default_mirror_directory() -> PathBuf {
    PathBuf::from("data")
}

fn default_mirror_file_name() -> String {
    "audit.log".to_string()
}
