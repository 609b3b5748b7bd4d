//! Subcommand implementations.

pub mod check;
pub mod replay;
pub mod serve;

use std::path::Path;

use anyhow::Context;
use quill_core::QuillConfig;

/// Configuration file picked up from the working directory when present.
pub const DEFAULT_CONFIG: &str = "quill.yaml";

/// Load an explicitly named config file, or `quill.yaml` if it exists, or
/// the built-in defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<QuillConfig> {
    match path {
        Some(path) => QuillConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => QuillConfig::load_or_default(DEFAULT_CONFIG)
            .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG)),
    }
}
