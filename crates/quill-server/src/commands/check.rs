//! `quill check-config`: validate configuration and print the effective
//! settings, with warnings for settings that are legal but risky.

use std::path::Path;

use quill_core::{QuillConfig, SinkBackend};

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    pub message: String,
}

impl CheckFinding {
    fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

pub fn run(config: &QuillConfig, path: Option<&Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => println!("Configuration {} is valid", path.display()),
        None => println!("Configuration is valid"),
    }
    for finding in findings(config) {
        println!("  [{}] {}", finding.severity, finding.message);
    }
    Ok(())
}

/// Review an already-validated configuration.
pub fn findings(config: &QuillConfig) -> Vec<CheckFinding> {
    let pipeline = &config.pipeline;
    let mut out = vec![
        CheckFinding::info(format!(
            "batch_size={} flush_interval={:?} queue_capacity={}",
            pipeline.batch_size, pipeline.flush_interval, pipeline.queue_capacity
        )),
        CheckFinding::info(format!(
            "sink={} table={} fallback={}",
            config.sink.backend,
            config.sink.table,
            config.fallback.path.display()
        )),
    ];

    match config.sink.backend {
        SinkBackend::Null => out.push(CheckFinding::warning(
            "sink backend 'null' discards every audit event",
        )),
        SinkBackend::Console => out.push(CheckFinding::warning(
            "sink backend 'console' is not durable",
        )),
        SinkBackend::Postgres => {}
    }

    if pipeline.retry.max_retry_attempts == 0 {
        out.push(CheckFinding::warning(
            "retries are disabled; any sink error sends the batch to the fallback log",
        ));
    }
    if !config.fallback.sync {
        out.push(CheckFinding::warning(
            "fallback.sync is off; diverted batches may be lost on power failure",
        ));
    }
    if pipeline.shutdown_timeout < pipeline.retry.attempt_timeout {
        out.push(CheckFinding::warning(format!(
            "shutdown_timeout ({:?}) is shorter than one sink attempt ({:?})",
            pipeline.shutdown_timeout, pipeline.retry.attempt_timeout
        )));
    }
    if !pipeline.capture.is_empty() {
        out.push(CheckFinding::info(format!(
            "only capturing {}",
            pipeline.capture.join(", ")
        )));
    }
    if config.mirror.enabled {
        out.push(CheckFinding::info(format!(
            "mirroring accepted events to {}",
            config.mirror.path().display()
        )));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warnings(config: &QuillConfig) -> Vec<String> {
        findings(config)
            .into_iter()
            .filter(|f| f.severity == Severity::Warning)
            .map(|f| f.message)
            .collect()
    }

    #[test]
    fn test_defaults_have_no_warnings() {
        assert!(warnings(&QuillConfig::default()).is_empty());
    }

    #[test]
    fn test_risky_settings_warn() {
        let config = QuillConfig::from_yaml(
            r#"
pipeline:
  shutdown_timeout: 1s
  retry:
    max_retry_attempts: 0
sink:
  backend: "null"
fallback:
  sync: false
"#,
        )
        .unwrap();

        let warnings = warnings(&config);
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().any(|w| w.contains("discards")));
    }
}
