//! Durable sink configuration.
//!
//! The Postgres connection can be configured three ways, in order of
//! precedence:
//! 1. `database_url_env` - reference an environment variable
//! 2. `database_url` - provide the URL directly
//! 3. Individual fields (host, port, database, username, password)

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Which durable sink receives batches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkBackend {
    /// Bulk insert into a Postgres table.
    #[default]
    Postgres,
    /// Print one JSON line per event to stdout.
    Console,
    /// Accept and discard (benchmarks, dry runs).
    Null,
}

impl std::fmt::Display for SinkBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Console => write!(f, "console"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// Sink selection plus backend-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub backend: SinkBackend,

    /// Postgres connection (used when `backend` is `postgres`).
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Target table.
    #[serde(default = "default_table")]
    pub table: String,

    /// Create the table and its idempotency index at startup if missing.
    #[serde(default = "default_true")]
    pub create_table: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            backend: SinkBackend::default(),
            upstream: UpstreamConfig::default(),
            table: default_table(),
            create_table: true,
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_identifier = !self.table.is_empty()
            && self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !self.table.starts_with(|c: char| c.is_ascii_digit());
        if !valid_identifier {
            return Err(ConfigError::Invalid(format!(
                "sink.table '{}' must be a plain SQL identifier",
                self.table
            )));
        }
        Ok(())
    }
}

/// Connection settings for the Postgres sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Environment variable holding the full connection URL. Highest precedence.
    #[serde(default = "default_database_url_env", skip_serializing_if = "Option::is_none")]
    pub database_url_env: Option<String>,

    /// Full connection URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    #[serde(default)]
    pub pool: ConnectionPoolConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            database_url_env: default_database_url_env(),
            database_url: None,
            host: default_host(),
            port: default_port(),
            database: default_database(),
            username: default_username(),
            password: None,
            password_env: None,
            pool: ConnectionPoolConfig::default(),
        }
    }
}

impl UpstreamConfig {
    /// Build a PostgreSQL connection string from this configuration.
    pub fn connection_string(&self) -> String {
        if let Some(env_var) = &self.database_url_env
            && let Ok(url) = std::env::var(env_var)
        {
            return url;
        }

        if let Some(url) = &self.database_url {
            return url.clone();
        }

        match self.password() {
            Some(password) => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.username, password, self.host, self.port, self.database
            ),
            None => format!(
                "postgresql://{}@{}:{}/{}",
                self.username, self.host, self.port, self.database
            ),
        }
    }

    fn password(&self) -> Option<String> {
        if let Some(env_var) = &self.password_env
            && let Ok(password) = std::env::var(env_var)
        {
            return Some(password);
        }
        self.password.clone()
    }
}

/// Connection pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a free connection.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u32,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_table() -> String {
    "audit_logs".to_string()
}

fn default_database_url_env() -> Option<String> {
    Some("DATABASE_URL".to_string())
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "audit_db".to_string()
}

fn default_username() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without_env() -> UpstreamConfig {
        UpstreamConfig {
            database_url_env: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_connection_string_from_fields() {
        let config = UpstreamConfig {
            host: "db".to_string(),
            database: "audit".to_string(),
            username: "writer".to_string(),
            password: Some("secret".to_string()),
            ..without_env()
        };
        assert_eq!(
            config.connection_string(),
            "postgresql://writer:secret@db:5432/audit"
        );
    }

    #[test]
    fn test_connection_string_direct_url_wins_over_fields() {
        let config = UpstreamConfig {
            database_url: Some("postgresql://a@b:1/c".to_string()),
            password: Some("ignored".to_string()),
            ..without_env()
        };
        assert_eq!(config.connection_string(), "postgresql://a@b:1/c");
    }

    #[test]
    fn test_connection_string_from_env() {
        // SAFETY: test-only variable name, not read concurrently elsewhere
        unsafe {
            std::env::set_var("QUILL_TEST_SINK_URL", "postgresql://env@host:1/db");
        }
        let config = UpstreamConfig {
            database_url_env: Some("QUILL_TEST_SINK_URL".to_string()),
            database_url: Some("postgresql://direct@host:1/db".to_string()),
            ..Default::default()
        };
        assert_eq!(config.connection_string(), "postgresql://env@host:1/db");
        // SAFETY: cleanup in test
        unsafe {
            std::env::remove_var("QUILL_TEST_SINK_URL");
        }
    }

    #[test]
    fn test_table_identifier_validation() {
        let mut config = SinkConfig::default();
        config.validate().unwrap();

        config.table = "audit_logs; DROP TABLE users".to_string();
        assert!(config.validate().is_err());

        config.table = "1audit".to_string();
        assert!(config.validate().is_err());
    }
}
