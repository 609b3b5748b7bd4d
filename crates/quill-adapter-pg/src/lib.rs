//! Postgres sink for the Quill audit pipeline.
//!
//! Each batch is written with multi-row `INSERT ... ON CONFLICT DO NOTHING`
//! statements inside one transaction, so a batch lands completely or not at
//! all, and re-sending a batch after an ambiguous failure adds no rows.

use std::time::Duration;

use async_trait::async_trait;
use quill_audit::{AuditEvent, DurableSink, SinkError};
use quill_core::SinkConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Columns written per event.
const COLUMNS: &[&str] = &[
    "event_id",
    "actor_id",
    "entity_name",
    "operation",
    "stage",
    "record_key",
    "captured_at",
    "changes",
];

/// Postgres caps bind parameters per statement at 65535.
const MAX_ROWS_PER_STATEMENT: usize = 65535 / COLUMNS.len();

pub struct PostgresSink {
    pool: PgPool,
    table: String,
}

impl PostgresSink {
    /// Build a sink from configuration.
    ///
    /// The pool connects lazily, so the pipeline can start while the
    /// database is still unreachable; writes then fail over to retries and
    /// the fallback log.
    pub fn connect(config: &SinkConfig) -> anyhow::Result<Self> {
        let upstream = &config.upstream;
        let pool = PgPoolOptions::new()
            .max_connections(upstream.pool.max_connections)
            .acquire_timeout(Duration::from_secs(u64::from(
                upstream.pool.acquire_timeout_seconds,
            )))
            .connect_lazy(&upstream.connection_string())?;
        Self::from_pool(pool, &config.table)
    }

    pub fn from_pool(pool: PgPool, table: &str) -> anyhow::Result<Self> {
        Ok(Self {
            pool,
            table: quote_ident(table)?,
        })
    }

    /// Create the audit table and its idempotency index if they are missing.
    pub async fn ensure_table(&self) -> anyhow::Result<()> {
        let index = quote_ident(&format!("{}_idempotency", self.table.trim_matches('"')))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                event_id UUID NOT NULL,
                actor_id TEXT NOT NULL,
                entity_name TEXT NOT NULL,
                operation TEXT NOT NULL,
                stage TEXT,
                record_key TEXT NOT NULL,
                captured_at TIMESTAMPTZ NOT NULL,
                changes TEXT,
                written_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} \
             (entity_name, record_key, captured_at, operation, COALESCE(stage, ''))",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        tracing::info!(table = %self.table, "audit table ready");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_batch(&self, batch: &[AuditEvent]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for chunk in batch.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}) ",
                self.table,
                COLUMNS.join(", ")
            ));
            builder.push_values(chunk, |mut row, event| {
                row.push_bind(event.event_id())
                    .push_bind(event.actor_id())
                    .push_bind(event.entity_name())
                    .push_bind(event.operation().as_str())
                    .push_bind(event.stage().map(|stage| stage.as_str()))
                    .push_bind(event.record_key())
                    .push_bind(event.captured_at())
                    .push_bind(event.changes());
            });
            builder.push(" ON CONFLICT DO NOTHING");
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await
    }
}

#[async_trait]
impl DurableSink for PostgresSink {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn bulk_write(&self, batch: &[AuditEvent]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.insert_batch(batch).await.map_err(classify)
    }
}

/// Map a driver error onto the retry classification.
///
/// Data exceptions (SQLSTATE class 22), integrity violations (23) and
/// syntax or access errors (42) will fail the same way on every attempt.
pub fn classify(error: sqlx::Error) -> SinkError {
    match &error {
        sqlx::Error::Database(db) => {
            let class = db.code().map(|code| code.chars().take(2).collect::<String>());
            match class.as_deref() {
                Some("22" | "23" | "42") => SinkError::Rejected(error.to_string()),
                _ => SinkError::Unavailable(error.to_string()),
            }
        }
        sqlx::Error::Encode(_) | sqlx::Error::TypeNotFound { .. } => {
            SinkError::Rejected(error.to_string())
        }
        _ => SinkError::Unavailable(error.to_string()),
    }
}

fn quote_ident(ident: &str) -> anyhow::Result<String> {
    if ident.is_empty() {
        return Err(anyhow::anyhow!("empty identifier"));
    }
    if !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(anyhow::anyhow!("invalid identifier '{}'", ident));
    }
    Ok(format!("\"{}\"", ident))
}
