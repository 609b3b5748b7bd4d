//! Integration tests for the Postgres sink.
//!
//! These tests require a running Postgres instance.
//! Set the DATABASE_URL environment variable to connect; without it every
//! test returns early.
//!
//! Run with: cargo test --package quill-adapter-pg --test postgres_sink -- --test-threads=1

use chrono::{TimeZone, Utc};
use quill_adapter_pg::PostgresSink;
use quill_audit::{AuditEvent, DurableSink, Operation, Stage};
use sqlx::PgPool;

async fn sink_for(table: &str) -> Option<(PostgresSink, PgPool)> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping Postgres sink test");
            return None;
        }
    };

    let pool = PgPool::connect(&url).await.expect("connect to DATABASE_URL");
    sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
        .execute(&pool)
        .await
        .unwrap();

    let sink = PostgresSink::from_pool(pool.clone(), table).unwrap();
    sink.ensure_table().await.unwrap();
    Some((sink, pool))
}

fn events() -> Vec<AuditEvent> {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    vec![
        AuditEvent::builder("user:1", "chat_session", Operation::Insert, "id=1")
            .captured_at(at)
            .changes(r#"{"title":"hello"}"#)
            .build(),
        AuditEvent::builder("user:1", "chat_session", Operation::Update, "id=1")
            .stage(Stage::Before)
            .captured_at(at)
            .build(),
        AuditEvent::builder("unknown", "chat_message", Operation::Delete, "id=9")
            .captured_at(at)
            .build(),
    ]
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT count(*) FROM \"{table}\""))
        .fetch_one(pool)
        .await
        .unwrap();
    n
}

#[tokio::test]
async fn test_bulk_write_inserts_batch() {
    let Some((sink, pool)) = sink_for("quill_test_bulk_write").await else {
        return;
    };

    sink.bulk_write(&events()).await.unwrap();
    assert_eq!(count(&pool, "quill_test_bulk_write").await, 3);

    let (operation, stage, changes): (String, Option<String>, Option<String>) = sqlx::query_as(
        "SELECT operation, stage, changes FROM \"quill_test_bulk_write\" ORDER BY id LIMIT 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(operation, "INSERT");
    assert_eq!(stage, None);
    assert_eq!(changes.as_deref(), Some(r#"{"title":"hello"}"#));
}

#[tokio::test]
async fn test_rewriting_a_batch_adds_no_rows() {
    let Some((sink, pool)) = sink_for("quill_test_idempotent").await else {
        return;
    };

    let batch = events();
    sink.bulk_write(&batch).await.unwrap();
    sink.bulk_write(&batch).await.unwrap();

    assert_eq!(count(&pool, "quill_test_idempotent").await, 3);
}

#[tokio::test]
async fn test_long_identifiers_are_stored() {
    let Some((sink, pool)) = sink_for("quill_test_long_values").await else {
        return;
    };

    let actor = "a".repeat(1024);
    let entity = "e".repeat(300);
    let batch = vec![
        AuditEvent::new(actor.clone(), entity.clone(), Operation::Insert, "id=1"),
        AuditEvent::new("user:2", "chat_session", Operation::Insert, "id=2"),
    ];
    sink.bulk_write(&batch).await.unwrap();

    assert_eq!(count(&pool, "quill_test_long_values").await, 2);
    let (stored,): (String,) = sqlx::query_as(
        "SELECT actor_id FROM \"quill_test_long_values\" WHERE record_key = 'id=1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored, actor);
}
