//! Audit event types.
//!
//! An [`AuditEvent`] describes one mutation of one record. Events are built
//! once by the producer and never modified afterwards; they move by value
//! through the queue into a batch.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ValidationError::UnknownOperation(s.to_string())),
        }
    }
}

/// Whether the event was captured before or after the mutation committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Before,
    After,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BEFORE" => Ok(Self::Before),
            "AFTER" => Ok(Self::After),
            _ => Err(ValidationError::UnknownStage(s.to_string())),
        }
    }
}

/// An audit event.
///
/// `actor_id`, `entity_name`, `operation` and `record_key` are required;
/// `stage` and `changes` are optional. Use [`AuditEvent::validate`] before
/// handing an event to the pipeline (the ingest endpoint does this).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    event_id: Uuid,
    actor_id: String,
    entity_name: String,
    operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
    record_key: String,
    captured_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    changes: Option<String>,
}

impl AuditEvent {
    /// Actor recorded when no authenticated principal is available.
    pub const UNKNOWN_ACTOR: &'static str = "unknown";

    /// Create an event captured now.
    pub fn new(
        actor_id: impl Into<String>,
        entity_name: impl Into<String>,
        operation: Operation,
        record_key: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            actor_id: actor_id.into(),
            entity_name: entity_name.into(),
            operation,
            stage: None,
            record_key: record_key.into(),
            captured_at: Utc::now(),
            changes: None,
        }
    }

    /// Create a builder for an audit event.
    pub fn builder(
        actor_id: impl Into<String>,
        entity_name: impl Into<String>,
        operation: Operation,
        record_key: impl Into<String>,
    ) -> AuditEventBuilder {
        AuditEventBuilder {
            event: Self::new(actor_id, entity_name, operation, record_key),
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub fn record_key(&self) -> &str {
        &self.record_key
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn changes(&self) -> Option<&str> {
        self.changes.as_deref()
    }

    /// Check that every required field is present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.actor_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("actor_id"));
        }
        if self.entity_name.trim().is_empty() {
            return Err(ValidationError::EmptyField("entity_name"));
        }
        if self.record_key.trim().is_empty() {
            return Err(ValidationError::EmptyField("record_key"));
        }
        Ok(())
    }

    /// Fields that identify the same mutation across retries.
    pub fn idempotency_key(&self) -> (&str, &str, DateTime<Utc>, Operation) {
        (
            &self.entity_name,
            &self.record_key,
            self.captured_at,
            self.operation,
        )
    }

    /// Format the event as a human-readable log line.
    ///
    /// Format: `[timestamp] OPERATION entity=... key=... actor=... [stage=...]`
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "[{}] {} entity={} key={} actor={}",
            self.captured_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.operation,
            self.entity_name,
            self.record_key,
            self.actor_id,
        );

        if let Some(stage) = self.stage {
            line.push_str(&format!(" stage={}", stage));
        }

        if let Some(ref changes) = self.changes {
            // Truncate long payloads for console output
            let preview: String = changes.chars().take(100).collect();
            let ellipsis = if preview.len() < changes.len() { "..." } else { "" };
            line.push_str(&format!(
                " changes=\"{}{}\"",
                preview.replace('\n', " ").replace('"', "'"),
                ellipsis
            ));
        }

        line
    }
}

/// Builder for creating audit events.
#[derive(Debug)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    /// Set the capture stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.event.stage = Some(stage);
        self
    }

    /// Set a pre-serialized changes payload.
    pub fn changes(mut self, changes: impl Into<String>) -> Self {
        self.event.changes = Some(changes.into());
        self
    }

    /// Serialize field values as a JSON object with sorted keys.
    pub fn changes_from_fields(mut self, fields: &BTreeMap<String, String>) -> Self {
        // A map of strings always serializes
        self.event.changes = serde_json::to_string(fields).ok();
        self
    }

    /// Override the capture time (replay, producer-supplied timestamps).
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.event.captured_at = at;
        self
    }

    /// Build the audit event.
    pub fn build(self) -> AuditEvent {
        self.event
    }
}

/// Event as submitted over the wire.
///
/// Accepts the canonical field names as well as the names used by older
/// producers (`user_id`, `tablename`, `audit_stage`, `record_id`,
/// `timestamp`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default, alias = "user_id")]
    pub actor_id: Option<String>,

    #[serde(default, alias = "tablename")]
    pub entity_name: String,

    #[serde(default)]
    pub operation: String,

    #[serde(default, alias = "audit_stage")]
    pub stage: Option<String>,

    #[serde(default, alias = "record_id")]
    pub record_key: String,

    /// RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
    #[serde(default, alias = "timestamp")]
    pub captured_at: Option<String>,

    /// Either a string or any JSON value (stored serialized).
    #[serde(default)]
    pub changes: Option<serde_json::Value>,
}

impl IngestRequest {
    /// Convert to an event, applying defaults and validating.
    pub fn into_event(self) -> Result<AuditEvent, ValidationError> {
        let actor_id = self
            .actor_id
            .filter(|actor| !actor.trim().is_empty())
            .unwrap_or_else(|| AuditEvent::UNKNOWN_ACTOR.to_string());
        let operation: Operation = self.operation.parse()?;

        let mut builder =
            AuditEvent::builder(actor_id, self.entity_name, operation, self.record_key);

        if let Some(stage) = self.stage.filter(|s| !s.trim().is_empty()) {
            builder = builder.stage(stage.parse()?);
        }
        if let Some(raw) = self.captured_at.filter(|s| !s.trim().is_empty()) {
            builder = builder.captured_at(parse_timestamp(&raw)?);
        }
        match self.changes {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::String(s)) => builder = builder.changes(s),
            Some(other) => builder = builder.changes(other.to_string()),
        }

        let event = builder.build();
        event.validate()?;
        Ok(event)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| ValidationError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_builder() {
        let event = AuditEvent::builder("user:42", "orders", Operation::Update, "id=7")
            .stage(Stage::After)
            .changes("{\"status\":\"shipped\"}")
            .build();

        assert_eq!(event.actor_id(), "user:42");
        assert_eq!(event.entity_name(), "orders");
        assert_eq!(event.operation(), Operation::Update);
        assert_eq!(event.stage(), Some(Stage::After));
        assert_eq!(event.record_key(), "id=7");
        assert_eq!(event.changes(), Some("{\"status\":\"shipped\"}"));
        event.validate().unwrap();
    }

    #[test]
    fn test_validate_required_fields() {
        let event = AuditEvent::new("", "orders", Operation::Insert, "id=1");
        assert_eq!(event.validate(), Err(ValidationError::EmptyField("actor_id")));

        let event = AuditEvent::new("u", "  ", Operation::Insert, "id=1");
        assert_eq!(event.validate(), Err(ValidationError::EmptyField("entity_name")));

        let event = AuditEvent::new("u", "orders", Operation::Insert, "");
        assert_eq!(event.validate(), Err(ValidationError::EmptyField("record_key")));

        let event = AuditEvent::new("u", "orders", Operation::Insert, " \t");
        assert_eq!(event.validate(), Err(ValidationError::EmptyField("record_key")));
    }

    #[test]
    fn test_changes_from_fields_is_sorted_json() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), "Ada".to_string());
        fields.insert("email".to_string(), "ada@example.com".to_string());

        let event = AuditEvent::builder("u", "users", Operation::Insert, "id=1")
            .changes_from_fields(&fields)
            .build();
        assert_eq!(
            event.changes(),
            Some(r#"{"email":"ada@example.com","name":"Ada"}"#)
        );
    }

    #[test]
    fn test_serialized_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let event = AuditEvent::builder("u", "users", Operation::Delete, "id=1")
            .captured_at(at)
            .build();
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["operation"], "DELETE");
        assert_eq!(json["captured_at"], "2024-05-01T12:00:00Z");
        assert!(json.get("stage").is_none());
        assert!(json.get("changes").is_none());

        let back: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn audit_event_serialization_validates_against_schema() {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), "draft".to_string());
        let events = [
            AuditEvent::new("unknown", "chat_session", Operation::Insert, "id=1"),
            AuditEvent::builder("user:7", "chat_session", Operation::Update, "id=1")
                .stage(Stage::Before)
                .changes_from_fields(&fields)
                .build(),
        ];

        let schema: serde_json::Value =
            serde_json::from_str(include_str!("../../../schemas/AuditEvent.schema.json"))
                .expect("schema must parse");
        let validator = jsonschema::draft202012::options()
            .build(&schema)
            .expect("schema must compile");

        for event in &events {
            let instance = serde_json::to_value(event).expect("audit event must serialize");
            if !validator.is_valid(&instance) {
                let msgs: Vec<String> = validator
                    .iter_errors(&instance)
                    .take(20)
                    .map(|err| err.to_string())
                    .collect();
                panic!("audit event did not validate: {}", msgs.join("; "));
            }
        }

        let mut missing_key = serde_json::to_value(&events[0]).unwrap();
        missing_key["record_key"] = serde_json::Value::String(String::new());
        assert!(!validator.is_valid(&missing_key));
    }

    #[test]
    fn test_to_log_line() {
        let event = AuditEvent::builder("admin", "customers", Operation::Update, "id=1")
            .stage(Stage::Before)
            .changes("x".repeat(150))
            .build();

        let line = event.to_log_line();
        assert!(line.contains("UPDATE"));
        assert!(line.contains("entity=customers"));
        assert!(line.contains("key=id=1"));
        assert!(line.contains("actor=admin"));
        assert!(line.contains("stage=BEFORE"));
        assert!(line.ends_with("...\""));
    }

    #[test]
    fn test_ingest_request_legacy_names() {
        let request: IngestRequest = serde_json::from_str(
            r#"{
                "user_id": "7",
                "tablename": "chat_session",
                "operation": "update",
                "audit_stage": "after",
                "record_id": "id=12",
                "timestamp": "2024-03-05T10:11:12.345678",
                "changes": "{\"title\": \"x\"}"
            }"#,
        )
        .unwrap();
        let event = request.into_event().unwrap();

        assert_eq!(event.actor_id(), "7");
        assert_eq!(event.entity_name(), "chat_session");
        assert_eq!(event.operation(), Operation::Update);
        assert_eq!(event.stage(), Some(Stage::After));
        assert_eq!(event.record_key(), "id=12");
        assert_eq!(
            event.captured_at().to_rfc3339(),
            "2024-03-05T10:11:12.345678+00:00"
        );
        assert_eq!(event.changes(), Some("{\"title\": \"x\"}"));
    }

    #[test]
    fn test_ingest_request_defaults() {
        let request: IngestRequest = serde_json::from_str(
            r#"{"entity_name": "users", "operation": "INSERT", "record_key": "id=1",
                "changes": {"name": "Ada"}}"#,
        )
        .unwrap();
        let event = request.into_event().unwrap();

        assert_eq!(event.actor_id(), AuditEvent::UNKNOWN_ACTOR);
        assert_eq!(event.stage(), None);
        assert_eq!(event.changes(), Some(r#"{"name":"Ada"}"#));
    }

    #[test]
    fn test_ingest_request_rejections() {
        let missing_entity = IngestRequest {
            operation: "INSERT".into(),
            record_key: "id=1".into(),
            ..Default::default()
        };
        assert_eq!(
            missing_entity.into_event().unwrap_err(),
            ValidationError::EmptyField("entity_name")
        );

        let bad_operation = IngestRequest {
            entity_name: "users".into(),
            operation: "UPSERT".into(),
            record_key: "id=1".into(),
            ..Default::default()
        };
        assert!(matches!(
            bad_operation.into_event(),
            Err(ValidationError::UnknownOperation(_))
        ));

        let bad_time = IngestRequest {
            entity_name: "users".into(),
            operation: "INSERT".into(),
            record_key: "id=1".into(),
            captured_at: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(
            bad_time.into_event(),
            Err(ValidationError::InvalidTimestamp(_))
        ));
    }
}
