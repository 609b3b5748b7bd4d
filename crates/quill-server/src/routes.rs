//! HTTP routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/log` | Submit one audit event |
//! | GET | `/health` | Liveness and sink name |
//! | GET | `/stats` | Pipeline counters |

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use quill_audit::{IngestError, IngestRequest, StatsSnapshot, Submission};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/log", post(submit_log))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body returned for rejected events.
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            IngestError::QueueFull { .. } | IngestError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_EVENT",
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.code, "message": self.message }));
        (self.status, body).into_response()
    }
}

async fn submit_log(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(request) = payload?;

    let message = match state.endpoint.submit_request(request)? {
        Submission::Accepted => "Audit log queued successfully",
        Submission::Filtered => "Audit log not captured by filter",
    };
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": message }))))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "service": "quill",
        "sink": state.sink,
        "queue_depth": state.endpoint.queue_depth(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.endpoint.stats())
}
