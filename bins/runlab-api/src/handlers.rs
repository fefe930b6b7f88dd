// HTTP route handlers for the Runlab API

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use runlab_common::language::Language;
use runlab_common::types::{SubmitOptions, TestCase};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub session_id: String,
    /// Replaces the session's code before submitting when present.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub options: Option<SubmitOptions>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub session_id: String,
    pub queue_depth: usize,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub session_id: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SetCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SetLanguageRequest {
    pub language: Language,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// POST /submit - Run a submission and wait for its outcome
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> impl IntoResponse {
    if let Some(code) = payload.code {
        state.code.set_code(&payload.session_id, code);
    }

    let outcome = state
        .orchestrator
        .submit(&payload.session_id, payload.options)
        .await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(outcome))
}

/// POST /enqueue - Defer a submission to the next batch drain
pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> impl IntoResponse {
    if let Some(code) = payload.code {
        state.code.set_code(&payload.session_id, code);
    }

    let queue_depth = state
        .batcher
        .enqueue(&payload.session_id, payload.options.unwrap_or_default());
    info!(session_id = %payload.session_id, queue_depth = queue_depth, "Submission queued");

    (
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            session_id: payload.session_id,
            queue_depth,
        }),
    )
}

/// POST /validate - Local heuristics merged with the remote check
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ValidateRequest>,
) -> impl IntoResponse {
    let report = state
        .validation
        .validate(&payload.session_id, &payload.code)
        .await;
    (StatusCode::OK, Json(report))
}

/// PUT /sessions/{session_id}/code
pub async fn set_code(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<SetCodeRequest>,
) -> impl IntoResponse {
    state.code.set_code(&session_id, payload.code);
    StatusCode::NO_CONTENT
}

/// PUT /sessions/{session_id}/tests
pub async fn set_tests(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(cases): Json<Vec<TestCase>>,
) -> impl IntoResponse {
    info!(session_id = %session_id, test_cases = cases.len(), "Test cases updated");
    state.tests.set_test_cases(&session_id, cases);
    StatusCode::NO_CONTENT
}

/// PUT /sessions/{session_id}/language
pub async fn set_language(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<SetLanguageRequest>,
) -> impl IntoResponse {
    state
        .orchestrator
        .client()
        .set_session_language(&session_id, payload.language);
    StatusCode::NO_CONTENT
}

/// GET /submission/{submission_id} - In-flight or historical record
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> impl IntoResponse {
    let id = match Uuid::parse_str(&submission_id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Invalid submission ID format"
                })),
            )
                .into_response();
        }
    };

    match state.orchestrator.get_submission(&id) {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "submission_id": submission_id,
                "error": "Submission not found"
            })),
        )
            .into_response(),
    }
}

/// GET /history?limit=N - Most recent finished submissions, newest first
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    Json(state.orchestrator.history().recent(query.limit))
}

/// GET /metrics - JSON snapshot
pub async fn metrics_json(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.metrics().snapshot())
}

/// GET /metrics/prometheus - Prometheus text exposition
pub async fn metrics_prometheus(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.orchestrator.metrics().snapshot();
    match metrics::render(&snapshot) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
