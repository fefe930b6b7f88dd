// Route table for the Runlab API

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::health_check))
        .route("/submit", post(handlers::submit))
        .route("/enqueue", post(handlers::enqueue))
        .route("/validate", post(handlers::validate))
        .route("/sessions/:session_id/code", put(handlers::set_code))
        .route("/sessions/:session_id/tests", put(handlers::set_tests))
        .route("/sessions/:session_id/language", put(handlers::set_language))
        .route("/submission/:submission_id", get(handlers::get_submission))
        .route("/history", get(handlers::history))
        .route("/metrics", get(handlers::metrics_json))
        .route("/metrics/prometheus", get(handlers::metrics_prometheus))
}
