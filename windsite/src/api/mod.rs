//! HTTP API routes for the siting workflow service.
//!
//! Stateless HTTP access to the actor system: query submission goes to the
//! orchestrator, progress reads go straight to the ledger.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub mod workflow;

use crate::app_state::AppState;

#[derive(Clone)]
pub struct ApiState {
    pub app_state: Arc<AppState>,
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/workflow/submit", post(workflow::submit_workflow))
        .route(
            "/workflow/sessions/{session_id}/progress",
            get(workflow::get_progress),
        )
        .route(
            "/workflow/sessions/{session_id}/context",
            get(workflow::get_context),
        )
}

pub async fn health_check(State(_state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
