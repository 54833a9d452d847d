//! Workflow API endpoints
//!
//! All orchestration flows through OrchestratorActor; progress reads come
//! from the ledger and never touch the orchestrator.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::actors::ledger::LedgerMsg;
use crate::actors::orchestrator::{OrchestratorError, OrchestratorMsg};
use crate::api::ApiState;
use shared_types::{
    FailureKind, ProjectContext, StreamingMessage, WorkflowAccepted, WorkflowError,
    WorkflowSubmission,
};

/// Workflow error codes for machine-readable error responses
#[derive(Debug, Clone)]
pub enum WorkflowErrorCode {
    InvalidRequest,
    RunInFlight,
    SessionNotFound,
    OrchestratorUnavailable,
}

impl WorkflowErrorCode {
    fn as_str(&self) -> &'static str {
        match self {
            WorkflowErrorCode::InvalidRequest => "INVALID_REQUEST",
            WorkflowErrorCode::RunInFlight => "RUN_IN_FLIGHT",
            WorkflowErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            WorkflowErrorCode::OrchestratorUnavailable => "ORCHESTRATOR_UNAVAILABLE",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WorkflowErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            WorkflowErrorCode::RunInFlight => StatusCode::CONFLICT,
            WorkflowErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
            WorkflowErrorCode::OrchestratorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: WorkflowError,
}

fn workflow_error(
    code: WorkflowErrorCode,
    message: impl Into<String>,
    failure_kind: Option<FailureKind>,
) -> WorkflowError {
    WorkflowError {
        code: code.as_str().to_string(),
        message: message.into(),
        failure_kind,
    }
}

fn error_response(
    code: WorkflowErrorCode,
    message: impl Into<String>,
    failure_kind: Option<FailureKind>,
) -> (StatusCode, Json<ErrorResponse>) {
    let status = code.status_code();
    (
        status,
        Json(ErrorResponse {
            error: workflow_error(code, message, failure_kind),
        }),
    )
}

fn map_actor_error(err: OrchestratorError) -> (StatusCode, Json<ErrorResponse>) {
    let error = WorkflowError::from(err);
    let code = match error.code.as_str() {
        "RUN_IN_FLIGHT" => WorkflowErrorCode::RunInFlight,
        _ => WorkflowErrorCode::InvalidRequest,
    };
    (code.status_code(), Json(ErrorResponse { error }))
}

pub async fn submit_workflow(
    State(state): State<ApiState>,
    Json(submission): Json<WorkflowSubmission>,
) -> impl IntoResponse {
    if submission.session_id.trim().is_empty() {
        return error_response(
            WorkflowErrorCode::InvalidRequest,
            "session_id cannot be empty",
            Some(FailureKind::Validation),
        )
            .into_response();
    }
    if submission.raw_query.trim().is_empty() {
        return error_response(
            WorkflowErrorCode::InvalidRequest,
            "raw_query cannot be empty",
            Some(FailureKind::Validation),
        )
            .into_response();
    }

    let orchestrator = match state.app_state.ensure_orchestrator().await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            tracing::error!(error = %err, "Orchestrator unavailable");
            return error_response(
                WorkflowErrorCode::OrchestratorUnavailable,
                err,
                Some(FailureKind::Unknown),
            )
                .into_response();
        }
    };

    let result = ractor::call!(orchestrator, |reply| OrchestratorMsg::SubmitWorkflow {
        submission: submission.clone(),
        reply,
    });

    match result {
        Ok(Ok(accepted)) => accepted_response(accepted).into_response(),
        Ok(Err(actor_err)) => map_actor_error(actor_err).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Orchestrator call failed");
            error_response(
                WorkflowErrorCode::OrchestratorUnavailable,
                err.to_string(),
                Some(FailureKind::Unknown),
            )
                .into_response()
        }
    }
}

fn accepted_response(accepted: WorkflowAccepted) -> (StatusCode, Json<WorkflowAccepted>) {
    (StatusCode::ACCEPTED, Json(accepted))
}

pub async fn get_progress(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let ledger = state.app_state.ledger();
    let result = ractor::call!(ledger, |reply| LedgerMsg::GetMessage {
        session_id: session_id.clone(),
        reply,
    });

    match result {
        Ok(Some(message)) => progress_response(message).into_response(),
        Ok(None) => error_response(
            WorkflowErrorCode::SessionNotFound,
            format!("no record for session: {session_id}"),
            None,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Ledger call failed");
            error_response(
                WorkflowErrorCode::OrchestratorUnavailable,
                err.to_string(),
                Some(FailureKind::Unknown),
            )
                .into_response()
        }
    }
}

fn progress_response(message: StreamingMessage) -> (StatusCode, Json<StreamingMessage>) {
    let status = if message.response_complete {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(message))
}

#[derive(Debug, Serialize)]
struct ContextResponse {
    session_id: String,
    context: ProjectContext,
}

pub async fn get_context(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let orchestrator = match state.app_state.ensure_orchestrator().await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            return error_response(
                WorkflowErrorCode::OrchestratorUnavailable,
                err,
                Some(FailureKind::Unknown),
            )
                .into_response();
        }
    };

    let result = ractor::call!(orchestrator, |reply| OrchestratorMsg::GetContext {
        session_id: session_id.clone(),
        reply,
    });

    match result {
        Ok(Some(context)) => (
            StatusCode::OK,
            Json(ContextResponse {
                session_id,
                context,
            }),
        )
            .into_response(),
        Ok(None) => error_response(
            WorkflowErrorCode::SessionNotFound,
            format!("no context for session: {session_id}"),
            None,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Orchestrator call failed");
            error_response(
                WorkflowErrorCode::OrchestratorUnavailable,
                err.to_string(),
                Some(FailureKind::Unknown),
            )
                .into_response()
        }
    }
}
