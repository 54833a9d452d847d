//! OrchestratorActor message protocol and error types.

use ractor::RpcReplyPort;
use shared_types::{ProjectContext, WorkflowAccepted, WorkflowIntent, WorkflowSubmission};

use crate::intent::ValidationError;
use crate::workers::WorkerError;

/// Terminal disposition of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Primary worker unreachable; the degraded fallback produced the
    /// result. Output carries a fidelity marker.
    PartialFailure,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::Failure => "failure",
        }
    }
}

/// Result of a dispatched run, sent back to the actor as a self-message.
#[derive(Debug)]
pub struct RunOutcome {
    pub session_id: String,
    pub run_id: String,
    pub intent: WorkflowIntent,
    pub status: RunStatus,
    /// Structured result to merge into context on success/partial success.
    pub result: Option<serde_json::Value>,
    /// Fidelity marker reported by the worker, e.g. "grid".
    pub algorithm: Option<String>,
    pub error: Option<WorkerError>,
}

/// Messages handled by OrchestratorActor.
#[derive(Debug)]
pub enum OrchestratorMsg {
    /// Submit a workflow run. Replies as soon as classification finished and
    /// the first thought step was written; dispatch continues asynchronously.
    SubmitWorkflow {
        submission: WorkflowSubmission,
        reply: RpcReplyPort<Result<WorkflowAccepted, OrchestratorError>>,
    },
    /// Internal: a dispatched run finished; merge and finalize.
    RunFinished { outcome: RunOutcome },
    /// Current accumulated context for a session.
    GetContext {
        session_id: String,
        reply: RpcReplyPort<Option<ProjectContext>>,
    },
}

/// Errors surfaced at submission time. Dispatch-time failures are reported
/// through the ledger, not through this enum.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A run for this session has not reached COMPLETE yet. Submissions are
    /// rejected rather than queued so a follow-up query always classifies
    /// against the finished run's merged context.
    #[error("a workflow run is already in flight for session: {0}")]
    RunInFlight(String),
}

impl From<OrchestratorError> for shared_types::WorkflowError {
    fn from(err: OrchestratorError) -> Self {
        let code = match &err {
            OrchestratorError::InvalidRequest(_) => "INVALID_REQUEST",
            OrchestratorError::Validation(_) => "INVALID_REQUEST",
            OrchestratorError::RunInFlight(_) => "RUN_IN_FLIGHT",
        };
        shared_types::WorkflowError {
            code: code.to_string(),
            message: err.to_string(),
            failure_kind: Some(shared_types::FailureKind::Validation),
        }
    }
}
