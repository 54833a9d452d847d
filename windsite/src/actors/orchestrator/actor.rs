//! OrchestratorActor state and message handling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use shared_types::{
    ProjectContext, ThoughtStatus, ThoughtStep, WorkflowAccepted, WorkflowSubmission,
};

use crate::actors::ledger::LedgerMsg;
use crate::actors::orchestrator::protocol::{
    OrchestratorError, OrchestratorMsg, RunOutcome, RunStatus,
};
use crate::actors::orchestrator::run;
use crate::intent;
use crate::workers::WorkerRegistry;

#[derive(Debug, Default)]
pub struct OrchestratorActor;

/// Per-step execution budgets. Tests shrink these to keep retries fast.
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Wall-clock budget for one worker call; expiry counts as a transient
    /// failure eligible for the single retry.
    pub step_timeout: Duration,
    /// Base delay for the exponential backoff before the retry.
    pub retry_backoff: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

pub struct OrchestratorArguments {
    pub ledger: ActorRef<LedgerMsg>,
    pub registry: Arc<WorkerRegistry>,
    pub config: RunConfig,
}

#[derive(Debug, Default)]
struct SessionEntry {
    context: Option<ProjectContext>,
    in_flight: bool,
}

pub struct OrchestratorState {
    ledger: ActorRef<LedgerMsg>,
    registry: Arc<WorkerRegistry>,
    config: RunConfig,
    sessions: HashMap<String, SessionEntry>,
}

impl OrchestratorActor {
    async fn handle_submit(
        &self,
        myself: &ActorRef<OrchestratorMsg>,
        state: &mut OrchestratorState,
        submission: WorkflowSubmission,
    ) -> Result<WorkflowAccepted, OrchestratorError> {
        if submission.session_id.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "session_id cannot be empty".to_string(),
            ));
        }

        let session_id = submission.session_id.clone();
        let entry = state.sessions.entry(session_id.clone()).or_default();
        if entry.in_flight {
            return Err(OrchestratorError::RunInFlight(session_id));
        }

        // A client-supplied context seeds a session that has none of its
        // own (e.g. resuming an established project on a fresh session).
        if entry.context.is_none() {
            entry.context = submission.prior_context.clone();
        }

        let run_id = ulid::Ulid::new().to_string();
        tracing::info!(
            session_id = %session_id,
            run_id = %run_id,
            query = %submission.raw_query,
            "Workflow run received; validating"
        );

        let classify_started = Utc::now();
        let resolved = intent::resolve(&submission.raw_query, entry.context.as_ref());
        let classify_ms = (Utc::now() - classify_started).num_milliseconds().max(0) as u64;

        run::ledger_begin(&state.ledger, &session_id, &run_id).await;

        match resolved {
            Err(validation) => {
                // VALIDATING -> FAILURE -> COMPLETE, no dispatch.
                run::ledger_append(
                    &state.ledger,
                    &session_id,
                    ThoughtStep {
                        index: 0,
                        action: "classify_intent".to_string(),
                        reasoning: "Classifying query into a workflow intent".to_string(),
                        status: ThoughtStatus::Error,
                        started_at: classify_started,
                        duration_ms: Some(classify_ms),
                        result_summary: Some(validation.to_string()),
                    },
                )
                .await;
                run::ledger_finalize(
                    &state.ledger,
                    &session_id,
                    serde_json::json!({
                        "status": RunStatus::Failure.as_str(),
                        "error": shared_types::WorkflowError::from(
                            OrchestratorError::Validation(validation.clone())
                        ),
                    }),
                )
                .await;
                tracing::warn!(
                    session_id = %session_id,
                    run_id = %run_id,
                    error = %validation,
                    "Workflow run failed validation"
                );
                Err(OrchestratorError::Validation(validation))
            }
            Ok(workflow_intent) => {
                run::ledger_append(
                    &state.ledger,
                    &session_id,
                    ThoughtStep {
                        index: 0,
                        action: "classify_intent".to_string(),
                        reasoning: "Classifying query into a workflow intent".to_string(),
                        status: ThoughtStatus::Complete,
                        started_at: classify_started,
                        duration_ms: Some(classify_ms),
                        result_summary: Some(workflow_intent.intent_type.to_string()),
                    },
                )
                .await;

                entry.in_flight = true;
                let context = entry.context.clone();
                let task = run::DispatchTask {
                    orchestrator: myself.clone(),
                    ledger: state.ledger.clone(),
                    registry: state.registry.clone(),
                    config: state.config,
                    session_id: session_id.clone(),
                    run_id: run_id.clone(),
                    intent: workflow_intent,
                    context,
                };
                tokio::spawn(task.execute());

                Ok(WorkflowAccepted {
                    accepted: true,
                    session_id,
                    run_id,
                    error: None,
                })
            }
        }
    }

    async fn handle_run_finished(&self, state: &mut OrchestratorState, outcome: RunOutcome) {
        let entry = state.sessions.entry(outcome.session_id.clone()).or_default();
        entry.in_flight = false;

        if let Some(result) = &outcome.result {
            let context = entry.context.get_or_insert_with(|| {
                // First successful step establishes the project from the
                // resolved coordinates.
                let latitude = outcome
                    .intent
                    .parameters
                    .get("latitude")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0);
                let longitude = outcome
                    .intent
                    .parameters
                    .get("longitude")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0);
                ProjectContext::new(latitude, longitude)
            });
            context.merge_step(outcome.intent.intent_type, result.clone());
        }

        let artifacts = serde_json::json!({
            "status": outcome.status.as_str(),
            "step": outcome.intent.intent_type.step_name(),
            "algorithm": outcome.algorithm,
            "result": outcome.result,
            "error": outcome.error.as_ref().map(|e| {
                shared_types::WorkflowError {
                    code: "WORKER_FAILED".to_string(),
                    message: e.to_string(),
                    failure_kind: Some(if e.is_transient() {
                        shared_types::FailureKind::Transient
                    } else {
                        shared_types::FailureKind::Logic
                    }),
                }
            }),
        });
        run::ledger_finalize(&state.ledger, &outcome.session_id, artifacts).await;

        tracing::info!(
            session_id = %outcome.session_id,
            run_id = %outcome.run_id,
            status = outcome.status.as_str(),
            step = outcome.intent.intent_type.step_name(),
            "Workflow run complete"
        );
    }
}

#[async_trait]
impl Actor for OrchestratorActor {
    type Msg = OrchestratorMsg;
    type State = OrchestratorState;
    type Arguments = OrchestratorArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(actor_id = %myself.get_id(), "OrchestratorActor starting");
        Ok(OrchestratorState {
            ledger: args.ledger,
            registry: args.registry,
            config: args.config,
            sessions: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            OrchestratorMsg::SubmitWorkflow { submission, reply } => {
                let result = self.handle_submit(&myself, state, submission).await;
                let _ = reply.send(result);
            }
            OrchestratorMsg::RunFinished { outcome } => {
                self.handle_run_finished(state, outcome).await;
            }
            OrchestratorMsg::GetContext { session_id, reply } => {
                let context = state
                    .sessions
                    .get(&session_id)
                    .and_then(|entry| entry.context.clone());
                let _ = reply.send(context);
            }
        }
        Ok(())
    }
}
