//! Dispatch execution for a single workflow run.
//!
//! Runs in a spawned task so the orchestrator actor stays responsive to
//! other sessions. All ledger writes here are best effort: a failed write
//! is logged and the run proceeds, because worker progress must never be
//! blocked on progress reporting.

use std::sync::Arc;

use chrono::Utc;
use ractor::ActorRef;
use shared_types::{ProjectContext, ThoughtStatus, ThoughtStep, WorkflowIntent};

use crate::actors::ledger::{LedgerMsg, StepPatch};
use crate::actors::orchestrator::actor::RunConfig;
use crate::actors::orchestrator::protocol::{OrchestratorMsg, RunOutcome, RunStatus};
use crate::workers::{ToolWorker, WorkerError, WorkerRegistry, WorkerSuccess};

const DISPATCH_STEP_INDEX: u32 = 1;

pub(super) struct DispatchTask {
    pub orchestrator: ActorRef<OrchestratorMsg>,
    pub ledger: ActorRef<LedgerMsg>,
    pub registry: Arc<WorkerRegistry>,
    pub config: RunConfig,
    pub session_id: String,
    pub run_id: String,
    pub intent: WorkflowIntent,
    pub context: Option<ProjectContext>,
}

impl DispatchTask {
    pub(super) async fn execute(self) {
        let started_at = Utc::now();
        ledger_append(
            &self.ledger,
            &self.session_id,
            ThoughtStep {
                index: DISPATCH_STEP_INDEX,
                action: format!("dispatch_{}", self.intent.intent_type.step_name()),
                reasoning: format!(
                    "Dispatching {} worker for the resolved intent",
                    self.intent.intent_type
                ),
                status: ThoughtStatus::InProgress,
                started_at,
                duration_ms: None,
                result_summary: None,
            },
        )
        .await;

        let (status, result, algorithm, error) = self.run_worker().await;
        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;

        let (step_status, summary) = match (&status, &result, &error) {
            (RunStatus::Failure, _, Some(err)) => (ThoughtStatus::Error, err.to_string()),
            (RunStatus::PartialFailure, Some(success), _) => (
                ThoughtStatus::Complete,
                format!("{} (degraded fidelity)", success.summary),
            ),
            (_, Some(success), _) => (ThoughtStatus::Complete, success.summary.clone()),
            _ => (ThoughtStatus::Error, "worker produced no result".to_string()),
        };
        ledger_update(
            &self.ledger,
            &self.session_id,
            DISPATCH_STEP_INDEX,
            StepPatch {
                status: Some(step_status),
                duration_ms: Some(duration_ms),
                result_summary: Some(summary),
            },
        )
        .await;

        let outcome = RunOutcome {
            session_id: self.session_id.clone(),
            run_id: self.run_id.clone(),
            intent: self.intent.clone(),
            status,
            result: result.map(|s| s.structured_result),
            algorithm,
            error,
        };
        if let Err(err) = self.orchestrator.cast(OrchestratorMsg::RunFinished { outcome }) {
            tracing::error!(
                session_id = %self.session_id,
                run_id = %self.run_id,
                error = %err,
                "Failed to deliver run outcome to orchestrator"
            );
        }
    }

    /// One primary attempt, one retry for transient failures, then the
    /// registered fallback. Logic failures abort immediately.
    async fn run_worker(
        &self,
    ) -> (
        RunStatus,
        Option<WorkerSuccess>,
        Option<String>,
        Option<WorkerError>,
    ) {
        let intent_type = self.intent.intent_type;
        let Some(worker) = self.registry.primary(intent_type) else {
            let err = WorkerError::Logic(format!("no worker registered for {intent_type}"));
            return (RunStatus::Failure, None, None, Some(err));
        };

        let first = self.invoke_with_timeout(worker.as_ref()).await;
        let primary_result = match first {
            Err(WorkerError::Transient(reason)) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    run_id = %self.run_id,
                    step = intent_type.step_name(),
                    reason = %reason,
                    "Transient worker failure; retrying once"
                );
                tokio::time::sleep(self.config.retry_backoff).await;
                self.invoke_with_timeout(worker.as_ref()).await
            }
            other => other,
        };

        match primary_result {
            Ok(success) => {
                let algorithm = success.algorithm.clone();
                (RunStatus::Success, Some(success), algorithm, None)
            }
            Err(err @ WorkerError::Logic(_)) => (RunStatus::Failure, None, None, Some(err)),
            Err(err @ WorkerError::Transient(_)) => match self.registry.fallback(intent_type) {
                Some(fallback) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        run_id = %self.run_id,
                        step = intent_type.step_name(),
                        "Retry exhausted; engaging fallback worker"
                    );
                    match self.invoke_with_timeout(fallback.as_ref()).await {
                        Ok(success) => {
                            let algorithm = success.algorithm.clone();
                            (RunStatus::PartialFailure, Some(success), algorithm, Some(err))
                        }
                        Err(fallback_err) => (RunStatus::Failure, None, None, Some(fallback_err)),
                    }
                }
                None => (RunStatus::Failure, None, None, Some(err)),
            },
        }
    }

    async fn invoke_with_timeout(
        &self,
        worker: &dyn ToolWorker,
    ) -> Result<WorkerSuccess, WorkerError> {
        match tokio::time::timeout(
            self.config.step_timeout,
            worker.invoke(&self.intent.parameters, self.context.as_ref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Transient(format!(
                "worker timed out after {:?}",
                self.config.step_timeout
            ))),
        }
    }
}

pub(super) async fn ledger_begin(ledger: &ActorRef<LedgerMsg>, session_id: &str, run_id: &str) {
    let call = ractor::call!(ledger, |reply| LedgerMsg::BeginRun {
        session_id: session_id.to_string(),
        run_id: run_id.to_string(),
        reply,
    });
    log_ledger_error(session_id, "begin_run", call);
}

pub(super) async fn ledger_append(
    ledger: &ActorRef<LedgerMsg>,
    session_id: &str,
    step: ThoughtStep,
) {
    let call = ractor::call!(ledger, |reply| LedgerMsg::AppendStep {
        session_id: session_id.to_string(),
        step: step.clone(),
        reply,
    });
    log_ledger_error(session_id, "append_step", call);
}

pub(super) async fn ledger_update(
    ledger: &ActorRef<LedgerMsg>,
    session_id: &str,
    index: u32,
    patch: StepPatch,
) {
    let call = ractor::call!(ledger, |reply| LedgerMsg::UpdateStep {
        session_id: session_id.to_string(),
        index,
        patch: patch.clone(),
        reply,
    });
    log_ledger_error(session_id, "update_step", call);
}

pub(super) async fn ledger_finalize(
    ledger: &ActorRef<LedgerMsg>,
    session_id: &str,
    artifacts: serde_json::Value,
) {
    let call = ractor::call!(ledger, |reply| LedgerMsg::FinalizeRun {
        session_id: session_id.to_string(),
        result_artifacts: Some(artifacts.clone()),
        reply,
    });
    log_ledger_error(session_id, "finalize_run", call);
}

fn log_ledger_error<T, E: std::fmt::Display>(
    session_id: &str,
    operation: &str,
    call: Result<Result<T, E>, ractor::RactorErr<LedgerMsg>>,
) {
    match call {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            tracing::warn!(session_id = %session_id, operation, error = %err, "Ledger write rejected")
        }
        Err(err) => {
            tracing::warn!(session_id = %session_id, operation, error = %err, "Ledger unreachable")
        }
    }
}
