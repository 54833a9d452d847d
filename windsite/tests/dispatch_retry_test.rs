//! Dispatch contract tests: retry, fallback, and in-flight rejection.
//!
//! Drives the orchestrator actor directly with scripted workers so failure
//! counts are exact.

use async_trait::async_trait;
use ractor::Actor;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shared_types::{IntentType, ProjectContext, WorkflowSubmission};
use windsite::actors::ledger::{LedgerActor, LedgerArguments, LedgerMsg};
use windsite::actors::orchestrator::{
    OrchestratorActor, OrchestratorArguments, OrchestratorError, OrchestratorMsg, RunConfig,
};
use windsite::workers::{ToolWorker, WorkerError, WorkerRegistry, WorkerSuccess};

/// Worker that fails transiently a scripted number of times, then succeeds.
struct FlakyWorker {
    intent_type: IntentType,
    failures_before_success: u32,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ToolWorker for FlakyWorker {
    fn intent_type(&self) -> IntentType {
        self.intent_type
    }

    async fn invoke(
        &self,
        _parameters: &Map<String, Value>,
        _context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            Err(WorkerError::Transient("upstream unavailable".to_string()))
        } else {
            Ok(WorkerSuccess {
                structured_result: json!({ "call": call }),
                algorithm: None,
                summary: "flaky worker succeeded".to_string(),
            })
        }
    }
}

/// Worker that always fails with a non-retryable error.
struct BrokenWorker {
    intent_type: IntentType,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ToolWorker for BrokenWorker {
    fn intent_type(&self) -> IntentType {
        self.intent_type
    }

    async fn invoke(
        &self,
        _parameters: &Map<String, Value>,
        _context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(WorkerError::Logic("unusable input".to_string()))
    }
}

/// Fallback that always succeeds with a reduced-fidelity marker.
struct SimpleFallback {
    intent_type: IntentType,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ToolWorker for SimpleFallback {
    fn intent_type(&self) -> IntentType {
        self.intent_type
    }

    async fn invoke(
        &self,
        _parameters: &Map<String, Value>,
        _context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(WorkerSuccess {
            structured_result: json!({ "fallback": true }),
            algorithm: Some("grid".to_string()),
            summary: "fallback placement".to_string(),
        })
    }
}

/// Worker that blocks until told to finish, for in-flight checks.
struct SlowWorker {
    intent_type: IntentType,
    delay: Duration,
}

#[async_trait]
impl ToolWorker for SlowWorker {
    fn intent_type(&self) -> IntentType {
        self.intent_type
    }

    async fn invoke(
        &self,
        _parameters: &Map<String, Value>,
        _context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError> {
        tokio::time::sleep(self.delay).await;
        Ok(WorkerSuccess {
            structured_result: json!({}),
            algorithm: None,
            summary: "slow worker done".to_string(),
        })
    }
}

struct Harness {
    orchestrator: ractor::ActorRef<OrchestratorMsg>,
    ledger: ractor::ActorRef<LedgerMsg>,
    _temp_dir: tempfile::TempDir,
}

async fn setup(registry: WorkerRegistry) -> Harness {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let (ledger, _handle) = Actor::spawn(
        None,
        LedgerActor,
        LedgerArguments {
            data_dir: temp_dir.path().to_path_buf(),
        },
    )
    .await
    .expect("Failed to create ledger");

    let (orchestrator, _handle) = Actor::spawn(
        None,
        OrchestratorActor,
        OrchestratorArguments {
            ledger: ledger.clone(),
            registry: Arc::new(registry),
            config: RunConfig {
                step_timeout: Duration::from_secs(2),
                retry_backoff: Duration::from_millis(5),
            },
        },
    )
    .await
    .expect("Failed to create orchestrator");

    Harness {
        orchestrator,
        ledger,
        _temp_dir: temp_dir,
    }
}

fn submission(session_id: &str) -> WorkflowSubmission {
    WorkflowSubmission {
        session_id: session_id.to_string(),
        user_id: "test-user".to_string(),
        raw_query: "analyze terrain at 32.7767, -96.7970".to_string(),
        prior_context: None,
    }
}

async fn wait_for_artifacts(harness: &Harness, session_id: &str) -> Value {
    for _ in 0..200 {
        let message = ractor::call!(harness.ledger, |reply| LedgerMsg::GetMessage {
            session_id: session_id.to_string(),
            reply,
        })
        .expect("ledger call");
        if let Some(message) = message {
            if message.response_complete {
                return message.result_artifacts.expect("terminal artifacts");
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run for {session_id} never finalized");
}

#[tokio::test]
async fn test_transient_failure_retried_exactly_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(FlakyWorker {
        intent_type: IntentType::TerrainAnalysis,
        failures_before_success: 1,
        calls: calls.clone(),
    }));
    let harness = setup(registry).await;

    let accepted = ractor::call!(harness.orchestrator, |reply| {
        OrchestratorMsg::SubmitWorkflow {
            submission: submission("s-retry"),
            reply,
        }
    })
    .expect("rpc")
    .expect("accepted");
    assert!(accepted.accepted);

    let artifacts = wait_for_artifacts(&harness, "s-retry").await;
    assert_eq!(artifacts["status"], "success");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_persistent_transient_failure_without_fallback_fails() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(FlakyWorker {
        intent_type: IntentType::TerrainAnalysis,
        failures_before_success: u32::MAX,
        calls: calls.clone(),
    }));
    let harness = setup(registry).await;

    ractor::call!(harness.orchestrator, |reply| {
        OrchestratorMsg::SubmitWorkflow {
            submission: submission("s-exhausted"),
            reply,
        }
    })
    .expect("rpc")
    .expect("accepted");

    let artifacts = wait_for_artifacts(&harness, "s-exhausted").await;
    assert_eq!(artifacts["status"], "failure");
    assert_eq!(artifacts["error"]["code"], "WORKER_FAILED");
    assert_eq!(artifacts["error"]["failure_kind"], "transient");
    // One initial attempt plus exactly one retry.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fallback_engaged_after_retry_exhausted() {
    let primary_calls = Arc::new(AtomicU32::new(0));
    let fallback_calls = Arc::new(AtomicU32::new(0));
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(FlakyWorker {
        intent_type: IntentType::TerrainAnalysis,
        failures_before_success: u32::MAX,
        calls: primary_calls.clone(),
    }));
    registry.register_fallback(
        IntentType::TerrainAnalysis,
        Arc::new(SimpleFallback {
            intent_type: IntentType::TerrainAnalysis,
            calls: fallback_calls.clone(),
        }),
    );
    let harness = setup(registry).await;

    ractor::call!(harness.orchestrator, |reply| {
        OrchestratorMsg::SubmitWorkflow {
            submission: submission("s-fallback"),
            reply,
        }
    })
    .expect("rpc")
    .expect("accepted");

    let artifacts = wait_for_artifacts(&harness, "s-fallback").await;
    assert_eq!(artifacts["status"], "partial_failure");
    assert_eq!(artifacts["algorithm"], "grid");
    assert_eq!(artifacts["result"]["fallback"], json!(true));
    assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_logic_failure_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(BrokenWorker {
        intent_type: IntentType::TerrainAnalysis,
        calls: calls.clone(),
    }));
    let harness = setup(registry).await;

    ractor::call!(harness.orchestrator, |reply| {
        OrchestratorMsg::SubmitWorkflow {
            submission: submission("s-logic"),
            reply,
        }
    })
    .expect("rpc")
    .expect("accepted");

    let artifacts = wait_for_artifacts(&harness, "s-logic").await;
    assert_eq!(artifacts["status"], "failure");
    assert_eq!(artifacts["error"]["failure_kind"], "logic");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_second_submission_rejected_while_run_in_flight() {
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(SlowWorker {
        intent_type: IntentType::TerrainAnalysis,
        delay: Duration::from_millis(500),
    }));
    let harness = setup(registry).await;

    ractor::call!(harness.orchestrator, |reply| {
        OrchestratorMsg::SubmitWorkflow {
            submission: submission("s-busy"),
            reply,
        }
    })
    .expect("rpc")
    .expect("first submission accepted");

    let second = ractor::call!(harness.orchestrator, |reply| {
        OrchestratorMsg::SubmitWorkflow {
            submission: submission("s-busy"),
            reply,
        }
    })
    .expect("rpc");
    assert!(matches!(second, Err(OrchestratorError::RunInFlight(_))));

    // The first run still completes normally.
    let artifacts = wait_for_artifacts(&harness, "s-busy").await;
    assert_eq!(artifacts["status"], "success");

    // After completion the session accepts new submissions again.
    let third = ractor::call!(harness.orchestrator, |reply| {
        OrchestratorMsg::SubmitWorkflow {
            submission: submission("s-busy"),
            reply,
        }
    })
    .expect("rpc");
    assert!(third.is_ok());
}

#[tokio::test]
async fn test_worker_timeout_counts_as_transient() {
    let mut registry = WorkerRegistry::new();
    registry.register(Arc::new(SlowWorker {
        intent_type: IntentType::TerrainAnalysis,
        delay: Duration::from_secs(60),
    }));
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let (ledger, _handle) = Actor::spawn(
        None,
        LedgerActor,
        LedgerArguments {
            data_dir: temp_dir.path().to_path_buf(),
        },
    )
    .await
    .expect("Failed to create ledger");
    let (orchestrator, _handle) = Actor::spawn(
        None,
        OrchestratorActor,
        OrchestratorArguments {
            ledger: ledger.clone(),
            registry: Arc::new(registry),
            config: RunConfig {
                step_timeout: Duration::from_millis(50),
                retry_backoff: Duration::from_millis(5),
            },
        },
    )
    .await
    .expect("Failed to create orchestrator");
    let harness = Harness {
        orchestrator,
        ledger,
        _temp_dir: temp_dir,
    };

    ractor::call!(harness.orchestrator, |reply| {
        OrchestratorMsg::SubmitWorkflow {
            submission: submission("s-timeout"),
            reply,
        }
    })
    .expect("rpc")
    .expect("accepted");

    let artifacts = wait_for_artifacts(&harness, "s-timeout").await;
    assert_eq!(artifacts["status"], "failure");
    assert_eq!(artifacts["error"]["failure_kind"], "transient");
}

#[tokio::test]
async fn test_validation_failure_finalizes_ledger_record() {
    let harness = setup(WorkerRegistry::new()).await;

    let result = ractor::call!(harness.orchestrator, |reply| {
        OrchestratorMsg::SubmitWorkflow {
            submission: WorkflowSubmission {
                session_id: "s-invalid".to_string(),
                user_id: "test-user".to_string(),
                raw_query: "what is the meaning of life".to_string(),
                prior_context: None,
            },
            reply,
        }
    })
    .expect("rpc");
    assert!(matches!(result, Err(OrchestratorError::Validation(_))));

    let artifacts = wait_for_artifacts(&harness, "s-invalid").await;
    assert_eq!(artifacts["status"], "failure");
    assert_eq!(artifacts["error"]["code"], "INVALID_REQUEST");
}
