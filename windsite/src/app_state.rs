use ractor::{Actor, ActorRef};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::actors::ledger::LedgerMsg;
use crate::actors::orchestrator::{
    OrchestratorActor, OrchestratorArguments, OrchestratorMsg, RunConfig,
};
use crate::workers::WorkerRegistry;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    ledger: ActorRef<LedgerMsg>,
    registry: Arc<WorkerRegistry>,
    run_config: RunConfig,
    orchestrator: Mutex<Option<ActorRef<OrchestratorMsg>>>,
}

impl AppState {
    pub fn new(ledger: ActorRef<LedgerMsg>) -> Self {
        Self::with_registry(ledger, Arc::new(WorkerRegistry::with_defaults()), RunConfig::default())
    }

    pub fn with_registry(
        ledger: ActorRef<LedgerMsg>,
        registry: Arc<WorkerRegistry>,
        run_config: RunConfig,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                ledger,
                registry,
                run_config,
                orchestrator: Mutex::new(None),
            }),
        }
    }

    pub fn ledger(&self) -> ActorRef<LedgerMsg> {
        self.inner.ledger.clone()
    }

    pub async fn ensure_orchestrator(&self) -> Result<ActorRef<OrchestratorMsg>, String> {
        let mut guard = self.inner.orchestrator.lock().await;
        if let Some(orchestrator) = guard.as_ref() {
            return Ok(orchestrator.clone());
        }

        let (orchestrator, _) = Actor::spawn(
            Some(format!("orchestrator:{}", ulid::Ulid::new())),
            OrchestratorActor,
            OrchestratorArguments {
                ledger: self.inner.ledger.clone(),
                registry: self.inner.registry.clone(),
                config: self.inner.run_config,
            },
        )
        .await
        .map_err(|e| e.to_string())?;

        *guard = Some(orchestrator.clone());
        Ok(orchestrator)
    }
}
