//! Tool worker contract and registry.
//!
//! A worker is an independently invokable, stateless unit of domain logic
//! for one capability. Workers are pure over `(parameters, context)`: every
//! cross-step dependency flows through the explicit context value, never
//! through ambient storage.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared_types::{IntentType, ProjectContext};
use thiserror::Error;

pub mod layout;
pub mod report;
pub mod simulation;
pub mod terrain;

pub use layout::{GridLayoutWorker, LayoutWorker};
pub use report::ReportWorker;
pub use simulation::{SimulationWorker, WakeModel};
pub use terrain::{SyntheticTerrainProvider, TerrainProvider, TerrainWorker};

/// Worker failure taxonomy. Transient failures (timeout/unreachable) are
/// eligible for the orchestrator's single retry; logic failures mean the
/// worker ran and reported a domain failure and are never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkerError {
    #[error("transient worker failure: {0}")]
    Transient(String),
    #[error("{0}")]
    Logic(String),
}

impl WorkerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkerError::Transient(_))
    }
}

/// Successful worker output.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSuccess {
    /// Structured result merged into `ProjectContext` under the step's key.
    pub structured_result: Value,
    /// Fidelity marker, e.g. `"constrained"` vs `"grid"` for layout.
    pub algorithm: Option<String>,
    /// One human-readable line for the progress ledger.
    pub summary: String,
}

#[async_trait]
pub trait ToolWorker: Send + Sync {
    fn intent_type(&self) -> IntentType;

    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError>;
}

/// Maps each intent type to its primary worker and an optional degraded
/// fallback, invoked only when the primary is unreachable after retry.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    primaries: HashMap<IntentType, Arc<dyn ToolWorker>>,
    fallbacks: HashMap<IntentType, Arc<dyn ToolWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in workers for all four capabilities and the
    /// unconstrained grid layout registered as the layout fallback.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TerrainWorker::new(Arc::new(
            SyntheticTerrainProvider,
        ))));
        registry.register(Arc::new(LayoutWorker));
        registry.register_fallback(IntentType::LayoutOptimization, Arc::new(GridLayoutWorker));
        registry.register(Arc::new(SimulationWorker::default()));
        registry.register(Arc::new(ReportWorker));
        registry
    }

    pub fn register(&mut self, worker: Arc<dyn ToolWorker>) {
        self.primaries.insert(worker.intent_type(), worker);
    }

    pub fn register_fallback(&mut self, intent_type: IntentType, worker: Arc<dyn ToolWorker>) {
        self.fallbacks.insert(intent_type, worker);
    }

    pub fn primary(&self, intent_type: IntentType) -> Option<Arc<dyn ToolWorker>> {
        self.primaries.get(&intent_type).cloned()
    }

    pub fn fallback(&self, intent_type: IntentType) -> Option<Arc<dyn ToolWorker>> {
        self.fallbacks.get(&intent_type).cloned()
    }
}

// Parameter accessors. The resolver guarantees a complete set, so a missing
// or mistyped parameter here is a contract violation reported as a logic
// error with the field name.

pub(crate) fn param_f64(params: &Map<String, Value>, key: &str) -> Result<f64, WorkerError> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| WorkerError::Logic(format!("missing or non-numeric parameter: {key}")))
}

pub(crate) fn param_usize(params: &Map<String, Value>, key: &str) -> Result<usize, WorkerError> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| WorkerError::Logic(format!("missing or non-integer parameter: {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_all_intents() {
        let registry = WorkerRegistry::with_defaults();
        for intent in [
            IntentType::TerrainAnalysis,
            IntentType::LayoutOptimization,
            IntentType::WakeSimulation,
            IntentType::ReportGeneration,
        ] {
            assert!(registry.primary(intent).is_some(), "no worker for {intent}");
        }
        assert!(registry
            .fallback(IntentType::LayoutOptimization)
            .is_some());
        assert!(registry.fallback(IntentType::TerrainAnalysis).is_none());
    }

    #[test]
    fn test_param_accessors_name_the_field() {
        let params = Map::new();
        let err = param_f64(&params, "latitude").unwrap_err();
        assert!(err.to_string().contains("latitude"));
        assert!(!err.is_transient());
    }
}
