//! Shared types between the windsite service and its clients
//!
//! These types cross the wire on every submission and progress poll, so they
//! all derive serde and avoid service-internal details (actor refs, geometry
//! internals). The geometry model itself lives in the service crate; only the
//! kind-tagged feature collection emitted by the layout step is shared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Workflow Intents
// ============================================================================

/// The workflow capability a classified query asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    TerrainAnalysis,
    LayoutOptimization,
    WakeSimulation,
    ReportGeneration,
}

impl IntentType {
    /// Step name recorded in `ProjectContext::completed_steps` and used as
    /// the namespaced merge key for the step's result.
    pub fn step_name(&self) -> &'static str {
        match self {
            IntentType::TerrainAnalysis => "terrain_analysis",
            IntentType::LayoutOptimization => "layout_optimization",
            IntentType::WakeSimulation => "wake_simulation",
            IntentType::ReportGeneration => "report_generation",
        }
    }
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.step_name())
    }
}

/// Classified, structured representation of what a query asks the pipeline
/// to do. Created once per query by the classifier; immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowIntent {
    pub intent_type: IntentType,
    /// Complete, validated parameter set. Required parameters are guaranteed
    /// present after resolution; optional parameters carry their defaults.
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub confidence: f64,
    pub raw_query: String,
}

// ============================================================================
// Project Context
// ============================================================================

/// Accumulated state of a multi-step session, carried across sequential tool
/// invocations. Mutated only by the orchestrator via namespaced merge: a new
/// step's output is added under its own key, existing keys are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectContext {
    pub project_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub terrain: Option<serde_json::Value>,
    pub layout: Option<serde_json::Value>,
    pub simulation: Option<serde_json::Value>,
    pub report: Option<serde_json::Value>,
    /// Step names in completion order. A step re-run appends again rather
    /// than deduplicating, preserving the full history.
    pub completed_steps: Vec<String>,
}

impl ProjectContext {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            project_id: uuid::Uuid::new_v4().to_string(),
            latitude,
            longitude,
            terrain: None,
            layout: None,
            simulation: None,
            report: None,
            completed_steps: Vec::new(),
        }
    }

    /// Merge a step result under its namespaced key and record completion.
    pub fn merge_step(&mut self, intent_type: IntentType, result: serde_json::Value) {
        match intent_type {
            IntentType::TerrainAnalysis => self.terrain = Some(result),
            IntentType::LayoutOptimization => self.layout = Some(result),
            IntentType::WakeSimulation => self.simulation = Some(result),
            IntentType::ReportGeneration => self.report = Some(result),
        }
        self.completed_steps.push(intent_type.step_name().to_string());
    }

    /// The namespaced result for a step, if that step has run.
    pub fn step_result(&self, intent_type: IntentType) -> Option<&serde_json::Value> {
        match intent_type {
            IntentType::TerrainAnalysis => self.terrain.as_ref(),
            IntentType::LayoutOptimization => self.layout.as_ref(),
            IntentType::WakeSimulation => self.simulation.as_ref(),
            IntentType::ReportGeneration => self.report.as_ref(),
        }
    }

    pub fn has_completed(&self, intent_type: IntentType) -> bool {
        self.completed_steps
            .iter()
            .any(|s| s == intent_type.step_name())
    }
}

// ============================================================================
// Progress Ledger
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtStatus {
    Pending,
    InProgress,
    Complete,
    Error,
}

/// One discrete, human-readable unit of progress within an in-flight run.
/// Append-only within a run; later writes may update `status`, `duration_ms`
/// and `result_summary` of an existing index but never remove steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThoughtStep {
    pub index: u32,
    pub action: String,
    pub reasoning: String,
    pub status: ThoughtStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub result_summary: Option<String>,
}

/// The single mutable record representing a session's current run.
///
/// A new run replaces the record with a fresh `run_id` and empty step list.
/// `response_complete` transitions false -> true exactly once per run and
/// never reverts; after that the record content is frozen, so repeat polls
/// return identical terminal content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingMessage {
    pub session_id: String,
    pub run_id: String,
    pub thought_steps: Vec<ThoughtStep>,
    pub response_complete: bool,
    pub updated_at: DateTime<Utc>,
    pub result_artifacts: Option<serde_json::Value>,
}

// ============================================================================
// Layout Artifact Format
// ============================================================================

/// Feature category in the layout geometry collection. Exclusion-zone kinds
/// and turbine points share one tag so a consumer can style/filter each
/// category without additional joins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Building,
    Road,
    Water,
    Perimeter,
    Turbine,
}

/// Geometry of one site feature, in site-local metres relative to the
/// project center.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureGeometry {
    /// Closed ring; first vertex is not repeated at the end.
    Polygon { ring: Vec<[f64; 2]> },
    Line { points: Vec<[f64; 2]> },
    Point { xy: [f64; 2] },
}

/// One feature of the mixed layout collection (exclusion zones + turbines).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteFeature {
    pub kind: FeatureKind,
    pub geometry: FeatureGeometry,
    pub properties: serde_json::Value,
}

/// One placed turbine. Invariants upheld by the placement algorithm:
/// pairwise distance >= requested spacing, and outside every buffered
/// exclusion region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurbinePlacement {
    pub id: String,
    /// Site-local position, metres east/north of the project center.
    pub x_m: f64,
    pub y_m: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Distance to the closest other turbine; `None` for a single-turbine
    /// layout.
    pub nearest_neighbor_m: Option<f64>,
}

// ============================================================================
// API Types
// ============================================================================

/// Workflow submission body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSubmission {
    pub session_id: String,
    pub user_id: String,
    pub raw_query: String,
    /// Optional context handed in by the client (e.g. resuming a project on
    /// a fresh session). When absent, the session's own accumulated context
    /// is used.
    #[serde(default)]
    pub prior_context: Option<ProjectContext>,
}

/// Immediate acknowledgment returned by submission. The pipeline keeps
/// running after this response; progress is observed by polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowAccepted {
    pub accepted: bool,
    pub session_id: String,
    pub run_id: String,
    pub error: Option<WorkflowError>,
}

/// Failure classification carried on wire errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Transient,
    Logic,
    Unknown,
}

/// Machine-readable error payload for API responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowError {
    pub code: String,
    pub message: String,
    pub failure_kind: Option<FailureKind>,
}
