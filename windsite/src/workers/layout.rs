//! Layout optimization worker.
//!
//! Runs the placement algorithm over the exclusion geometry produced by the
//! terrain step and emits a single mixed geometry collection: exclusion-zone
//! features and turbine point features, each carrying a kind tag so a
//! consumer can style or filter each category without joins.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared_types::{FeatureGeometry, FeatureKind, IntentType, ProjectContext, SiteFeature};

use crate::geometry::ExclusionZone;
use crate::placement::{place, PlacementAlgorithm, PlacementOutcome, PlacementSite};
use crate::workers::{param_f64, param_usize, ToolWorker, WorkerError, WorkerSuccess};

/// Primary layout worker: constrained placement when the terrain step has
/// run, otherwise the unconstrained grid path inside the algorithm itself
/// (tagged `grid` in either case the exclusion data is absent).
pub struct LayoutWorker;

/// Degraded alternate registered as the dispatch fallback for layout: always
/// ignores exclusion data. Invoked by the orchestrator only when the primary
/// worker is unreachable after its retry, never silently.
pub struct GridLayoutWorker;

/// Run the placement algorithm off the async runtime. Placement is pure CPU
/// work with no await points; on a runtime worker thread it could not be
/// preempted, so the orchestrator's step timeout would never fire.
async fn place_off_runtime(
    site: PlacementSite,
    exclusions: Vec<ExclusionZone>,
) -> Result<PlacementOutcome, WorkerError> {
    tokio::task::spawn_blocking(move || place(&site, &exclusions))
        .await
        .map_err(|e| WorkerError::Transient(format!("placement task failed: {e}")))
}

fn site_from_params(parameters: &Map<String, Value>) -> Result<PlacementSite, WorkerError> {
    Ok(PlacementSite {
        latitude: param_f64(parameters, "latitude")?,
        longitude: param_f64(parameters, "longitude")?,
        target_count: param_usize(parameters, "target_count")?,
        min_spacing_m: param_f64(parameters, "min_spacing_m")?,
        search_radius_m: param_f64(parameters, "search_radius_m")?,
    })
}

/// Exclusion zones recorded by a prior terrain step, if any.
fn exclusions_from_context(context: Option<&ProjectContext>) -> Vec<ExclusionZone> {
    context
        .and_then(|ctx| ctx.terrain.as_ref())
        .and_then(|terrain| terrain.get("zones"))
        .and_then(|zones| serde_json::from_value(zones.clone()).ok())
        .unwrap_or_default()
}

fn build_result(
    site: &PlacementSite,
    exclusions: &[ExclusionZone],
    outcome: &PlacementOutcome,
) -> Result<WorkerSuccess, WorkerError> {
    if outcome.positions.is_empty() && site.target_count > 0 {
        // The algorithm ran and found nothing feasible: a domain failure,
        // not a fault of the worker.
        return Err(WorkerError::Logic(
            "no buildable area found within the search radius".to_string(),
        ));
    }

    let mut features: Vec<SiteFeature> =
        exclusions.iter().map(ExclusionZone::to_site_feature).collect();
    features.extend(outcome.positions.iter().map(|t| SiteFeature {
        kind: FeatureKind::Turbine,
        geometry: FeatureGeometry::Point { xy: [t.x_m, t.y_m] },
        properties: json!({
            "id": t.id,
            "latitude": t.latitude,
            "longitude": t.longitude,
            "nearest_neighbor_m": t.nearest_neighbor_m,
        }),
    }));

    let algorithm = match outcome.algorithm {
        PlacementAlgorithm::Constrained => "constrained",
        PlacementAlgorithm::Grid => "grid",
    };

    let summary = if outcome.shortfall > 0 {
        format!(
            "Placed {} of {} turbines ({} algorithm, shortfall {})",
            outcome.positions.len(),
            site.target_count,
            algorithm,
            outcome.shortfall
        )
    } else {
        format!(
            "Placed {} turbines at >={:.0}m spacing ({} algorithm)",
            outcome.positions.len(),
            site.min_spacing_m,
            algorithm
        )
    };

    Ok(WorkerSuccess {
        structured_result: json!({
            "algorithm": algorithm,
            "requested_count": site.target_count,
            "turbine_count": outcome.positions.len(),
            "shortfall": outcome.shortfall,
            "min_spacing_m": site.min_spacing_m,
            "turbines": outcome.positions,
            "features": features,
        }),
        algorithm: Some(algorithm.to_string()),
        summary,
    })
}

#[async_trait]
impl ToolWorker for LayoutWorker {
    fn intent_type(&self) -> IntentType {
        IntentType::LayoutOptimization
    }

    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError> {
        let site = site_from_params(parameters)?;
        let exclusions = exclusions_from_context(context);
        if exclusions.is_empty() {
            tracing::debug!(
                "No exclusion data in context; placement degrades to unconstrained grid"
            );
        }
        let outcome = place_off_runtime(site.clone(), exclusions.clone()).await?;
        build_result(&site, &exclusions, &outcome)
    }
}

#[async_trait]
impl ToolWorker for GridLayoutWorker {
    fn intent_type(&self) -> IntentType {
        IntentType::LayoutOptimization
    }

    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        _context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError> {
        let site = site_from_params(parameters)?;
        let outcome = place_off_runtime(site.clone(), Vec::new()).await?;
        build_result(&site, &[], &outcome)
    }
}
