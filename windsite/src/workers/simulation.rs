//! Wake simulation worker.
//!
//! The physical wake-effect and energy-yield math is an external
//! collaborator behind the [`WakeModel`] seam. The built-in model is a thin
//! deterministic estimate over the layout geometry, enough to carry the
//! pipeline's data dependencies.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared_types::{IntentType, ProjectContext, TurbinePlacement};

use crate::workers::{param_f64, ToolWorker, WorkerError, WorkerSuccess};

/// Rated power per turbine assumed by the built-in model, in MW.
const RATED_POWER_MW: f64 = 4.2;
/// Gross capacity factor before wake losses.
const GROSS_CAPACITY_FACTOR: f64 = 0.42;

#[derive(Debug, Clone, PartialEq)]
pub struct WakeEstimate {
    pub gross_annual_mwh: f64,
    pub wake_loss_pct: f64,
    pub net_annual_mwh: f64,
    pub net_capacity_factor: f64,
}

/// Energy-yield estimator over a placed layout.
pub trait WakeModel: Send + Sync {
    fn estimate(
        &self,
        turbines: &[TurbinePlacement],
        rotor_diameter_m: f64,
        hub_height_m: f64,
    ) -> Result<WakeEstimate, WorkerError>;
}

/// Built-in analytic estimate: wake loss scales with rotor diameter relative
/// to mean nearest-neighbor spacing, clamped to a plausible band.
#[derive(Default)]
pub struct SpacingWakeModel;

impl WakeModel for SpacingWakeModel {
    fn estimate(
        &self,
        turbines: &[TurbinePlacement],
        rotor_diameter_m: f64,
        hub_height_m: f64,
    ) -> Result<WakeEstimate, WorkerError> {
        if turbines.is_empty() {
            return Err(WorkerError::Logic(
                "layout contains no turbines to simulate".to_string(),
            ));
        }

        let spacings: Vec<f64> = turbines
            .iter()
            .filter_map(|t| t.nearest_neighbor_m)
            .collect();
        let mean_spacing = if spacings.is_empty() {
            // Single turbine: no wake interaction.
            f64::INFINITY
        } else {
            spacings.iter().sum::<f64>() / spacings.len() as f64
        };

        // Loss grows as spacing shrinks toward the rotor scale. 7D spacing
        // is treated as the reference point for a 10% loss.
        let wake_loss_pct = if mean_spacing.is_finite() {
            (10.0 * (7.0 * rotor_diameter_m) / mean_spacing).clamp(1.0, 25.0)
        } else {
            0.0
        };

        // Mild hub-height bonus: taller towers see steadier wind.
        let height_factor = 1.0 + ((hub_height_m - 100.0) / 1000.0).clamp(-0.05, 0.05);

        let hours_per_year = 8760.0;
        let gross_annual_mwh = turbines.len() as f64
            * RATED_POWER_MW
            * GROSS_CAPACITY_FACTOR
            * height_factor
            * hours_per_year;
        let net_annual_mwh = gross_annual_mwh * (1.0 - wake_loss_pct / 100.0);
        let net_capacity_factor =
            net_annual_mwh / (turbines.len() as f64 * RATED_POWER_MW * hours_per_year);

        Ok(WakeEstimate {
            gross_annual_mwh,
            wake_loss_pct,
            net_annual_mwh,
            net_capacity_factor,
        })
    }
}

pub struct SimulationWorker {
    model: Box<dyn WakeModel>,
}

impl Default for SimulationWorker {
    fn default() -> Self {
        Self {
            model: Box::new(SpacingWakeModel),
        }
    }
}

impl SimulationWorker {
    pub fn new(model: Box<dyn WakeModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ToolWorker for SimulationWorker {
    fn intent_type(&self) -> IntentType {
        IntentType::WakeSimulation
    }

    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError> {
        let rotor_diameter_m = param_f64(parameters, "rotor_diameter_m")?;
        let hub_height_m = param_f64(parameters, "hub_height_m")?;

        let layout = context
            .and_then(|ctx| ctx.layout.as_ref())
            .ok_or_else(|| {
                WorkerError::Logic(
                    "no layout available in project context; run layout optimization first"
                        .to_string(),
                )
            })?;
        let turbines: Vec<TurbinePlacement> = layout
            .get("turbines")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| {
                WorkerError::Logic("layout result is missing turbine positions".to_string())
            })?;

        let estimate = self
            .model
            .estimate(&turbines, rotor_diameter_m, hub_height_m)?;

        let summary = format!(
            "Estimated {:.0} MWh/yr net ({:.1}% wake loss, CF {:.1}%)",
            estimate.net_annual_mwh,
            estimate.wake_loss_pct,
            estimate.net_capacity_factor * 100.0
        );

        Ok(WorkerSuccess {
            structured_result: json!({
                "turbine_count": turbines.len(),
                "rotor_diameter_m": rotor_diameter_m,
                "hub_height_m": hub_height_m,
                "gross_annual_mwh": estimate.gross_annual_mwh,
                "wake_loss_pct": estimate.wake_loss_pct,
                "net_annual_mwh": estimate.net_annual_mwh,
                "net_capacity_factor": estimate.net_capacity_factor,
            }),
            algorithm: None,
            summary,
        })
    }
}
