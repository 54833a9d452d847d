//! Report generation worker.
//!
//! Renders a markdown summary of everything the session has accumulated.
//! Document rendering engines are out of scope; this produces the markdown
//! source a renderer would consume.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared_types::{IntentType, ProjectContext};

use crate::workers::{ToolWorker, WorkerError, WorkerSuccess};

pub struct ReportWorker;

fn fmt_f64(value: Option<&Value>, unit: &str) -> String {
    match value.and_then(Value::as_f64) {
        Some(v) => format!("{v:.1}{unit}"),
        None => "n/a".to_string(),
    }
}

fn render_markdown(ctx: &ProjectContext) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Wind Farm Site Report\n\nProject `{}` at ({:.4}, {:.4})\n\n",
        ctx.project_id, ctx.latitude, ctx.longitude
    ));

    if let Some(terrain) = &ctx.terrain {
        out.push_str("## Terrain Analysis\n\n");
        out.push_str(&format!(
            "- Exclusion zones: {}\n- Search radius: {}\n\n",
            terrain.get("zone_count").and_then(Value::as_u64).unwrap_or(0),
            fmt_f64(terrain.get("search_radius_m"), " m"),
        ));
    }

    if let Some(layout) = &ctx.layout {
        let algorithm = layout
            .get("algorithm")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        out.push_str("## Turbine Layout\n\n");
        out.push_str(&format!(
            "- Turbines placed: {} of {} requested\n- Minimum spacing: {}\n- Algorithm: {}\n",
            layout.get("turbine_count").and_then(Value::as_u64).unwrap_or(0),
            layout.get("requested_count").and_then(Value::as_u64).unwrap_or(0),
            fmt_f64(layout.get("min_spacing_m"), " m"),
            algorithm,
        ));
        if algorithm == "grid" {
            out.push_str(
                "- Note: layout produced by the unconstrained grid algorithm; \
                 exclusion geometry was not applied and accuracy is reduced.\n",
            );
        }
        out.push('\n');
    }

    if let Some(simulation) = &ctx.simulation {
        out.push_str("## Energy Estimate\n\n");
        out.push_str(&format!(
            "- Net annual yield: {}\n- Wake loss: {}\n- Net capacity factor: {}\n\n",
            fmt_f64(simulation.get("net_annual_mwh"), " MWh"),
            fmt_f64(simulation.get("wake_loss_pct"), "%"),
            fmt_f64(simulation.get("net_capacity_factor"), ""),
        ));
    }

    out.push_str("## Completed Steps\n\n");
    for step in &ctx.completed_steps {
        out.push_str(&format!("- {step}\n"));
    }
    out
}

#[async_trait]
impl ToolWorker for ReportWorker {
    fn intent_type(&self) -> IntentType {
        IntentType::ReportGeneration
    }

    async fn invoke(
        &self,
        _parameters: &Map<String, Value>,
        context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError> {
        let ctx = context.ok_or_else(|| {
            WorkerError::Logic(
                "no project context to report on; run an analysis step first".to_string(),
            )
        })?;
        if ctx.completed_steps.is_empty() {
            return Err(WorkerError::Logic(
                "project has no completed steps to report on".to_string(),
            ));
        }

        let markdown = render_markdown(ctx);
        let sections: Vec<&str> = markdown
            .lines()
            .filter(|l| l.starts_with("## "))
            .map(|l| l.trim_start_matches("## "))
            .collect();

        Ok(WorkerSuccess {
            structured_result: json!({
                "markdown": markdown,
                "sections": sections,
                "step_count": ctx.completed_steps.len(),
            }),
            algorithm: None,
            summary: format!(
                "Generated report covering {} completed steps",
                ctx.completed_steps.len()
            ),
        })
    }
}
