//! Terrain analysis worker.
//!
//! Builds the exclusion geometry for a site. The concrete geospatial data
//! fetch is an external collaborator behind the [`TerrainProvider`] seam;
//! the built-in provider derives a deterministic synthetic feature set from
//! the coordinates so the pipeline runs end to end without network access.

use std::sync::Arc;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use shared_types::{IntentType, ProjectContext};

use crate::geometry::{rect, ExclusionZone, Geometry, Point, ZoneKind};
use crate::workers::{param_f64, ToolWorker, WorkerError, WorkerSuccess};

/// Source of exclusion features for a site. Real deployments back this with
/// a geodata service; failures from such a backend surface as
/// `WorkerError::Transient`.
pub trait TerrainProvider: Send + Sync {
    fn fetch_zones(
        &self,
        latitude: f64,
        longitude: f64,
        search_radius_m: f64,
    ) -> Result<Vec<ExclusionZone>, WorkerError>;
}

/// Deterministic synthetic provider: the feature set is a pure function of
/// the coordinates, so repeated analyses of one site agree exactly.
pub struct SyntheticTerrainProvider;

impl SyntheticTerrainProvider {
    fn seed_for(latitude: f64, longitude: f64) -> u64 {
        // Quantize to ~1m so float noise in equal inputs cannot change the
        // feature set.
        let lat_q = (latitude * 1e5).round() as i64;
        let lon_q = (longitude * 1e5).round() as i64;
        (lat_q as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (lon_q as u64)
    }
}

impl TerrainProvider for SyntheticTerrainProvider {
    fn fetch_zones(
        &self,
        latitude: f64,
        longitude: f64,
        search_radius_m: f64,
    ) -> Result<Vec<ExclusionZone>, WorkerError> {
        let mut rng = StdRng::seed_from_u64(Self::seed_for(latitude, longitude));
        let r = search_radius_m;
        let mut zones = Vec::new();

        let building_count = rng.gen_range(3..=10);
        for _ in 0..building_count {
            let cx = rng.gen_range(-0.8 * r..0.8 * r);
            let cy = rng.gen_range(-0.8 * r..0.8 * r);
            let half = rng.gen_range(15.0..60.0);
            zones.push(ExclusionZone::new(ZoneKind::Building, rect(cx, cy, half, half)));
        }

        let road_count = rng.gen_range(1..=4);
        for _ in 0..road_count {
            let y = rng.gen_range(-0.9 * r..0.9 * r);
            let skew = rng.gen_range(-0.3 * r..0.3 * r);
            zones.push(ExclusionZone::new(
                ZoneKind::Road,
                Geometry::Line {
                    points: vec![Point::new(-r, y), Point::new(r, y + skew)],
                },
            ));
        }

        if rng.gen_bool(0.5) {
            let cx = rng.gen_range(-0.6 * r..0.6 * r);
            let cy = rng.gen_range(-0.6 * r..0.6 * r);
            let half_w = rng.gen_range(100.0..400.0);
            let half_h = rng.gen_range(100.0..400.0);
            zones.push(ExclusionZone::new(ZoneKind::Water, rect(cx, cy, half_w, half_h)));
        }

        Ok(zones)
    }
}

/// Worker wrapping the terrain provider. Emits the zone list plus summary
/// counts; the layout step reads the zones back out of context.
pub struct TerrainWorker {
    provider: Arc<dyn TerrainProvider>,
}

impl TerrainWorker {
    pub fn new(provider: Arc<dyn TerrainProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ToolWorker for TerrainWorker {
    fn intent_type(&self) -> IntentType {
        IntentType::TerrainAnalysis
    }

    async fn invoke(
        &self,
        parameters: &Map<String, Value>,
        _context: Option<&ProjectContext>,
    ) -> Result<WorkerSuccess, WorkerError> {
        let latitude = param_f64(parameters, "latitude")?;
        let longitude = param_f64(parameters, "longitude")?;
        let search_radius_m = param_f64(parameters, "search_radius_m")?;

        let zones = self
            .provider
            .fetch_zones(latitude, longitude, search_radius_m)?;

        let mut kind_counts = serde_json::Map::new();
        for zone in &zones {
            let key = format!("{:?}", zone.kind).to_lowercase();
            let count = kind_counts.get(&key).and_then(Value::as_u64).unwrap_or(0);
            kind_counts.insert(key, json!(count + 1));
        }

        let summary = format!(
            "Identified {} exclusion zones within {:.0}m of ({:.4}, {:.4})",
            zones.len(),
            search_radius_m,
            latitude,
            longitude
        );

        Ok(WorkerSuccess {
            structured_result: json!({
                "latitude": latitude,
                "longitude": longitude,
                "search_radius_m": search_radius_m,
                "zone_count": zones.len(),
                "zone_counts_by_kind": kind_counts,
                "zones": zones,
            }),
            algorithm: None,
            summary,
        })
    }
}
