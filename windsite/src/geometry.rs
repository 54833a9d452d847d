//! Planar exclusion-geometry model.
//!
//! All geometry is expressed in site-local metres: a flat east/north frame
//! centred on the project coordinates. At the few-kilometre scale of a site
//! the equirectangular projection error is well under turbine-spacing
//! tolerance, so no geodesic math is needed here.

use serde::{Deserialize, Serialize};
use shared_types::{FeatureGeometry, FeatureKind, SiteFeature};

/// Metres of northing per degree of latitude.
const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// A point in site-local metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Convert a site-local offset back to geographic coordinates.
pub fn local_to_geo(center_lat: f64, center_lon: f64, p: &Point) -> (f64, f64) {
    let lat = center_lat + p.y / METERS_PER_DEG_LAT;
    let meters_per_deg_lon = METERS_PER_DEG_LAT * center_lat.to_radians().cos();
    let lon = if meters_per_deg_lon.abs() > f64::EPSILON {
        center_lon + p.x / meters_per_deg_lon
    } else {
        center_lon
    };
    (lat, lon)
}

/// Category of forbidding geography. Each kind carries a default safety
/// buffer applied when expanding the feature into a forbidden region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Building,
    Road,
    Water,
    Perimeter,
}

impl ZoneKind {
    /// Default safety buffer in metres. Buildings get the widest setback
    /// (noise/shadow flicker), linear features a narrower corridor.
    pub fn default_buffer_m(&self) -> f64 {
        match self {
            ZoneKind::Building => 300.0,
            ZoneKind::Road => 150.0,
            ZoneKind::Water => 100.0,
            ZoneKind::Perimeter => 50.0,
        }
    }

    pub fn feature_kind(&self) -> FeatureKind {
        match self {
            ZoneKind::Building => FeatureKind::Building,
            ZoneKind::Road => FeatureKind::Road,
            ZoneKind::Water => FeatureKind::Water,
            ZoneKind::Perimeter => FeatureKind::Perimeter,
        }
    }
}

/// Shape of one exclusion feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    /// Closed ring of vertices; the first vertex is not repeated.
    Polygon { ring: Vec<Point> },
    /// Open polyline, e.g. a road segment.
    Line { points: Vec<Point> },
}

impl Geometry {
    /// Minimum distance from `p` to this shape. Zero inside a polygon.
    pub fn distance_to(&self, p: &Point) -> f64 {
        match self {
            Geometry::Polygon { ring } => {
                if point_in_ring(p, ring) {
                    0.0
                } else {
                    ring_boundary_distance(p, ring)
                }
            }
            Geometry::Line { points } => polyline_distance(p, points),
        }
    }

    /// Axis-aligned bounds of the shape vertices.
    pub fn bounds(&self) -> Option<Bounds> {
        let vertices = match self {
            Geometry::Polygon { ring } => ring,
            Geometry::Line { points } => points,
        };
        Bounds::of(vertices)
    }
}

/// A geographic feature constraining placement, expanded by a safety buffer.
/// Read-only input to the placement algorithm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExclusionZone {
    pub kind: ZoneKind,
    pub geometry: Geometry,
    pub buffer_m: f64,
}

impl ExclusionZone {
    pub fn new(kind: ZoneKind, geometry: Geometry) -> Self {
        let buffer_m = kind.default_buffer_m();
        Self {
            kind,
            geometry,
            buffer_m,
        }
    }

    /// Whether `p` falls inside this zone once expanded by its buffer.
    pub fn contains_buffered(&self, p: &Point) -> bool {
        self.geometry.distance_to(p) < self.buffer_m
    }

    pub fn to_site_feature(&self) -> SiteFeature {
        let geometry = match &self.geometry {
            Geometry::Polygon { ring } => FeatureGeometry::Polygon {
                ring: ring.iter().map(|p| [p.x, p.y]).collect(),
            },
            Geometry::Line { points } => FeatureGeometry::Line {
                points: points.iter().map(|p| [p.x, p.y]).collect(),
            },
        };
        SiteFeature {
            kind: self.kind.feature_kind(),
            geometry,
            properties: serde_json::json!({ "buffer_m": self.buffer_m }),
        }
    }
}

/// Axis-aligned bounding box in site-local metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn of(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut b = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            b.min_x = b.min_x.min(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_x = b.max_x.max(p.x);
            b.max_y = b.max_y.max(p.y);
        }
        Some(b)
    }

    pub fn expanded(&self, margin: f64) -> Bounds {
        Bounds {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }
}

/// Ray-casting point-in-polygon test over a closed ring.
pub fn point_in_ring(p: &Point, ring: &[Point]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (a, b) = (&ring[i], &ring[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance from `p` to the segment `a`-`b`.
pub fn point_segment_distance(p: &Point, a: &Point, b: &Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    let closest = Point::new(a.x + t * dx, a.y + t * dy);
    p.distance_to(&closest)
}

fn ring_boundary_distance(p: &Point, ring: &[Point]) -> f64 {
    let mut best = f64::INFINITY;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        best = best.min(point_segment_distance(p, &ring[j], &ring[i]));
        j = i;
    }
    best
}

fn polyline_distance(p: &Point, points: &[Point]) -> f64 {
    if points.len() == 1 {
        return p.distance_to(&points[0]);
    }
    points
        .windows(2)
        .map(|w| point_segment_distance(p, &w[0], &w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Convenience: an axis-aligned rectangular polygon centred on `(cx, cy)`.
pub fn rect(cx: f64, cy: f64, half_w: f64, half_h: f64) -> Geometry {
    Geometry::Polygon {
        ring: vec![
            Point::new(cx - half_w, cy - half_h),
            Point::new(cx + half_w, cy - half_h),
            Point::new(cx + half_w, cy + half_h),
            Point::new(cx - half_w, cy + half_h),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]
    }

    #[test]
    fn test_point_in_ring_inside_and_outside() {
        let ring = unit_square();
        assert!(point_in_ring(&Point::new(5.0, 5.0), &ring));
        assert!(!point_in_ring(&Point::new(15.0, 5.0), &ring));
        assert!(!point_in_ring(&Point::new(-1.0, -1.0), &ring));
    }

    #[test]
    fn test_polygon_distance_zero_inside() {
        let geom = Geometry::Polygon { ring: unit_square() };
        assert_eq!(geom.distance_to(&Point::new(5.0, 5.0)), 0.0);
        let d = geom.distance_to(&Point::new(13.0, 5.0));
        assert!((d - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_polyline_distance() {
        let geom = Geometry::Line {
            points: vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)],
        };
        assert!((geom.distance_to(&Point::new(5.0, 4.0)) - 4.0).abs() < 1e-9);
        assert!((geom.distance_to(&Point::new(-3.0, 0.0)) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_contains_buffered_expands_by_kind_buffer() {
        let zone = ExclusionZone::new(ZoneKind::Road, Geometry::Line {
            points: vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)],
        });
        // Road buffer is 150m.
        assert!(zone.contains_buffered(&Point::new(50.0, 149.0)));
        assert!(!zone.contains_buffered(&Point::new(50.0, 151.0)));
    }

    #[test]
    fn test_bounds_expanded() {
        let b = Bounds::of(&unit_square()).unwrap().expanded(5.0);
        assert_eq!(b.min_x, -5.0);
        assert_eq!(b.max_y, 15.0);
    }

    #[test]
    fn test_local_to_geo_northward_offset() {
        let (lat, lon) = local_to_geo(32.0, -96.0, &Point::new(0.0, 111_320.0));
        assert!((lat - 33.0).abs() < 1e-9);
        assert!((lon - -96.0).abs() < 1e-9);
    }
}
