//! The "TRILATERATION" Engine - weighted candidate locations from distance circles
//!
//! Every positioned observation is a circle of uncertainty around its
//! access point. The engine turns 0..N of those circles into a set of
//! candidate locations whose weights sum to 1.0:
//!
//! 1. No anchors: nothing to say, empty set
//! 2. One anchor: a discretised ring around it
//! 3. Two or more: pairwise circle intersections, each scored by how well it
//!    explains every observed distance
//! 4. No intersections at all: a signal-weighted centroid of the anchors

use geo::{ConvexHull, Intersects, MultiPoint, Point, Polygon};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::geodesy::{GeoPoint, LocalFrame};
use crate::observation::Observation;
use crate::signal::accuracy_radius_m;

/// Degrees of latitude per meter, as used for map padding.
const DEGREES_PER_METER: f64 = 1.0 / 111_000.0;

/// Below this separation (meters) two anchors are treated as co-located.
const COINCIDENT_EPSILON_M: f64 = 1e-6;

/// Squared half-chord (m²) under which two circles count as tangent.
const TANGENT_EPSILON_M2: f64 = 1e-9;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// A candidate location and its share of the probability mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedLocation {
    pub location: GeoPoint,
    pub weight: f64,
}

impl WeightedLocation {
    pub fn new(location: GeoPoint, weight: f64) -> Self {
        Self { location, weight }
    }
}

/// How the candidate set was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMethod {
    /// No positioned observations
    Empty,
    /// Exactly one anchor: points on its circle
    Ring,
    /// Pairwise circle intersections
    Intersection,
    /// Circles never met: rssi-weighted centroid
    Centroid,
}

/// Lat/lon box framing the anchors and their circles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.latitude())
            && (self.west..=self.east).contains(&point.longitude())
    }
}

/// Output of one estimation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Candidate locations; weights sum to 1.0 unless empty
    pub candidates: Vec<WeightedLocation>,

    /// Highest-weight candidate (first seen wins ties)
    pub best: Option<GeoPoint>,

    pub method: EstimateMethod,

    /// Observations with a known position that fed the geometry
    pub anchors_used: usize,

    /// Display accuracy radius derived from mean signal strength
    pub accuracy_radius_m: f64,

    /// Map framing for the anchors (absent when there are none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

impl Estimate {
    pub fn empty() -> Self {
        Self {
            candidates: Vec::new(),
            best: None,
            method: EstimateMethod::Empty,
            anchors_used: 0,
            accuracy_radius_m: accuracy_radius_m(std::iter::empty()),
            bounds: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.candidates.iter().map(|c| c.weight).sum()
    }
}

/// Highest-weight location; ties resolve to the earliest candidate.
pub fn best_estimate(candidates: &[WeightedLocation]) -> Option<GeoPoint> {
    let mut best: Option<&WeightedLocation> = None;
    for candidate in candidates {
        match best {
            Some(current) if candidate.weight <= current.weight => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|c| c.location)
}

/// Closed-form intersection of two circles in a plane.
///
/// Returns no points for disjoint, nested or concentric circles, one point
/// when they touch, two otherwise.
pub fn circle_intersections(
    c1: Vector2<f64>,
    r1: f64,
    c2: Vector2<f64>,
    r2: f64,
) -> Vec<Vector2<f64>> {
    let delta = c2 - c1;
    let d = delta.norm();

    if d <= COINCIDENT_EPSILON_M || d > r1 + r2 || d < (r1 - r2).abs() {
        return Vec::new();
    }

    // Distance from c1 to the chord midpoint along the center line
    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let h2 = r1 * r1 - a * a;
    let base = c1 + delta * (a / d);

    if h2 <= TANGENT_EPSILON_M2 {
        return vec![base];
    }

    let offset = Vector2::new(-delta.y, delta.x) * (h2.sqrt() / d);
    vec![base + offset, base - offset]
}

// ============================================================================
// ENGINE
// ============================================================================

/// A positioned observation, reduced to what the geometry needs.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    position: GeoPoint,
    local: Vector2<f64>,
    radius_m: f64,
    rssi_dbm: i32,
}

/// Stateless trilateration over a set of observations.
#[derive(Debug, Clone)]
pub struct TrilaterationEngine {
    ring_samples: usize,
    min_distance_m: f64,
    outside_hull_weight: f64,
}

impl Default for TrilaterationEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl TrilaterationEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ring_samples: config.ring_samples.max(1),
            min_distance_m: config.min_distance_m,
            outside_hull_weight: config.outside_hull_weight,
        }
    }

    /// Candidate locations with weights summing to 1.0 (empty for no anchors).
    pub fn calculate_possible_locations(
        &self,
        observations: &[Observation],
    ) -> Vec<WeightedLocation> {
        self.estimate(observations).candidates
    }

    /// Full estimation run: candidates, best estimate and diagnostics.
    pub fn estimate(&self, observations: &[Observation]) -> Estimate {
        let accuracy = accuracy_radius_m(observations.iter().map(Observation::rssi_dbm));

        // A model distance that overflowed carries no geometry
        let usable: Vec<(GeoPoint, &Observation)> = observations
            .iter()
            .filter_map(|obs| obs.position().map(|position| (position, obs)))
            .filter(|(_, obs)| {
                let finite = obs.distance_m().is_finite();
                if !finite {
                    debug!(
                        id = %obs.id(),
                        rssi = obs.rssi_dbm(),
                        "Dropping anchor with unbounded distance"
                    );
                }
                finite
            })
            .collect();

        let Some(frame) = usable.first().map(|(position, _)| LocalFrame::new(*position)) else {
            return Estimate {
                accuracy_radius_m: accuracy,
                ..Estimate::empty()
            };
        };

        let anchors: Vec<Anchor> = usable
            .iter()
            .map(|(position, obs)| Anchor {
                position: *position,
                local: frame.to_local(position),
                radius_m: self.floor_distance(obs.distance_m()),
                rssi_dbm: obs.rssi_dbm(),
            })
            .collect();

        let (method, candidates) = if anchors.len() == 1 {
            (EstimateMethod::Ring, self.ring(&anchors[0]))
        } else {
            let intersections = self.intersections(&frame, &anchors);
            if intersections.is_empty() {
                debug!(
                    anchors = anchors.len(),
                    "No circles intersect, falling back to weighted centroid"
                );
                (EstimateMethod::Centroid, vec![self.centroid(&frame, &anchors)])
            } else {
                (EstimateMethod::Intersection, normalize(intersections))
            }
        };

        let best = best_estimate(&candidates);
        trace!(?method, candidates = candidates.len(), "Estimation run complete");

        Estimate {
            candidates,
            best,
            method,
            anchors_used: anchors.len(),
            accuracy_radius_m: accuracy,
            bounds: Some(bounds(&anchors)),
        }
    }

    /// Distances at or below the floor are a model artifact, not caller error.
    fn floor_distance(&self, distance_m: f64) -> f64 {
        distance_m.max(self.min_distance_m)
    }

    fn ring(&self, anchor: &Anchor) -> Vec<WeightedLocation> {
        let step = 360.0 / self.ring_samples as f64;
        let weight = 1.0 / self.ring_samples as f64;
        (0..self.ring_samples)
            .map(|i| {
                let location = anchor.position.destination(anchor.radius_m, i as f64 * step);
                WeightedLocation::new(location, weight)
            })
            .collect()
    }

    /// Raw (unnormalised) weighted intersection points of every anchor pair.
    fn intersections(&self, frame: &LocalFrame, anchors: &[Anchor]) -> Vec<WeightedLocation> {
        let hull = self.anchor_hull(anchors);
        let mut points = Vec::new();

        for (i, first) in anchors.iter().enumerate() {
            for second in &anchors[i + 1..] {
                for local in
                    circle_intersections(first.local, first.radius_m, second.local, second.radius_m)
                {
                    let location = frame.to_geo(&local);
                    let mut weight = consistency_weight(&location, anchors);
                    if let Some(hull) = &hull {
                        if !hull.intersects(&Point::new(local.x, local.y)) {
                            weight *= self.outside_hull_weight;
                        }
                    }
                    points.push(WeightedLocation::new(location, weight));
                }
            }
        }

        points
    }

    /// Convex hull of the anchors in the local plane, when it can matter.
    fn anchor_hull(&self, anchors: &[Anchor]) -> Option<Polygon<f64>> {
        if anchors.len() < 3 || self.outside_hull_weight >= 1.0 {
            return None;
        }
        let cloud: MultiPoint<f64> = anchors
            .iter()
            .map(|a| Point::new(a.local.x, a.local.y))
            .collect();
        Some(cloud.convex_hull())
    }

    fn centroid(&self, frame: &LocalFrame, anchors: &[Anchor]) -> WeightedLocation {
        let (sum, total) = anchors.iter().fold(
            (Vector2::zeros(), 0.0),
            |(sum, total): (Vector2<f64>, f64), anchor| {
                let w = (anchor.rssi_dbm as f64 / 20.0).exp();
                (sum + anchor.local * w, total + w)
            },
        );
        let center = if total > 0.0 && total.is_finite() {
            sum / total
        } else {
            debug!(total, "Degenerate centroid weights, using the plain mean");
            anchors.iter().map(|a| a.local).sum::<Vector2<f64>>() / anchors.len() as f64
        };
        WeightedLocation::new(frame.to_geo(&center), 1.0)
    }
}

/// Product over anchors of exp(-|actual - expected| / expected).
fn consistency_weight(location: &GeoPoint, anchors: &[Anchor]) -> f64 {
    anchors
        .iter()
        .map(|anchor| {
            let actual = location.distance_to(&anchor.position);
            (-(actual - anchor.radius_m).abs() / anchor.radius_m).exp()
        })
        .product()
}

/// Scales weights to sum to 1.0.
///
/// If every weight underflowed to zero the candidates share the mass evenly.
fn normalize(mut locations: Vec<WeightedLocation>) -> Vec<WeightedLocation> {
    let total: f64 = locations.iter().map(|l| l.weight).sum();
    if total > 0.0 && total.is_finite() {
        for location in &mut locations {
            location.weight /= total;
        }
    } else {
        debug!(total, "Degenerate candidate weights, using uniform weights");
        let uniform = 1.0 / locations.len() as f64;
        for location in &mut locations {
            location.weight = uniform;
        }
    }
    locations
}

fn bounds(anchors: &[Anchor]) -> Bounds {
    let max_distance = anchors.iter().map(|a| a.radius_m).fold(0.0, f64::max);
    let padding = max_distance * DEGREES_PER_METER;

    let mut b = Bounds {
        south: f64::MAX,
        west: f64::MAX,
        north: f64::MIN,
        east: f64::MIN,
    };
    for anchor in anchors {
        b.south = b.south.min(anchor.position.latitude());
        b.north = b.north.max(anchor.position.latitude());
        b.west = b.west.min(anchor.position.longitude());
        b.east = b.east.max(anchor.position.longitude());
    }

    Bounds {
        south: (b.south - padding).max(-90.0),
        west: (b.west - padding).max(-180.0),
        north: (b.north + padding).min(90.0),
        east: (b.east + padding).min(180.0),
    }
}
