//! End-to-end properties of the estimation pipeline.

use approx::assert_relative_eq;
use geo::{ConvexHull, Intersects, MultiPoint, Point};
use locafi_core::{
    ChangeDetector, EngineConfig, EstimateMethod, GeoPoint, Observation, SignalModel,
    SignalReading, TrilaterationEngine,
};
use proptest::prelude::*;

/// Observation whose derived distance is exactly `distance_m`.
fn at_distance(id: &str, lat: f64, lon: f64, distance_m: f64) -> Observation {
    let model = SignalModel::new(distance_m, -60.0, 2.7);
    Observation::new(
        SignalReading::new(id, -60, 0),
        Some(GeoPoint::new(lat, lon).unwrap()),
        &model,
    )
}

fn observation(id: &str, rssi_dbm: i32, position: Option<GeoPoint>) -> Observation {
    Observation::new(
        SignalReading::new(id, rssi_dbm, 0),
        position,
        &SignalModel::default(),
    )
}

#[test]
fn single_anchor_yields_uniform_ring() {
    let engine = TrilaterationEngine::default();
    let origin = GeoPoint::new(0.0, 0.0).unwrap();
    let candidates = engine.calculate_possible_locations(&[at_distance("ap", 0.0, 0.0, 100.0)]);

    assert_eq!(candidates.len(), 36);
    for candidate in &candidates {
        assert_relative_eq!(candidate.weight, 1.0 / 36.0, epsilon = 1e-9);
        assert_relative_eq!(candidate.location.distance_to(&origin), 100.0, epsilon = 1e-6);
    }
}

#[test]
fn intersection_points_lie_on_both_circles() {
    let engine = TrilaterationEngine::default();
    let a = GeoPoint::new(0.0, 0.0).unwrap();
    let b = GeoPoint::new(0.0, 0.001).unwrap();
    let estimate = engine.estimate(&[
        at_distance("a", 0.0, 0.0, 70.0),
        at_distance("b", 0.0, 0.001, 60.0),
    ]);

    assert_eq!(estimate.method, EstimateMethod::Intersection);
    assert_eq!(estimate.candidates.len(), 2);
    for candidate in &estimate.candidates {
        assert!((candidate.location.distance_to(&a) - 70.0).abs() < 0.1);
        assert!((candidate.location.distance_to(&b) - 60.0).abs() < 0.1);
    }
    // Mirror images across the center line weigh the same
    assert_relative_eq!(estimate.candidates[0].weight, 0.5, epsilon = 1e-6);
}

#[test]
fn three_anchor_estimate_stays_inside_hull() {
    let engine = TrilaterationEngine::default();
    let estimate = engine.estimate(&[
        at_distance("a", 0.0, 0.0, 50.0),
        at_distance("b", 0.0, 0.001, 60.0),
        at_distance("c", 0.001, 0.0, 55.0),
    ]);

    assert!(!estimate.is_empty());
    assert_relative_eq!(estimate.total_weight(), 1.0, epsilon = 1e-9);
    assert_eq!(estimate.anchors_used, 3);

    let hull = MultiPoint::from(vec![
        Point::new(0.0, 0.0),
        Point::new(0.001, 0.0),
        Point::new(0.0, 0.001),
    ])
    .convex_hull();
    let best: Point<f64> = estimate.best.unwrap().into();
    assert!(hull.intersects(&best), "{:?} outside anchor hull", best);
}

#[test]
fn unpositioned_observations_do_not_anchor() {
    let engine = TrilaterationEngine::default();
    let estimate = engine.estimate(&[observation("loose", -50, None)]);
    assert!(estimate.is_empty());
    assert_eq!(estimate.best, None);
    // Still contributes to the display radius
    assert_relative_eq!(estimate.accuracy_radius_m, 15.0, epsilon = 1e-9);
}

#[test]
fn change_detector_threshold_is_exclusive() {
    let position = Some(GeoPoint::new(0.0, 0.0).unwrap());
    let base = vec![observation("a", -60, position), observation("b", -70, None)];

    let mut detector = ChangeDetector::default();
    assert!(detector.evaluate(&base, 0).is_accepted());
    assert!(!detector.evaluate(&base, 1).is_accepted());

    let four = vec![observation("a", -64, position), observation("b", -70, None)];
    assert!(!detector.evaluate(&four, 2).is_accepted());

    let six = vec![observation("a", -66, position), observation("b", -70, None)];
    assert!(detector.evaluate(&six, 3).is_accepted());
}

#[test]
fn staleness_resets_detector() {
    let config = EngineConfig::default();
    let set = vec![observation("a", -60, None)];

    let mut detector = ChangeDetector::new(&config);
    assert!(detector.evaluate(&set, 1_000).is_accepted());
    assert!(!detector.evaluate(&set, 1_000 + config.staleness_window_ms).is_accepted());
    assert!(detector
        .evaluate(&set, 1_001 + 2 * config.staleness_window_ms)
        .is_accepted());
}

fn anchor_set() -> impl Strategy<Value = Vec<(f64, f64, i32)>> {
    prop::collection::vec((-0.002f64..0.002, -0.002f64..0.002, -95i32..-35), 1..6)
}

proptest! {
    #[test]
    fn candidate_weights_sum_to_one(anchors in anchor_set()) {
        let engine = TrilaterationEngine::default();
        let observations: Vec<Observation> = anchors
            .iter()
            .enumerate()
            .map(|(i, (lat, lon, rssi))| {
                observation(&format!("ap-{}", i), *rssi, Some(GeoPoint::new(*lat, *lon).unwrap()))
            })
            .collect();

        let estimate = engine.estimate(&observations);
        prop_assert!(!estimate.is_empty());
        prop_assert!((estimate.total_weight() - 1.0).abs() < 1e-9);
        prop_assert!(estimate.candidates.iter().all(|c| c.weight >= 0.0));
        prop_assert!(estimate.best.is_some());
    }

    #[test]
    fn identical_scan_never_updates_twice(rssi in -100i32..-20, dt in 0u64..30_000) {
        let set = vec![observation("a", rssi, None)];
        let mut detector = ChangeDetector::default();
        prop_assert!(detector.evaluate(&set, 0).is_accepted());
        prop_assert!(!detector.evaluate(&set, dt).is_accepted());
    }
}
