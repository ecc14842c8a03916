//! Accuracy reporting against a satellite-derived reference fix.
//!
//! The tracker holds at most one reference and one estimate and recomputes
//! their great-circle separation from scratch whenever either one changes.
//! Every separation it computes also lands in an [`AccuracyReport`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::config::EngineConfig;
use crate::geodesy::GeoPoint;

/// Reference and estimate side by side.
///
/// `separation_m` is `None` unless both endpoints are present; a missing
/// endpoint is "no comparison", never a zero distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub reference: Option<GeoPoint>,
    pub estimate: Option<GeoPoint>,
    pub separation_m: Option<f64>,
}

/// Outcome of offering a new reference fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceUpdate {
    /// Stored; carries the new separation if an estimate is present
    Applied { separation_m: Option<f64> },
    /// Reported accuracy too coarse to judge the estimate against
    TooInaccurate { accuracy_m: f64, limit_m: f64 },
    /// Comparison is switched off
    Disabled,
}

/// Separations kept by an [`AccuracyReport`].
pub const REPORT_WINDOW: usize = 1_000;

/// Rolling statistics over the most recent separations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccuracyReport {
    samples: VecDeque<f64>,
}

impl AccuracyReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a separation, evicting the oldest once the window is full.
    pub fn record(&mut self, separation_m: f64) {
        if self.samples.len() == REPORT_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(separation_m);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.samples.is_empty())
            .then(|| self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Root mean square separation
    pub fn rmse(&self) -> Option<f64> {
        (!self.samples.is_empty()).then(|| {
            let sum_squared: f64 = self.samples.iter().map(|s| s * s).sum();
            (sum_squared / self.samples.len() as f64).sqrt()
        })
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.iter().copied().min_by(f64::total_cmp)
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.iter().copied().max_by(f64::total_cmp)
    }

    /// 95th percentile separation
    pub fn p95(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let idx = ((0.95 * sorted.len() as f64) as usize).min(sorted.len() - 1);
        Some(sorted[idx])
    }
}

/// Holds a reference fix and an estimate and reports how far apart they are.
#[derive(Debug, Clone)]
pub struct ComparisonTracker {
    enabled: bool,
    reference: Option<GeoPoint>,
    estimate: Option<GeoPoint>,
    separation_m: Option<f64>,
    max_reference_accuracy_m: f64,
    report: AccuracyReport,
    /// Pair behind the newest report sample
    last_recorded: Option<(GeoPoint, GeoPoint)>,
}

impl Default for ComparisonTracker {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ComparisonTracker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            enabled: true,
            reference: None,
            estimate: None,
            separation_m: None,
            max_reference_accuracy_m: config.max_reference_accuracy_m,
            report: AccuracyReport::new(),
            last_recorded: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Switching comparison off forgets both endpoints and the report.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reference = None;
            self.estimate = None;
            self.separation_m = None;
            self.clear_report();
        }
    }

    pub fn update_reference(
        &mut self,
        reference: GeoPoint,
        accuracy_m: Option<f64>,
    ) -> ReferenceUpdate {
        if !self.enabled {
            return ReferenceUpdate::Disabled;
        }
        if let Some(accuracy_m) = accuracy_m {
            if !(accuracy_m <= self.max_reference_accuracy_m) {
                debug!(
                    accuracy_m,
                    limit_m = self.max_reference_accuracy_m,
                    "Reference fix too inaccurate"
                );
                return ReferenceUpdate::TooInaccurate {
                    accuracy_m,
                    limit_m: self.max_reference_accuracy_m,
                };
            }
        }
        self.reference = Some(reference);
        ReferenceUpdate::Applied {
            separation_m: self.recompute(),
        }
    }

    pub fn update_estimate(&mut self, estimate: GeoPoint) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        self.estimate = Some(estimate);
        self.recompute()
    }

    /// Forgets the estimate (e.g. when the session's fix went stale).
    pub fn clear_estimate(&mut self) {
        self.estimate = None;
        self.separation_m = None;
    }

    pub fn reference(&self) -> Option<GeoPoint> {
        self.reference
    }

    pub fn estimate(&self) -> Option<GeoPoint> {
        self.estimate
    }

    pub fn separation_m(&self) -> Option<f64> {
        self.separation_m
    }

    /// Current record, or `None` while comparison is disabled.
    pub fn record(&self) -> Option<ComparisonRecord> {
        self.enabled.then_some(ComparisonRecord {
            reference: self.reference,
            estimate: self.estimate,
            separation_m: self.separation_m,
        })
    }

    pub fn report(&self) -> &AccuracyReport {
        &self.report
    }

    pub fn clear_report(&mut self) {
        self.report.clear();
        self.last_recorded = None;
    }

    /// Recomputes the separation; only a new pair adds a report sample.
    fn recompute(&mut self) -> Option<f64> {
        self.separation_m = match (self.reference, self.estimate) {
            (Some(reference), Some(estimate)) => {
                let separation = reference.distance_to(&estimate);
                if self.last_recorded != Some((reference, estimate)) {
                    self.report.record(separation);
                    self.last_recorded = Some((reference, estimate));
                }
                Some(separation)
            }
            _ => None,
        };
        self.separation_m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn test_single_endpoint_has_no_separation() {
        let mut tracker = ComparisonTracker::default();
        assert_eq!(tracker.separation_m(), None);

        tracker.update_estimate(point(0.0, 0.0));
        let record = tracker.record().unwrap();
        assert_eq!(record.estimate, Some(point(0.0, 0.0)));
        assert_eq!(record.reference, None);
        assert_eq!(record.separation_m, None);
    }

    #[test]
    fn test_separation_recomputed_on_each_update() {
        let mut tracker = ComparisonTracker::default();
        let reference = point(0.0, 0.0);
        tracker.update_reference(reference, Some(5.0));

        let first = tracker.update_estimate(reference.destination(30.0, 90.0)).unwrap();
        assert_relative_eq!(first, 30.0, epsilon = 1e-6);

        let second = tracker.update_estimate(reference.destination(12.0, 180.0)).unwrap();
        assert_relative_eq!(second, 12.0, epsilon = 1e-6);

        match tracker.update_reference(reference.destination(12.0, 180.0), None) {
            ReferenceUpdate::Applied { separation_m } => {
                assert_relative_eq!(separation_m.unwrap(), 0.0, epsilon = 1e-9)
            }
            other => panic!("unexpected {:?}", other),
        }

        let report = tracker.report();
        assert_eq!(report.count(), 3);
        assert_relative_eq!(report.mean().unwrap(), 14.0, epsilon = 1e-6);
        assert_relative_eq!(report.max().unwrap(), 30.0, epsilon = 1e-6);
        assert_relative_eq!(report.min().unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inaccurate_reference_rejected() {
        let mut tracker = ComparisonTracker::default();
        let update = tracker.update_reference(point(1.0, 1.0), Some(45.0));
        assert_eq!(
            update,
            ReferenceUpdate::TooInaccurate {
                accuracy_m: 45.0,
                limit_m: 20.0
            }
        );
        assert_eq!(tracker.reference(), None);
        assert!(matches!(
            tracker.update_reference(point(1.0, 1.0), Some(f64::NAN)),
            ReferenceUpdate::TooInaccurate { .. }
        ));
    }

    #[test]
    fn test_disable_clears_and_blocks() {
        let mut tracker = ComparisonTracker::default();
        tracker.update_reference(point(0.0, 0.0), None);
        tracker.update_estimate(point(0.0, 0.001));
        assert!(tracker.separation_m().is_some());

        tracker.set_enabled(false);
        assert!(tracker.record().is_none());
        assert_eq!(tracker.update_estimate(point(0.0, 0.0)), None);
        assert_eq!(tracker.update_reference(point(0.0, 0.0), None), ReferenceUpdate::Disabled);

        tracker.set_enabled(true);
        let record = tracker.record().unwrap();
        assert_eq!(record.reference, None);
        assert_eq!(record.estimate, None);
        assert_eq!(tracker.report().count(), 0);
    }

    #[test]
    fn test_repeated_reference_counts_once() {
        let mut tracker = ComparisonTracker::default();
        let reference = point(0.0, 0.0);
        tracker.update_estimate(reference.destination(25.0, 0.0));
        for _ in 0..10_000 {
            tracker.update_reference(reference, Some(3.0));
        }
        assert_eq!(tracker.report().count(), 1);
        assert_relative_eq!(tracker.report().mean().unwrap(), 25.0, epsilon = 1e-6);

        // Same estimate accepted again: still the same pair
        tracker.update_estimate(reference.destination(25.0, 0.0));
        assert_eq!(tracker.report().count(), 1);

        tracker.clear_report();
        tracker.update_reference(reference, None);
        assert_eq!(tracker.report().count(), 1);
    }

    #[test]
    fn test_report_window_is_bounded() {
        let mut report = AccuracyReport::new();
        for i in 0..(REPORT_WINDOW + 500) {
            report.record(i as f64);
        }
        assert_eq!(report.count(), REPORT_WINDOW);
        assert_eq!(report.min(), Some(500.0));
        assert_eq!(report.max(), Some((REPORT_WINDOW + 499) as f64));
    }

    #[test]
    fn test_clear_estimate() {
        let mut tracker = ComparisonTracker::default();
        tracker.update_reference(point(0.0, 0.0), None);
        tracker.update_estimate(point(0.0, 0.001));
        tracker.clear_estimate();
        assert_eq!(tracker.separation_m(), None);
        assert_eq!(tracker.reference(), Some(point(0.0, 0.0)));
    }

    #[test]
    fn test_report_percentiles() {
        let mut report = AccuracyReport::new();
        assert_eq!(report.p95(), None);
        assert_eq!(report.rmse(), None);
        for i in 1..=20 {
            report.record(i as f64);
        }
        assert_eq!(report.p95(), Some(20.0));
        assert_relative_eq!(report.mean().unwrap(), 10.5, epsilon = 1e-12);
        assert_relative_eq!(report.rmse().unwrap(), (2870.0f64 / 20.0).sqrt(), epsilon = 1e-12);
    }
}
