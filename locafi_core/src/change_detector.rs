//! Change detection: decides when a fresh scan is worth re-estimating.
//!
//! Scans arrive roughly once a second and most of them differ from the last
//! one only by noise. The detector owns the session's [`EstimationState`] and
//! accepts a new observation set only when:
//!
//! 1. there is no prior state (first scan, or the old one went stale),
//! 2. an access point appeared or disappeared, or
//! 3. some access point's rssi moved by more than the threshold.
//!
//! Everything else is rejected and leaves the state untouched.

use locafi_env::AccessPointId;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::config::EngineConfig;
use crate::observation::Observation;

/// Lifecycle of the estimation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingPhase {
    /// No accepted observation set
    Empty,
    /// Holds the last accepted set
    Tracking,
}

/// Why an observation set was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeReason {
    /// Nothing to compare against yet
    FirstObservation,

    /// Previous state exceeded the staleness window and was dropped
    StaleReset,

    /// The set of visible access points changed
    TopologyChange {
        appeared: Vec<AccessPointId>,
        disappeared: Vec<AccessPointId>,
    },

    /// A common access point's signal moved past the threshold
    SignalChange {
        id: AccessPointId,
        previous_dbm: i32,
        current_dbm: i32,
    },
}

/// Outcome of evaluating one observation set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Accepted { reason: ChangeReason },
    Rejected,
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted { .. })
    }

    pub fn reason(&self) -> Option<&ChangeReason> {
        match self {
            Decision::Accepted { reason } => Some(reason),
            Decision::Rejected => None,
        }
    }
}

/// Per-session memory of the last accepted scan.
///
/// Only [`ChangeDetector`] mutates this; everybody else sees `&` borrows or
/// owned [`EstimationSnapshot`]s.
#[derive(Debug, Clone, Default)]
pub struct EstimationState {
    observations: Vec<Observation>,
    last_rssi: HashMap<AccessPointId, i32>,
    last_quality: HashMap<AccessPointId, u8>,
    last_update_ms: Option<u64>,
}

impl EstimationState {
    pub fn new() -> Self {
        Self::default()
    }

    fn accepted(observations: &[Observation], now_ms: u64) -> Self {
        Self {
            observations: observations.to_vec(),
            last_rssi: observations
                .iter()
                .map(|o| (o.id().clone(), o.rssi_dbm()))
                .collect(),
            last_quality: observations
                .iter()
                .map(|o| (o.id().clone(), o.quality_level()))
                .collect(),
            last_update_ms: Some(now_ms),
        }
    }

    pub fn phase(&self) -> TrackingPhase {
        if self.last_update_ms.is_some() {
            TrackingPhase::Tracking
        } else {
            TrackingPhase::Empty
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn last_rssi(&self, id: &AccessPointId) -> Option<i32> {
        self.last_rssi.get(id).copied()
    }

    pub fn last_quality(&self, id: &AccessPointId) -> Option<u8> {
        self.last_quality.get(id).copied()
    }

    pub fn last_update_ms(&self) -> Option<u64> {
        self.last_update_ms
    }

    /// True once more than `window_ms` has passed since the last acceptance.
    pub fn is_stale(&self, now_ms: u64, window_ms: u64) -> bool {
        self.last_update_ms
            .is_some_and(|last| now_ms.saturating_sub(last) > window_ms)
    }

    pub fn snapshot(&self) -> EstimationSnapshot {
        EstimationSnapshot {
            phase: self.phase(),
            observations: self.observations.clone(),
            last_update_ms: self.last_update_ms,
        }
    }
}

/// Owned, read-only copy of the state for readers outside the detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimationSnapshot {
    pub phase: TrackingPhase,
    pub observations: Vec<Observation>,
    pub last_update_ms: Option<u64>,
}

/// Gatekeeper for re-estimation and sole writer of [`EstimationState`].
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    state: EstimationState,
    rssi_threshold_dbm: u32,
    staleness_window_ms: u64,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ChangeDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: EstimationState::new(),
            rssi_threshold_dbm: config.rssi_change_threshold_dbm,
            staleness_window_ms: config.staleness_window_ms,
        }
    }

    pub fn state(&self) -> &EstimationState {
        &self.state
    }

    pub fn snapshot(&self) -> EstimationSnapshot {
        self.state.snapshot()
    }

    /// Drops the state if it went stale. Returns whether it did.
    pub fn expire_if_stale(&mut self, now_ms: u64) -> bool {
        if self.state.is_stale(now_ms, self.staleness_window_ms) {
            debug!(
                last_update_ms = ?self.state.last_update_ms,
                now_ms,
                "Estimation state stale, resetting"
            );
            self.reset();
            true
        } else {
            false
        }
    }

    /// Ends the session's state explicitly.
    pub fn reset(&mut self) {
        self.state = EstimationState::new();
    }

    /// Evaluates a new observation set, replacing the state on acceptance.
    pub fn evaluate(&mut self, observations: &[Observation], now_ms: u64) -> Decision {
        let expired = self.expire_if_stale(now_ms);

        let reason = if self.state.phase() == TrackingPhase::Empty {
            Some(if expired {
                ChangeReason::StaleReset
            } else {
                ChangeReason::FirstObservation
            })
        } else {
            self.topology_change(observations)
                .or_else(|| self.signal_change(observations))
        };

        match reason {
            Some(reason) => {
                debug!(?reason, count = observations.len(), "Observation set accepted");
                self.state = EstimationState::accepted(observations, now_ms);
                Decision::Accepted { reason }
            }
            None => Decision::Rejected,
        }
    }

    fn topology_change(&self, observations: &[Observation]) -> Option<ChangeReason> {
        let previous: HashSet<&AccessPointId> = self.state.last_rssi.keys().collect();
        let current: HashSet<&AccessPointId> = observations.iter().map(Observation::id).collect();

        if previous == current {
            return None;
        }

        let appeared: BTreeSet<AccessPointId> =
            current.difference(&previous).map(|id| (*id).clone()).collect();
        let disappeared: BTreeSet<AccessPointId> =
            previous.difference(&current).map(|id| (*id).clone()).collect();

        Some(ChangeReason::TopologyChange {
            appeared: appeared.into_iter().collect(),
            disappeared: disappeared.into_iter().collect(),
        })
    }

    fn signal_change(&self, observations: &[Observation]) -> Option<ChangeReason> {
        observations.iter().find_map(|obs| {
            let previous = self.state.last_rssi(obs.id())?;
            let delta = obs.rssi_dbm().abs_diff(previous);
            (delta > self.rssi_threshold_dbm).then(|| {
                debug!(
                    id = %obs.id(),
                    previous,
                    current = obs.rssi_dbm(),
                    "RSSI change detected"
                );
                ChangeReason::SignalChange {
                    id: obs.id().clone(),
                    previous_dbm: previous,
                    current_dbm: obs.rssi_dbm(),
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::SignalReading;
    use crate::signal::SignalModel;

    fn scan(readings: &[(&str, i32)], at_ms: u64) -> Vec<Observation> {
        let model = SignalModel::default();
        readings
            .iter()
            .map(|(id, rssi)| Observation::new(SignalReading::new(*id, *rssi, at_ms), None, &model))
            .collect()
    }

    #[test]
    fn test_first_observation_always_accepted() {
        let mut detector = ChangeDetector::default();
        assert_eq!(detector.state().phase(), TrackingPhase::Empty);

        let decision = detector.evaluate(&scan(&[("a", -60)], 0), 0);
        assert_eq!(
            decision,
            Decision::Accepted {
                reason: ChangeReason::FirstObservation
            }
        );
        assert_eq!(detector.state().phase(), TrackingPhase::Tracking);
        assert_eq!(detector.state().last_rssi(&"a".into()), Some(-60));
        assert_eq!(detector.state().last_quality(&"a".into()), Some(3));
        assert_eq!(detector.state().last_update_ms(), Some(0));
    }

    #[test]
    fn test_identical_scan_rejected() {
        let mut detector = ChangeDetector::default();
        let readings = [("a", -60), ("b", -70)];
        assert!(detector.evaluate(&scan(&readings, 0), 0).is_accepted());
        assert_eq!(detector.evaluate(&scan(&readings, 1_000), 1_000), Decision::Rejected);
        // Rejection leaves the timestamp alone
        assert_eq!(detector.state().last_update_ms(), Some(0));
    }

    #[test]
    fn test_rssi_threshold_is_exclusive() {
        let mut detector = ChangeDetector::default();
        detector.evaluate(&scan(&[("a", -60), ("b", -70)], 0), 0);

        assert_eq!(
            detector.evaluate(&scan(&[("a", -64), ("b", -70)], 100), 100),
            Decision::Rejected
        );
        assert_eq!(
            detector.evaluate(&scan(&[("a", -65), ("b", -70)], 200), 200),
            Decision::Rejected
        );

        let decision = detector.evaluate(&scan(&[("a", -54), ("b", -70)], 300), 300);
        assert_eq!(
            decision.reason(),
            Some(&ChangeReason::SignalChange {
                id: "a".into(),
                previous_dbm: -60,
                current_dbm: -54,
            })
        );
        assert_eq!(detector.state().last_rssi(&"a".into()), Some(-54));
    }

    #[test]
    fn test_topology_change() {
        let mut detector = ChangeDetector::default();
        detector.evaluate(&scan(&[("a", -60), ("b", -70)], 0), 0);

        let decision = detector.evaluate(&scan(&[("a", -60), ("c", -75)], 500), 500);
        assert_eq!(
            decision.reason(),
            Some(&ChangeReason::TopologyChange {
                appeared: vec!["c".into()],
                disappeared: vec!["b".into()],
            })
        );
        assert_eq!(detector.state().last_rssi(&"b".into()), None);
        assert_eq!(detector.state().observations().len(), 2);
    }

    #[test]
    fn test_staleness_resets_state() {
        let mut detector = ChangeDetector::default();
        let readings = [("a", -60)];
        detector.evaluate(&scan(&readings, 0), 0);

        // Exactly at the window is not yet stale
        assert_eq!(detector.evaluate(&scan(&readings, 30_000), 30_000), Decision::Rejected);

        let decision = detector.evaluate(&scan(&readings, 30_001), 30_001);
        assert_eq!(decision.reason(), Some(&ChangeReason::StaleReset));
        assert_eq!(detector.state().last_update_ms(), Some(30_001));
    }

    #[test]
    fn test_expire_without_scan() {
        let mut detector = ChangeDetector::default();
        detector.evaluate(&scan(&[("a", -60)], 0), 0);
        assert!(!detector.expire_if_stale(10_000));
        assert!(detector.expire_if_stale(40_000));
        assert_eq!(detector.state().phase(), TrackingPhase::Empty);
        assert!(detector.state().observations().is_empty());
    }

    #[test]
    fn test_empty_scan_after_tracking_is_topology_change() {
        let mut detector = ChangeDetector::default();
        detector.evaluate(&scan(&[("a", -60)], 0), 0);
        let decision = detector.evaluate(&[], 100);
        assert_eq!(
            decision.reason(),
            Some(&ChangeReason::TopologyChange {
                appeared: vec![],
                disappeared: vec!["a".into()],
            })
        );
        assert_eq!(detector.evaluate(&[], 200), Decision::Rejected);
    }

    #[test]
    fn test_custom_threshold() {
        let config = EngineConfig {
            rssi_change_threshold_dbm: 2,
            ..EngineConfig::default()
        };
        let mut detector = ChangeDetector::new(&config);
        detector.evaluate(&scan(&[("a", -60)], 0), 0);
        assert!(detector.evaluate(&scan(&[("a", -63)], 10), 10).is_accepted());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut detector = ChangeDetector::default();
        detector.evaluate(&scan(&[("a", -60)], 0), 0);
        let snapshot = detector.snapshot();

        detector.reset();
        assert_eq!(snapshot.phase, TrackingPhase::Tracking);
        assert_eq!(snapshot.observations.len(), 1);
        assert_eq!(detector.state().phase(), TrackingPhase::Empty);
    }
}
