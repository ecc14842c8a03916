//! Scenario runner - drives a tracking session through simulated scans.

use locafi_core::{
    AccuracyReport, ChangeReason, CoreError, EngineConfig, EstimateMethod, GeoPoint,
    ReferenceUpdate, SessionUpdate, TrackingSession,
};
use locafi_env::{AccessPointId, EnvError, LocaFiContext, ScanController, SessionId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{LatLon, SimEvent, SimExport, SimFrame};
use crate::oracle::Oracle;
use crate::scanner::SimScanner;
use crate::scenarios::ScenarioId;

/// Every scenario runs at least this many scan cycles.
const MIN_SCANS: u64 = 12;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    pub total_scans: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Scans fed to the session
    pub scans: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub stale_resets: u64,
    pub topology_changes: u64,
    pub signal_changes: u64,

    /// Transient scan failures the session retried past
    pub scan_failures: u64,

    pub references_applied: u64,
    pub references_rejected: u64,

    /// Accepted estimates that were a single-anchor ring
    pub ring_estimates: u64,

    /// Estimate vs ground truth
    pub mean_error_m: Option<f64>,
    pub p95_error_m: Option<f64>,
    pub max_error_m: Option<f64>,

    /// Estimate vs reference fix
    pub comparisons: usize,
    pub mean_separation_m: Option<f64>,
}

/// Something the harness does to the world before a given scan.
#[derive(Debug, Clone)]
enum PlanEvent {
    Hide(AccessPointId),
    HealAll,
    RadioTimeout,
    Pause(Duration),
}

/// World setup and schedule for one scenario.
struct ScenarioPlan {
    oracle: Oracle,

    /// (scan index, event)
    events: Vec<(u64, PlanEvent)>,

    /// Reference fix every `n` scans, cycling through these accuracies
    reference_every: Option<u64>,
    reference_accuracies_m: Vec<f64>,
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    seed: u64,
    config: EngineConfig,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    scan_interval: Duration,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: EngineConfig::default(),
            max_duration_secs: 60.0,
            scan_interval: Duration::from_secs(1),
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn total_scans(&self) -> u64 {
        let interval_secs = self.scan_interval.as_secs_f64().max(1e-3);
        ((self.max_duration_secs / interval_secs) as u64).max(MIN_SCANS)
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        self.execute(scenario, None)
    }

    /// Runs a scenario, recording one frame per scan.
    pub fn run_recorded(
        &self,
        scenario: ScenarioId,
    ) -> Result<(ScenarioResult, SimExport), SimError> {
        let mut export = SimExport::new(scenario.name(), self.seed);
        let result = self.execute(scenario, Some(&mut export))?;
        export.finalize(
            result.passed,
            result.failure_reason.clone(),
            result.metrics.mean_error_m,
        );
        Ok((result, export))
    }

    fn execute(
        &self,
        scenario: ScenarioId,
        mut export: Option<&mut SimExport>,
    ) -> Result<ScenarioResult, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        // Physics seed derived separately so noise does not track the session seed
        let physics_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let context = SimContext::shared(self.seed);
        let scanner = SimScanner::with_clock((*context).clone());
        let controller = scanner.controller();

        let mut plan = self.plan(scenario, physics_seed)?;
        let directory = plan.oracle.directory();
        let mut session = TrackingSession::new(Arc::clone(&context), self.config.clone())?
            .with_session_id(SessionId::from_seed(self.seed));

        if let Some(export) = export.as_deref_mut() {
            export.access_points = plan
                .oracle
                .access_points()
                .iter()
                .map(|ap| (ap.id.to_string(), LatLon::from(ap.position)))
                .collect();
        }

        let total_scans = self.total_scans();
        let dt = self.scan_interval.as_secs_f64();
        let mut metrics = ScenarioMetrics::default();
        let mut errors = AccuracyReport::new();

        for scan in 0..total_scans {
            if scan > 0 {
                plan.oracle.step(dt);
                context.advance_time(self.scan_interval);
            }

            let mut events = Vec::new();
            for (_, event) in plan.events.iter().filter(|(at, _)| *at == scan) {
                match event {
                    PlanEvent::Hide(id) => {
                        controller.set_visible(id, false);
                        events.push(SimEvent::info(format!("{} hidden", id)));
                    }
                    PlanEvent::HealAll => {
                        controller.heal_all();
                        events.push(SimEvent::info("faults healed"));
                    }
                    PlanEvent::RadioTimeout => {
                        let timeout_ms = self.scan_interval.as_millis() as u64;
                        scanner.push_failure(EnvError::Timeout(timeout_ms));
                        events.push(SimEvent::warn("radio timeout"));
                    }
                    PlanEvent::Pause(pause) => {
                        context.advance_time(*pause);
                        plan.oracle.step(pause.as_secs_f64());
                        events.push(SimEvent::info(format!("scanning paused {:?}", pause)));
                    }
                }
            }

            let now_ms = context.now_ms();
            let mut reference = None;
            if let Some(every) = plan.reference_every {
                if scan % every == 0 && !plan.reference_accuracies_m.is_empty() {
                    let idx = ((scan / every) as usize) % plan.reference_accuracies_m.len();
                    let fix = plan.oracle.reference_fix(now_ms, plan.reference_accuracies_m[idx]);
                    match session.update_reference(&fix)? {
                        ReferenceUpdate::Applied { .. } => {
                            metrics.references_applied += 1;
                            reference = Some(LatLon::from(GeoPoint::try_from(fix.position)?));
                        }
                        ReferenceUpdate::TooInaccurate { accuracy_m, limit_m } => {
                            debug!(accuracy_m, limit_m, "Reference fix rejected");
                            metrics.references_rejected += 1;
                        }
                        ReferenceUpdate::Disabled => {}
                    }
                }
            }

            scanner.push(plan.oracle.generate_scan(now_ms));
            let truth = plan.oracle.device_position();

            loop {
                let update = match scanner.poll_scan() {
                    Ok(Some(batch)) => session.process_scan(&batch, &directory)?,
                    Ok(None) => break,
                    Err(e) if e.is_transient() => {
                        warn!(error = %e, "Scan failed");
                        metrics.scan_failures += 1;
                        session.expire_if_stale();
                        continue;
                    }
                    Err(e) => return Err(CoreError::from(e).into()),
                };

                self.tally(&update, &mut metrics);
                let best = update.estimate.as_ref().and_then(|e| e.best);
                if let Some(best) = best {
                    errors.record(truth.distance_to(&best));
                }

                if let Some(export) = export.as_deref_mut() {
                    export.add_frame(SimFrame {
                        time_sec: now_ms as f64 / 1000.0,
                        truth: truth.into(),
                        estimate: best.map(LatLon::from),
                        candidates: update.estimate.as_ref().map_or(0, |e| e.candidates.len()),
                        accuracy_radius_m: update.estimate.as_ref().map(|e| e.accuracy_radius_m),
                        updated: update.updated,
                        reason: update.decision.reason().map(|r| format!("{:?}", r)),
                        reference: reference.take(),
                        separation_m: update.comparison.and_then(|c| c.separation_m),
                        events: std::mem::take(&mut events),
                    });
                }
            }

            if scan % 10 == 0 {
                debug!(
                    "  t={:.1}s | accepted={} | rejected={}",
                    plan.oracle.time(),
                    metrics.accepted,
                    metrics.rejected
                );
            }
        }

        let stats = session.stats();
        metrics.stale_resets = stats.stale_resets;
        metrics.mean_error_m = errors.mean();
        metrics.p95_error_m = errors.p95();
        metrics.max_error_m = errors.max();
        let report = session.comparison().report();
        metrics.comparisons = report.count();
        metrics.mean_separation_m = report.mean();

        let failure_reason = self.check(scenario, &plan, &metrics);
        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed: failure_reason.is_none(),
            total_scans,
            final_time_secs: context.now().as_secs_f64(),
            failure_reason,
            metrics,
        })
    }

    fn tally(&self, update: &SessionUpdate, metrics: &mut ScenarioMetrics) {
        metrics.scans += 1;
        if !update.updated {
            metrics.rejected += 1;
            return;
        }
        metrics.accepted += 1;
        match update.decision.reason() {
            Some(ChangeReason::TopologyChange { .. }) => metrics.topology_changes += 1,
            Some(ChangeReason::SignalChange { .. }) => metrics.signal_changes += 1,
            _ => {}
        }
        if let Some(estimate) = &update.estimate {
            if estimate.method == EstimateMethod::Ring
                && estimate.candidates.len() == self.config.ring_samples
            {
                metrics.ring_estimates += 1;
            }
        }
    }

    fn plan(&self, scenario: ScenarioId, physics_seed: u64) -> Result<ScenarioPlan, SimError> {
        let origin = GeoPoint::new(52.5200, 13.4050)?;
        let mut oracle = Oracle::new(physics_seed, origin, self.config.signal_model());
        let total = self.total_scans();
        let mut events = Vec::new();
        let mut reference_every = Some(5);
        let mut reference_accuracies_m = vec![5.0];

        match scenario {
            ScenarioId::StaticDevice => {
                square(&mut oracle, 25.0);
                oracle.place_device(6.0, -4.0);
            }
            ScenarioId::Walk => {
                for (i, east) in [-40.0, 0.0, 40.0].into_iter().enumerate() {
                    oracle.add_access_point(&format!("grid-n{}", i), east, 25.0);
                    oracle.add_access_point(&format!("grid-s{}", i), east, -25.0);
                }
                oracle.place_device(-30.0, 0.0);
                oracle.set_velocity(1.2, 0.0);
                oracle.set_patrol(30.0);
            }
            ScenarioId::SingleAp => {
                oracle.add_access_point("lonely", 0.0, 0.0);
                oracle.add_access_point("distant", 0.0, 5_000.0);
                oracle.add_unsurveyed_access_point("neighbour", -12.0, 8.0);
                oracle.place_device(15.0, 5.0);
            }
            ScenarioId::ApOutage => {
                let ids = square(&mut oracle, 25.0);
                oracle.place_device(-3.0, 8.0);
                events.push((total / 2, PlanEvent::Hide(ids[0].clone())));
                events.push((total / 2 + 1, PlanEvent::RadioTimeout));
                events.push((3 * total / 4, PlanEvent::HealAll));
            }
            ScenarioId::StaleGap => {
                square(&mut oracle, 25.0);
                oracle.place_device(2.0, 2.0);
                oracle.set_shadowing(0.0)?;
                reference_every = None;
                let gap =
                    Duration::from_millis(self.config.staleness_window_ms) + self.scan_interval;
                events.push((total / 2, PlanEvent::Pause(gap)));
            }
            ScenarioId::NoisyReference => {
                square(&mut oracle, 25.0);
                oracle.place_device(-6.0, -6.0);
                reference_every = Some(2);
                reference_accuracies_m = vec![5.0, 40.0];
            }
        }

        Ok(ScenarioPlan {
            oracle,
            events,
            reference_every,
            reference_accuracies_m,
        })
    }

    /// Returns the first violated expectation, if any.
    fn check(
        &self,
        scenario: ScenarioId,
        plan: &ScenarioPlan,
        m: &ScenarioMetrics,
    ) -> Option<String> {
        if m.accepted == 0 {
            return Some("no scan was ever accepted".to_string());
        }
        if m.accepted + m.rejected != m.scans {
            return Some(format!(
                "{} accepted + {} rejected != {} scans",
                m.accepted, m.rejected, m.scans
            ));
        }

        let mean_error = m.mean_error_m.unwrap_or(f64::INFINITY);
        match scenario {
            ScenarioId::StaticDevice if mean_error >= 25.0 => {
                Some(format!("mean error {:.2}m exceeds 25m", mean_error))
            }
            ScenarioId::Walk if mean_error >= 30.0 => {
                Some(format!("mean error {:.2}m exceeds 30m", mean_error))
            }
            ScenarioId::Walk if m.accepted < 2 => {
                Some("estimate never followed the device".to_string())
            }
            ScenarioId::SingleAp if m.ring_estimates != m.accepted => Some(format!(
                "{} of {} accepted estimates were not rings",
                m.accepted - m.ring_estimates,
                m.accepted
            )),
            ScenarioId::ApOutage if m.topology_changes < 2 => Some(format!(
                "expected outage and recovery, saw {} topology changes",
                m.topology_changes
            )),
            ScenarioId::ApOutage if m.scan_failures != 1 => {
                Some(format!("expected 1 scan failure, saw {}", m.scan_failures))
            }
            ScenarioId::StaleGap if m.stale_resets == 0 => {
                Some("gap did not reset the session".to_string())
            }
            ScenarioId::StaleGap if m.accepted != 1 + m.stale_resets => Some(format!(
                "{} accepted scans without a signal change (stale resets: {})",
                m.accepted, m.stale_resets
            )),
            ScenarioId::NoisyReference => {
                let (applied, rejected) = self.expected_references(plan);
                if m.references_applied != applied || m.references_rejected != rejected {
                    Some(format!(
                        "references applied/rejected {}/{}, expected {}/{}",
                        m.references_applied, m.references_rejected, applied, rejected
                    ))
                } else if m.comparisons == 0 {
                    Some("no estimate was ever compared".to_string())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn expected_references(&self, plan: &ScenarioPlan) -> (u64, u64) {
        let Some(every) = plan.reference_every else {
            return (0, 0);
        };
        let mut applied = 0;
        let mut rejected = 0;
        for k in 0..self.total_scans().div_ceil(every) {
            let accuracies = &plan.reference_accuracies_m;
            let accuracy = accuracies[(k as usize) % accuracies.len()];
            if accuracy <= self.config.max_reference_accuracy_m {
                applied += 1;
            } else {
                rejected += 1;
            }
        }
        (applied, rejected)
    }
}

/// Four surveyed access points at the corners of a square.
fn square(oracle: &mut Oracle, half_side_m: f64) -> Vec<AccessPointId> {
    [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
        .into_iter()
        .enumerate()
        .map(|(i, (e, n))| {
            oracle.add_access_point(&format!("corner-{}", i), e * half_side_m, n * half_side_m)
        })
        .collect()
}
