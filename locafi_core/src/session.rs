//! Tracking Session - Orchestrates the engines for one device.
//!
//! This module is the integration layer between the pure engines (signal
//! model, change detector, trilateration, comparison) and the environment
//! abstraction (`LocaFiContext`, `ScanSource`, `AccessPointDirectory`).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TrackingSession                          │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │              Context: LocaFiContext                  │   │
//! │  │  • now() → staleness decisions                       │   │
//! │  │  • sleep() → back-off between failed scans           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │                              │                               │
//! │  ┌─────────┐ ┌──────────┐ ┌───────────────┐ ┌────────────┐  │
//! │  │ SIGNAL  │ │  CHANGE  │ │ TRILATERATION │ │ COMPARISON │  │
//! │  │  Model  │ │ Detector │ │    Engine     │ │  Tracker   │  │
//! │  └─────────┘ └──────────┘ └───────────────┘ └────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use locafi_core::{EngineConfig, TrackingSession};
//! use locafi_env::TokioContext;
//!
//! let mut session = TrackingSession::new(TokioContext::shared(), EngineConfig::default())?;
//! let update = session.process_scan(&batch, &directory)?;
//! if update.updated {
//!     render(update.estimate);
//! }
//! ```

use locafi_env::{
    AccessPointDirectory, LocaFiContext, ReferenceFix, ScanBatch, ScanSource, SessionId,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::change_detector::{ChangeDetector, ChangeReason, Decision, EstimationSnapshot};
use crate::comparison::{ComparisonRecord, ComparisonTracker, ReferenceUpdate};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::geodesy::GeoPoint;
use crate::observation::Observation;
use crate::signal::{SignalModel, PLAUSIBLE_RSSI_DBM};
use crate::trilateration::{Estimate, TrilaterationEngine};

/// Result of feeding one scan into a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUpdate {
    /// Whether the scan was significant enough to re-estimate
    pub updated: bool,

    pub decision: Decision,

    /// Latest estimate (fresh when `updated`, otherwise the previous one)
    pub estimate: Option<Arc<Estimate>>,

    /// Comparison against the reference fix, when comparison is enabled
    pub comparison: Option<ComparisonRecord>,

    /// Context time at which the scan was processed
    pub timestamp_ms: u64,
}

/// Immutable view of a session published after every accepted scan.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: EstimationSnapshot,
    pub estimate: Option<Arc<Estimate>>,
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionStats {
    pub scans: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub stale_resets: u64,
}

/// One tracking session: a single writer over its own estimation state.
///
/// Generic over the context so the same session runs in production
/// (tokio) or simulation (virtual clock).
pub struct TrackingSession<Ctx>
where
    Ctx: LocaFiContext,
{
    /// Session identifier
    pub session_id: SessionId,

    /// Environment context
    context: Arc<Ctx>,

    config: EngineConfig,
    model: SignalModel,
    detector: ChangeDetector,
    engine: TrilaterationEngine,
    comparison: ComparisonTracker,

    snapshot: Arc<SessionSnapshot>,
    stats: SessionStats,

    /// Back-off after a transient scan failure
    retry_delay: Duration,
}

impl<Ctx> TrackingSession<Ctx>
where
    Ctx: LocaFiContext,
{
    /// Creates a session after validating the configuration.
    pub fn new(context: Arc<Ctx>, config: EngineConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let session_id = SessionId::new();
        let detector = ChangeDetector::new(&config);

        Ok(Self {
            session_id,
            context,
            model: config.signal_model(),
            engine: TrilaterationEngine::new(&config),
            comparison: ComparisonTracker::new(&config),
            snapshot: Arc::new(SessionSnapshot {
                session_id,
                state: detector.snapshot(),
                estimate: None,
            }),
            detector,
            config,
            stats: SessionStats::default(),
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Replaces the random session id (deterministic ids in simulation).
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self.publish(self.snapshot.estimate.clone());
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn comparison(&self) -> &ComparisonTracker {
        &self.comparison
    }

    pub fn set_comparison_enabled(&mut self, enabled: bool) {
        self.comparison.set_enabled(enabled);
    }

    /// Latest published snapshot; never a reference into live state.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Validates a batch and joins it with known access point positions.
    pub fn observations_from<D>(
        &self,
        batch: &ScanBatch,
        directory: &D,
    ) -> Result<Vec<Observation>, CoreError>
    where
        D: AccessPointDirectory + ?Sized,
    {
        let mut seen = HashSet::with_capacity(batch.len());
        batch
            .readings
            .iter()
            .map(|raw| {
                if raw.id.is_empty() {
                    return Err(CoreError::malformed("reading with empty access point id"));
                }
                if !seen.insert(&raw.id) {
                    return Err(CoreError::malformed(format!(
                        "access point {} reported twice in one scan",
                        raw.id
                    )));
                }
                if !PLAUSIBLE_RSSI_DBM.contains(&raw.rssi_dbm) {
                    return Err(CoreError::malformed(format!(
                        "access point {} reported implausible rssi {} dBm",
                        raw.id, raw.rssi_dbm
                    )));
                }
                let position = directory
                    .position(&raw.id)
                    .map(GeoPoint::try_from)
                    .transpose()?;
                Ok(Observation::from_raw(raw, batch.timestamp_ms, position, &self.model))
            })
            .collect()
    }

    /// Feeds one completed scan through change detection and, if accepted,
    /// re-estimates the position.
    pub fn process_scan<D>(
        &mut self,
        batch: &ScanBatch,
        directory: &D,
    ) -> Result<SessionUpdate, CoreError>
    where
        D: AccessPointDirectory + ?Sized,
    {
        let observations = self.observations_from(batch, directory)?;
        let now_ms = self.context.now_ms();
        self.stats.scans += 1;

        let decision = self.detector.evaluate(&observations, now_ms);

        let estimate = if decision.is_accepted() {
            self.stats.accepted += 1;
            if decision.reason() == Some(&ChangeReason::StaleReset) {
                self.stats.stale_resets += 1;
            }

            let estimate = Arc::new(self.engine.estimate(&observations));
            match estimate.best {
                Some(best) => {
                    self.comparison.update_estimate(best);
                }
                None => self.comparison.clear_estimate(),
            }
            debug!(
                session = %self.session_id,
                candidates = estimate.candidates.len(),
                best = ?estimate.best,
                "Position re-estimated"
            );
            self.publish(Some(Arc::clone(&estimate)));
            Some(estimate)
        } else {
            self.stats.rejected += 1;
            self.snapshot.estimate.clone()
        };

        Ok(SessionUpdate {
            updated: decision.is_accepted(),
            decision,
            estimate,
            comparison: self.comparison.record(),
            timestamp_ms: now_ms,
        })
    }

    /// Offers a satellite reference fix to the comparison tracker.
    pub fn update_reference(&mut self, fix: &ReferenceFix) -> Result<ReferenceUpdate, CoreError> {
        let reference = GeoPoint::try_from(fix.position)?;
        Ok(self.comparison.update_reference(reference, fix.accuracy_m))
    }

    /// Drops state and cached estimate if no update was accepted recently.
    pub fn expire_if_stale(&mut self) -> bool {
        let expired = self.detector.expire_if_stale(self.context.now_ms());
        if expired {
            self.stats.stale_resets += 1;
            self.comparison.clear_estimate();
            self.publish(None);
        }
        expired
    }

    /// Ends the session explicitly; the next scan starts from scratch.
    pub fn end_session(&mut self) {
        debug!(session = %self.session_id, "Session ended");
        self.detector.reset();
        self.comparison.clear_estimate();
        self.comparison.clear_report();
        self.publish(None);
    }

    /// Pulls scans from `source` until it closes.
    ///
    /// Transient failures back off on the context clock; anything else ends
    /// the loop with an error. Returns the number of scans processed.
    pub async fn run<S, D, F>(
        &mut self,
        source: &S,
        directory: &D,
        mut on_update: F,
    ) -> Result<u64, CoreError>
    where
        S: ScanSource + ?Sized,
        D: AccessPointDirectory + ?Sized,
        F: FnMut(&SessionUpdate),
    {
        loop {
            match source.next_scan().await {
                Ok(Some(batch)) => {
                    let update = self.process_scan(&batch, directory)?;
                    on_update(&update);
                }
                Ok(None) => break,
                Err(e) if e.is_transient() => {
                    warn!(session = %self.session_id, error = %e, "Scan failed, retrying");
                    self.expire_if_stale();
                    self.context.sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.stats.scans)
    }

    fn publish(&mut self, estimate: Option<Arc<Estimate>>) {
        self.snapshot = Arc::new(SessionSnapshot {
            session_id: self.session_id,
            state: self.detector.snapshot(),
            estimate,
        });
    }
}

/// A session shared between threads.
///
/// All writes go through one mutex, which keeps the single-writer discipline
/// when a host polls from several threads.
pub struct SharedSession<Ctx>
where
    Ctx: LocaFiContext,
{
    inner: Arc<Mutex<TrackingSession<Ctx>>>,
}

impl<Ctx> Clone for SharedSession<Ctx>
where
    Ctx: LocaFiContext,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Ctx> SharedSession<Ctx>
where
    Ctx: LocaFiContext,
{
    pub fn new(session: TrackingSession<Ctx>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackingSession<Ctx>> {
        // A panic mid-update leaves the previous, fully assigned state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn process_scan<D>(
        &self,
        batch: &ScanBatch,
        directory: &D,
    ) -> Result<SessionUpdate, CoreError>
    where
        D: AccessPointDirectory + ?Sized,
    {
        self.lock().process_scan(batch, directory)
    }

    pub fn update_reference(&self, fix: &ReferenceFix) -> Result<ReferenceUpdate, CoreError> {
        self.lock().update_reference(fix)
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.lock().snapshot()
    }

    pub fn stats(&self) -> SessionStats {
        self.lock().stats()
    }

    pub fn end_session(&self) {
        self.lock().end_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_detector::TrackingPhase;
    use async_trait::async_trait;
    use locafi_env::{AccessPointId, EnvError, RawPosition, RawReading};
    use std::collections::{HashMap, VecDeque};
    use std::time::SystemTime;

    /// Clock that only moves when told to.
    #[derive(Default)]
    struct ManualContext {
        now_ms: Mutex<u64>,
    }

    impl ManualContext {
        fn advance(&self, ms: u64) {
            *self.now_ms.lock().unwrap() += ms;
        }
    }

    #[async_trait]
    impl LocaFiContext for ManualContext {
        fn now(&self) -> Duration {
            Duration::from_millis(*self.now_ms.lock().unwrap())
        }

        fn system_time(&self) -> SystemTime {
            SystemTime::UNIX_EPOCH + self.now()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration.as_millis() as u64);
        }

        fn seed(&self) -> u64 {
            0
        }
    }

    struct QueuedSource {
        queue: Mutex<VecDeque<Result<Option<ScanBatch>, EnvError>>>,
    }

    #[async_trait]
    impl ScanSource for QueuedSource {
        async fn next_scan(&self) -> Result<Option<ScanBatch>, EnvError> {
            self.queue.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    fn directory() -> HashMap<AccessPointId, RawPosition> {
        let mut directory = HashMap::new();
        directory.insert("ap-a".into(), RawPosition::new(0.0, 0.0));
        directory.insert("ap-b".into(), RawPosition::new(0.0, 0.001));
        directory.insert("ap-c".into(), RawPosition::new(0.001, 0.0));
        directory
    }

    fn batch(readings: &[(&str, i32)]) -> ScanBatch {
        ScanBatch::new(
            readings.iter().map(|(id, rssi)| RawReading::new(*id, *rssi)).collect(),
            0,
        )
    }

    fn session() -> (Arc<ManualContext>, TrackingSession<ManualContext>) {
        let ctx = Arc::new(ManualContext::default());
        let session = TrackingSession::new(Arc::clone(&ctx), EngineConfig::default()).unwrap();
        (ctx, session)
    }

    #[test]
    fn test_first_scan_estimates() {
        let (_ctx, mut session) = session();
        let update = session
            .process_scan(&batch(&[("ap-a", -86), ("ap-b", -88), ("ap-c", -87)]), &directory())
            .unwrap();

        assert!(update.updated);
        let estimate = update.estimate.unwrap();
        assert!(!estimate.is_empty());
        assert_eq!(estimate.anchors_used, 3);
        assert!(session.snapshot().estimate.is_some());
        assert_eq!(session.snapshot().state.phase, TrackingPhase::Tracking);
    }

    #[test]
    fn test_rejected_scan_keeps_previous_estimate() {
        let (ctx, mut session) = session();
        let scan = batch(&[("ap-a", -70), ("ap-b", -72)]);
        let first = session.process_scan(&scan, &directory()).unwrap();

        ctx.advance(1_000);
        let second = session.process_scan(&scan, &directory()).unwrap();
        assert!(!second.updated);
        assert_eq!(second.decision, Decision::Rejected);
        assert!(Arc::ptr_eq(
            first.estimate.as_ref().unwrap(),
            second.estimate.as_ref().unwrap()
        ));

        let stats = session.stats();
        assert_eq!((stats.scans, stats.accepted, stats.rejected), (2, 1, 1));
    }

    #[test]
    fn test_stale_session_accepts_identical_scan() {
        let (ctx, mut session) = session();
        let scan = batch(&[("ap-a", -70)]);
        session.process_scan(&scan, &directory()).unwrap();

        ctx.advance(30_001);
        let update = session.process_scan(&scan, &directory()).unwrap();
        assert!(update.updated);
        assert_eq!(update.decision.reason(), Some(&ChangeReason::StaleReset));
        assert_eq!(session.stats().stale_resets, 1);
    }

    #[test]
    fn test_unknown_access_points_still_gate_updates() {
        let (ctx, mut session) = session();
        session
            .process_scan(&batch(&[("ap-a", -70), ("stranger", -60)]), &directory())
            .unwrap();

        ctx.advance(1_000);
        let update = session
            .process_scan(&batch(&[("ap-a", -70), ("stranger", -50)]), &directory())
            .unwrap();
        assert!(update.updated);
        // Only one anchor: ring around ap-a
        assert_eq!(update.estimate.unwrap().candidates.len(), 36);
    }

    #[test]
    fn test_malformed_batches_fail_fast() {
        let (_ctx, mut session) = session();
        let duplicate = batch(&[("ap-a", -70), ("AP-A", -71)]);
        assert!(matches!(
            session.process_scan(&duplicate, &directory()),
            Err(CoreError::MalformedInput(_))
        ));

        let empty_id = batch(&[("  ", -70)]);
        assert!(matches!(
            session.process_scan(&empty_id, &directory()),
            Err(CoreError::MalformedInput(_))
        ));

        // Nothing was recorded for the failed scans
        assert_eq!(session.stats().scans, 0);
    }

    #[test]
    fn test_implausible_rssi_is_malformed() {
        let (_ctx, mut session) = session();
        for rssi in [-20_000, -151, 5] {
            let scan = batch(&[("ap-a", rssi), ("ap-b", -70)]);
            assert!(matches!(
                session.process_scan(&scan, &directory()),
                Err(CoreError::MalformedInput(_))
            ));
        }
        assert_eq!(session.stats().scans, 0);
        assert!(session.snapshot().estimate.is_none());

        let edges = batch(&[("ap-a", -150), ("ap-b", 0)]);
        let estimate = session.process_scan(&edges, &directory()).unwrap().estimate.unwrap();
        let best = estimate.best.unwrap();
        assert!(best.latitude().is_finite() && best.longitude().is_finite());
    }

    #[test]
    fn test_invalid_directory_position_is_distinct_from_no_fix() {
        let (_ctx, mut session) = session();
        let mut bad = directory();
        bad.insert("ap-x".into(), RawPosition::new(123.0, 0.0));

        assert!(matches!(
            session.process_scan(&batch(&[("ap-x", -60)]), &bad),
            Err(CoreError::InvalidGeoPoint { .. })
        ));

        // No positioned access points is simply an empty estimate
        let update = session.process_scan(&batch(&[("nobody", -60)]), &bad).unwrap();
        assert!(update.updated);
        assert!(update.estimate.unwrap().is_empty());
    }

    #[test]
    fn test_reference_comparison() {
        let (_ctx, mut session) = session();
        let fix = ReferenceFix::new(0.0004, 0.0004, 0).with_accuracy(5.0);
        assert!(matches!(
            session.update_reference(&fix).unwrap(),
            ReferenceUpdate::Applied { separation_m: None }
        ));

        let update = session
            .process_scan(&batch(&[("ap-a", -86), ("ap-b", -88), ("ap-c", -87)]), &directory())
            .unwrap();
        let record = update.comparison.unwrap();
        assert!(record.separation_m.unwrap() >= 0.0);
        assert_eq!(record.estimate, update.estimate.unwrap().best);

        let invalid = ReferenceFix::new(0.0, 200.0, 0);
        assert!(session.update_reference(&invalid).is_err());
    }

    #[test]
    fn test_end_session_resets() {
        let (_ctx, mut session) = session();
        let fix = ReferenceFix::new(0.0002, 0.0002, 0);
        session.update_reference(&fix).unwrap();
        let scan = batch(&[("ap-a", -70), ("ap-b", -72)]);
        session.process_scan(&scan, &directory()).unwrap();
        assert_eq!(session.comparison().report().count(), 1);
        session.end_session();

        assert_eq!(session.comparison().report().count(), 0);
        assert!(session.snapshot().estimate.is_none());
        assert_eq!(session.snapshot().state.phase, TrackingPhase::Empty);
        let update = session.process_scan(&scan, &directory()).unwrap();
        assert_eq!(update.decision.reason(), Some(&ChangeReason::FirstObservation));
    }

    #[test]
    fn test_expire_if_stale_clears_snapshot() {
        let (ctx, mut session) = session();
        session.process_scan(&batch(&[("ap-a", -70)]), &directory()).unwrap();
        assert!(!session.expire_if_stale());
        ctx.advance(31_000);
        assert!(session.expire_if_stale());
        assert!(session.snapshot().estimate.is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            ring_samples: 0,
            ..EngineConfig::default()
        };
        assert!(TrackingSession::new(Arc::new(ManualContext::default()), config).is_err());
    }

    #[test]
    fn test_shared_session_across_threads() {
        let ctx = Arc::new(ManualContext::default());
        let session = TrackingSession::new(ctx, EngineConfig::default()).unwrap();
        let shared = SharedSession::new(session);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    let scan = batch(&[("ap-a", -60 - i * 10)]);
                    shared.process_scan(&scan, &directory()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.stats().scans, 4);
        assert!(shared.snapshot().estimate.is_some());
    }

    #[tokio::test]
    async fn test_run_loop_retries_transient_errors() {
        let (ctx, mut session) = session();
        let source = QueuedSource {
            queue: Mutex::new(VecDeque::from(vec![
                Ok(Some(batch(&[("ap-a", -70)]))),
                Err(EnvError::unavailable("radio busy")),
                Ok(Some(batch(&[("ap-a", -70), ("ap-b", -75)]))),
            ])),
        };

        let mut updates = Vec::new();
        let scans = session
            .run(&source, &directory(), |u| updates.push(u.updated))
            .await
            .unwrap();

        assert_eq!(scans, 2);
        assert_eq!(updates, vec![true, true]);
        // The retry slept on the context clock
        assert_eq!(ctx.now_ms(), 1_000);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_permanent_error() {
        let (_ctx, mut session) = session();
        let source = QueuedSource {
            queue: Mutex::new(VecDeque::from(vec![Err(EnvError::permission("location"))])),
        };
        let result = session.run(&source, &directory(), |_| {}).await;
        assert!(matches!(result, Err(CoreError::Environment(EnvError::PermissionDenied(_)))));
    }
}
