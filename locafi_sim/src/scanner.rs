//! Simulated scan source with fault injection.

use async_trait::async_trait;
use locafi_env::{AccessPointId, EnvError, ScanBatch, ScanController, ScanSource};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::context::SimContext;

/// One queued scan cycle outcome.
#[derive(Debug)]
enum QueuedScan {
    Batch(ScanBatch),
    Failure(EnvError),
}

/// Scan source replaying batches synthesised by the oracle.
///
/// Popping a batch moves the virtual clock up to its timestamp, so a session
/// consuming the queue sees time pass the way the radio reported it.
pub struct SimScanner {
    clock: Option<SimContext>,
    queue: Mutex<VecDeque<QueuedScan>>,
    faults: SimScanController,
}

impl SimScanner {
    pub fn new() -> Self {
        Self {
            clock: None,
            queue: Mutex::new(VecDeque::new()),
            faults: SimScanController::new(),
        }
    }

    /// Scanner that advances `context` to each batch's timestamp.
    pub fn with_clock(context: SimContext) -> Self {
        Self {
            clock: Some(context),
            ..Self::new()
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<QueuedScan>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, batch: ScanBatch) {
        self.queue().push_back(QueuedScan::Batch(batch));
    }

    /// Makes the next cycle fail with `error`.
    pub fn push_failure(&self, error: EnvError) {
        self.queue().push_back(QueuedScan::Failure(error));
    }

    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Handle for injecting faults while the scanner is in use.
    pub fn controller(&self) -> SimScanController {
        self.faults.clone()
    }

    /// Synchronous form of [`ScanSource::next_scan`].
    pub fn poll_scan(&self) -> Result<Option<ScanBatch>, EnvError> {
        let next = self.queue().pop_front();
        match next {
            None => Ok(None),
            Some(QueuedScan::Failure(error)) => Err(error),
            Some(QueuedScan::Batch(batch)) => {
                if let Some(clock) = &self.clock {
                    clock.advance_to_ms(batch.timestamp_ms);
                }
                Ok(Some(self.faults.apply(batch)))
            }
        }
    }
}

impl Default for SimScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScanSource for SimScanner {
    async fn next_scan(&self) -> Result<Option<ScanBatch>, EnvError> {
        self.poll_scan()
    }
}

/// Fault state shared between a scanner and its controller handles.
#[derive(Debug, Default)]
struct FaultState {
    hidden: HashSet<AccessPointId>,
}

/// Controller for hiding access points from the radio.
#[derive(Debug, Clone, Default)]
pub struct SimScanController {
    state: Arc<Mutex<FaultState>>,
}

impl SimScanController {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies the current faults to a batch.
    pub fn apply(&self, mut batch: ScanBatch) -> ScanBatch {
        let state = self.state();
        batch.readings.retain(|r| !state.hidden.contains(&r.id));
        batch
    }

    pub fn is_hidden(&self, id: &AccessPointId) -> bool {
        self.state().hidden.contains(id)
    }
}

impl ScanController for SimScanController {
    fn set_visible(&self, id: &AccessPointId, visible: bool) {
        let mut state = self.state();
        if visible {
            state.hidden.remove(id);
        } else {
            state.hidden.insert(id.clone());
        }
    }

    fn heal_all(&self) {
        self.state().hidden.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locafi_env::{LocaFiContext, RawReading};

    fn batch(timestamp_ms: u64) -> ScanBatch {
        ScanBatch::new(
            vec![RawReading::new("ap-1", -60), RawReading::new("ap-2", -70)],
            timestamp_ms,
        )
    }

    #[test]
    fn test_faults_applied() {
        let scanner = SimScanner::new();
        let controller = scanner.controller();
        controller.set_visible(&AccessPointId::new("ap-1"), false);

        scanner.push(batch(0));
        let scan = scanner.poll_scan().unwrap().unwrap();
        assert_eq!(scan.len(), 1);
        assert_eq!(scan.readings[0].id.as_str(), "ap-2");
        assert!(controller.is_hidden(&AccessPointId::new("ap-1")));

        controller.heal_all();
        scanner.push(batch(0));
        assert_eq!(scanner.poll_scan().unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_failures_and_exhaustion() {
        let scanner = SimScanner::new();
        scanner.push_failure(EnvError::Timeout(100));
        scanner.push(batch(0));
        assert_eq!(scanner.pending(), 2);

        assert!(matches!(scanner.poll_scan(), Err(EnvError::Timeout(100))));
        assert!(scanner.poll_scan().unwrap().is_some());
        assert!(scanner.poll_scan().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clock_follows_batches() {
        let ctx = SimContext::new(1);
        let scanner = SimScanner::with_clock(ctx.clone());
        scanner.push(batch(1_500));
        scanner.push(batch(4_000));

        scanner.next_scan().await.unwrap();
        assert_eq!(ctx.now_ms(), 1_500);
        scanner.next_scan().await.unwrap();
        assert_eq!(ctx.now_ms(), 4_000);
    }
}
