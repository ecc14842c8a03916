//! Collaborator traits for scan acquisition and access point lookup.

use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::error::EnvError;
use crate::types::{AccessPointId, RawPosition, ScanBatch};

/// Source of completed scan cycles.
///
/// # Implementations
///
/// - **Production**: wraps the platform Wi-Fi scanner
/// - **Simulation**: replays batches synthesised from ground truth
///
/// # Scan Flow
///
/// ```text
/// Radio                 ScanSource               TrackingSession
///   |-- scan complete -->|                             |
///   |                    |<------- next_scan() --------|
///   |                    |-------- Ok(Some(batch)) --->|
/// ```
#[async_trait]
pub trait ScanSource: Send + Sync {
    /// Waits for the next completed scan.
    ///
    /// # Returns
    /// * `Ok(Some(batch))` - A scan cycle completed
    /// * `Ok(None)` - The source has shut down; no more scans will arrive
    /// * `Err(EnvError)` - This cycle failed (see `EnvError::is_transient`)
    async fn next_scan(&self) -> Result<Option<ScanBatch>, EnvError>;
}

/// Lookup of access points whose location is already known.
///
/// Backed by an external store; access points missing here are still
/// usable for change detection, just not as geometric anchors.
pub trait AccessPointDirectory {
    fn position(&self, id: &AccessPointId) -> Option<RawPosition>;
}

impl<S: BuildHasher> AccessPointDirectory for HashMap<AccessPointId, RawPosition, S> {
    fn position(&self, id: &AccessPointId) -> Option<RawPosition> {
        self.get(id).copied()
    }
}

impl<D: AccessPointDirectory + ?Sized> AccessPointDirectory for &D {
    fn position(&self, id: &AccessPointId) -> Option<RawPosition> {
        (**self).position(id)
    }
}

/// Fault injection for simulated scan sources.
///
/// Allows hiding access points from subsequent scans.
pub trait ScanController: Send + Sync {
    /// Hides or reveals an access point in subsequent scans.
    fn set_visible(&self, id: &AccessPointId, visible: bool);

    /// Clears all injected faults.
    fn heal_all(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_map_directory() {
        let mut directory = HashMap::new();
        directory.insert(AccessPointId::new("ap-1"), RawPosition::new(1.0, 2.0));

        assert_eq!(
            directory.position(&AccessPointId::new("AP-1")),
            Some(RawPosition::new(1.0, 2.0))
        );
        assert_eq!(directory.position(&AccessPointId::new("ap-2")), None);

        let by_ref = &directory;
        assert!(by_ref.position(&AccessPointId::new("ap-1")).is_some());
    }
}
