//! Common types crossing the LocaFi environment seam.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tracking session.
///
/// Uses UUID v4 so independent sessions never need coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random SessionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic SessionId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Stable identifier of an access point (its hardware address).
///
/// Stored lower-cased so that scans reporting `AA:BB:..` and `aa:bb:..`
/// join on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AccessPointId(String);

impl AccessPointId {
    pub fn new(id: impl Into<String>) -> Self {
        let id: String = id.into();
        Self(id.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for AccessPointId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for AccessPointId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<AccessPointId> for String {
    fn from(id: AccessPointId) -> Self {
        id.0
    }
}

impl std::fmt::Display for AccessPointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One access point as reported by a single scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Hardware address of the access point
    pub id: AccessPointId,

    /// Received signal strength in dBm
    pub rssi_dbm: i32,

    /// Network name, for display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
}

impl RawReading {
    pub fn new(id: impl Into<AccessPointId>, rssi_dbm: i32) -> Self {
        Self {
            id: id.into(),
            rssi_dbm,
            ssid: None,
        }
    }

    pub fn with_ssid(mut self, ssid: impl Into<String>) -> Self {
        self.ssid = Some(ssid.into());
        self
    }
}

/// The result of one completed scan cycle.
///
/// Batches arrive serially: one cycle completes before the next begins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanBatch {
    /// Every access point visible in this cycle
    pub readings: Vec<RawReading>,

    /// When the cycle completed (milliseconds on the context clock)
    pub timestamp_ms: u64,
}

impl ScanBatch {
    pub fn new(readings: Vec<RawReading>, timestamp_ms: u64) -> Self {
        Self {
            readings,
            timestamp_ms,
        }
    }

    /// Returns the number of readings in the batch.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Unvalidated coordinates as supplied by an external store.
///
/// The engine validates these before any distance math touches them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl RawPosition {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A satellite-derived position used only as a comparison reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFix {
    pub position: RawPosition,

    /// Reported horizontal accuracy (meters), if the receiver provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,

    pub timestamp_ms: u64,
}

impl ReferenceFix {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: u64) -> Self {
        Self {
            position: RawPosition::new(latitude, longitude),
            accuracy_m: None,
            timestamp_ms,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_point_id_normalization() {
        let upper = AccessPointId::new("AA:BB:CC:DD:EE:FF");
        let lower = AccessPointId::from("aa:bb:cc:dd:ee:ff");
        assert_eq!(upper, lower);
        assert_eq!(upper.to_string(), "aa:bb:cc:dd:ee:ff");

        assert!(AccessPointId::new("   ").is_empty());
    }

    #[test]
    fn test_access_point_id_serde_is_transparent() {
        let id: AccessPointId = serde_json::from_str("\"AA:BB:CC:00:11:22\"").unwrap();
        assert_eq!(id.as_str(), "aa:bb:cc:00:11:22");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"aa:bb:cc:00:11:22\"");
    }

    #[test]
    fn test_session_id_from_seed_is_deterministic() {
        assert_eq!(SessionId::from_seed(7), SessionId::from_seed(7));
        assert_ne!(SessionId::from_seed(7), SessionId::from_seed(8));
        assert_eq!(SessionId::from_seed(7).to_string().len(), 8);
    }

    #[test]
    fn test_scan_batch_builders() {
        let batch = ScanBatch::new(
            vec![
                RawReading::new("ap-1", -55).with_ssid("office"),
                RawReading::new("ap-2", -72),
            ],
            1_000,
        );
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert_eq!(batch.readings[0].ssid.as_deref(), Some("office"));
        assert!(ScanBatch::default().is_empty());
    }

    #[test]
    fn test_reference_fix_accuracy() {
        let fix = ReferenceFix::new(48.0, -123.0, 5).with_accuracy(8.5);
        assert_eq!(fix.accuracy_m, Some(8.5));
        assert_eq!(fix.position, RawPosition::new(48.0, -123.0));
    }
}
