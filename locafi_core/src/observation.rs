//! Readings and the observations derived from them.

use locafi_env::{AccessPointId, RawReading};
use serde::{Deserialize, Serialize};

use crate::geodesy::GeoPoint;
use crate::signal::{quality_level, uncertainty_radius_m, SignalModel};

/// One access point as seen by one scan cycle.
///
/// Readings are never mutated; the next scan supersedes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalReading {
    pub id: AccessPointId,
    pub rssi_dbm: i32,
    pub observed_at_ms: u64,
}

impl SignalReading {
    pub fn new(id: impl Into<AccessPointId>, rssi_dbm: i32, observed_at_ms: u64) -> Self {
        Self {
            id: id.into(),
            rssi_dbm,
            observed_at_ms,
        }
    }
}

/// A reading plus everything derived from it.
///
/// Distance and quality are computed once from the reading's rssi and have
/// no setters; a different rssi means a different `Observation`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    reading: SignalReading,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssid: Option<String>,
    distance_m: f64,
    quality_level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<GeoPoint>,
}

impl Observation {
    pub fn new(reading: SignalReading, position: Option<GeoPoint>, model: &SignalModel) -> Self {
        let distance_m = model.distance_m(reading.rssi_dbm);
        let quality_level = quality_level(reading.rssi_dbm);
        Self {
            reading,
            ssid: None,
            distance_m,
            quality_level,
            position,
        }
    }

    /// Builds an observation from a raw scan entry.
    pub fn from_raw(
        raw: &RawReading,
        observed_at_ms: u64,
        position: Option<GeoPoint>,
        model: &SignalModel,
    ) -> Self {
        let reading = SignalReading::new(raw.id.clone(), raw.rssi_dbm, observed_at_ms);
        let mut observation = Self::new(reading, position, model);
        observation.ssid = raw.ssid.clone();
        observation
    }

    /// Same access point and position, new signal reading.
    pub fn with_rssi(&self, rssi_dbm: i32, observed_at_ms: u64, model: &SignalModel) -> Self {
        let reading = SignalReading::new(self.reading.id.clone(), rssi_dbm, observed_at_ms);
        let mut observation = Self::new(reading, self.position, model);
        observation.ssid = self.ssid.clone();
        observation
    }

    pub fn id(&self) -> &AccessPointId {
        &self.reading.id
    }

    pub fn reading(&self) -> &SignalReading {
        &self.reading
    }

    pub fn rssi_dbm(&self) -> i32 {
        self.reading.rssi_dbm
    }

    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn quality_level(&self) -> u8 {
        self.quality_level
    }

    /// Display radius for this observation's quality level.
    pub fn uncertainty_radius_m(&self) -> f64 {
        uncertainty_radius_m(self.quality_level)
    }

    pub fn position(&self) -> Option<GeoPoint> {
        self.position
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rssi={}dBm d={:.2}m q={} ±{:.0}m",
            self.reading.id,
            self.reading.rssi_dbm,
            self.distance_m,
            self.quality_level,
            self.uncertainty_radius_m()
        )?;
        if let Some(position) = self.position {
            write!(f, " @ {}", position)?;
        }
        Ok(())
    }
}
