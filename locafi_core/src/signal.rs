//! Signal model: received signal strength to distance and quality.
//!
//! Distance follows the log-distance path-loss model
//!
//! ```text
//! d = d0 * 10^((rssi0 - rssi) / (10 * n))
//! ```
//!
//! Quality is a coarse 0-4 bucket used for weighting and display only.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Lower bounds (dBm) for quality levels 4, 3, 2 and 1.
pub const QUALITY_THRESHOLDS_DBM: [i32; 4] = [-50, -60, -70, -80];

/// Readings outside this range (dBm) are treated as corrupt input.
pub const PLAUSIBLE_RSSI_DBM: std::ops::RangeInclusive<i32> = -150..=0;

/// Highest quality level.
pub const MAX_QUALITY_LEVEL: u8 = 4;

/// Display radius (meters) per quality level, indexed by level.
const UNCERTAINTY_RADIUS_M: [f64; 5] = [50.0, 40.0, 30.0, 20.0, 10.0];

/// Log-distance path-loss model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalModel {
    /// Distance at which `reference_rssi_dbm` is measured (default: 1 m)
    pub reference_distance_m: f64,

    /// Signal strength at the reference distance (default: -40 dBm)
    pub reference_rssi_dbm: f64,

    /// Path loss exponent; 2.0 is free space, indoor is usually 2.5-4
    pub path_loss_exponent: f64,
}

impl Default for SignalModel {
    fn default() -> Self {
        Self {
            reference_distance_m: 1.0,
            reference_rssi_dbm: -40.0,
            path_loss_exponent: 2.7,
        }
    }
}

impl SignalModel {
    pub fn new(
        reference_distance_m: f64,
        reference_rssi_dbm: f64,
        path_loss_exponent: f64,
    ) -> Self {
        Self {
            reference_distance_m,
            reference_rssi_dbm,
            path_loss_exponent,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.path_loss_exponent.is_finite() && self.path_loss_exponent > 0.0) {
            return Err(CoreError::config(format!(
                "path_loss_exponent must be positive, got {}",
                self.path_loss_exponent
            )));
        }
        if !(self.reference_distance_m.is_finite() && self.reference_distance_m > 0.0) {
            return Err(CoreError::config(format!(
                "reference_distance_m must be positive, got {}",
                self.reference_distance_m
            )));
        }
        if !self.reference_rssi_dbm.is_finite() {
            return Err(CoreError::config("reference_rssi_dbm must be finite"));
        }
        Ok(())
    }

    /// Estimated distance in meters for a reading. Strictly decreasing in rssi.
    pub fn distance_m(&self, rssi_dbm: i32) -> f64 {
        let exponent =
            (self.reference_rssi_dbm - rssi_dbm as f64) / (10.0 * self.path_loss_exponent);
        self.reference_distance_m * 10f64.powf(exponent)
    }

    /// Signal strength this model predicts at `distance_m`.
    ///
    /// Inverse of [`SignalModel::distance_m`]; used to synthesise scans.
    pub fn rssi_at(&self, distance_m: f64) -> f64 {
        let ratio = (distance_m / self.reference_distance_m).max(f64::MIN_POSITIVE);
        self.reference_rssi_dbm - 10.0 * self.path_loss_exponent * ratio.log10()
    }
}

/// Quality level 0..=4 for a reading. Non-decreasing in rssi.
pub fn quality_level(rssi_dbm: i32) -> u8 {
    QUALITY_THRESHOLDS_DBM
        .iter()
        .position(|&threshold| rssi_dbm >= threshold)
        .map(|idx| MAX_QUALITY_LEVEL - idx as u8)
        .unwrap_or(0)
}

/// Radius of the confidence circle drawn around an access point.
pub(crate) fn uncertainty_radius_m(quality_level: u8) -> f64 {
    UNCERTAINTY_RADIUS_M[quality_level.min(MAX_QUALITY_LEVEL) as usize]
}

/// Overall accuracy radius of an estimate from the mean signal strength.
///
/// -50 dBm maps to ~15 m and weak signals grow towards 50 m. With no
/// readings the radius is the 50 m ceiling.
pub fn accuracy_radius_m<I>(rssi_dbm: I) -> f64
where
    I: IntoIterator<Item = i32>,
{
    let (sum, count) = rssi_dbm
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), rssi| (sum + rssi as f64, count + 1));

    if count == 0 {
        return 50.0;
    }

    let mean = sum / count as f64;
    (15.0 + (mean + 50.0).abs()).clamp(15.0, 50.0)
}
