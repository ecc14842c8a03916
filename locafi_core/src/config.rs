//! Engine configuration.
//!
//! Every field has a default, and partial JSON documents fill the rest in:
//!
//! ```ignore
//! let config = EngineConfig::from_json_str(r#"{ "path_loss_exponent": 3.1 }"#)?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::CoreError;
use crate::signal::SignalModel;

/// Configuration shared by the change detector, the trilateration engine
/// and the comparison tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path loss exponent (default: 2.7)
    pub path_loss_exponent: f64,

    /// RSSI at the reference distance (default: -40 dBm)
    pub reference_rssi_dbm: f64,

    /// Reference distance (default: 1.0 m)
    pub reference_distance_m: f64,

    /// RSSI delta that counts as a significant change (default: 5 dBm, exclusive)
    pub rssi_change_threshold_dbm: u32,

    /// Time without an accepted update before state is dropped (default: 30 s)
    pub staleness_window_ms: u64,

    /// Candidate points on the ring for a single anchor (default: 36)
    pub ring_samples: usize,

    /// Floor for signal-derived distances (default: 1.0 m)
    pub min_distance_m: f64,

    /// Weight multiplier for candidates outside the anchor hull (default: 1.0 = off)
    pub outside_hull_weight: f64,

    /// Worst acceptable reported accuracy of a reference fix (default: 20 m)
    pub max_reference_accuracy_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let model = SignalModel::default();
        Self {
            path_loss_exponent: model.path_loss_exponent,
            reference_rssi_dbm: model.reference_rssi_dbm,
            reference_distance_m: model.reference_distance_m,
            rssi_change_threshold_dbm: 5,
            staleness_window_ms: 30_000,
            ring_samples: 36,
            min_distance_m: 1.0,
            outside_hull_weight: 1.0,
            max_reference_accuracy_m: 20.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn signal_model(&self) -> SignalModel {
        SignalModel::new(
            self.reference_distance_m,
            self.reference_rssi_dbm,
            self.path_loss_exponent,
        )
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_window_ms)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.signal_model().validate()?;

        if self.ring_samples == 0 {
            return Err(CoreError::config("ring_samples must be at least 1"));
        }
        if !(self.min_distance_m.is_finite() && self.min_distance_m > 0.0) {
            return Err(CoreError::config(format!(
                "min_distance_m must be positive, got {}",
                self.min_distance_m
            )));
        }
        if !(self.outside_hull_weight.is_finite()
            && self.outside_hull_weight > 0.0
            && self.outside_hull_weight <= 1.0)
        {
            return Err(CoreError::config(format!(
                "outside_hull_weight must be in (0, 1], got {}",
                self.outside_hull_weight
            )));
        }
        if !(self.max_reference_accuracy_m.is_finite() && self.max_reference_accuracy_m > 0.0) {
            return Err(CoreError::config(format!(
                "max_reference_accuracy_m must be positive, got {}",
                self.max_reference_accuracy_m
            )));
        }
        Ok(())
    }
}
