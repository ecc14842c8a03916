//! JSON exporter for offline inspection of a scenario run.

use locafi_core::GeoPoint;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::SimError;

/// A single scan cycle of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// True device position
    pub truth: LatLon,

    /// Best estimate after this scan (previous one if the scan was rejected)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<LatLon>,

    /// Number of weighted candidates behind the estimate
    pub candidates: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_radius_m: Option<f64>,

    /// Whether this scan triggered re-estimation
    pub updated: bool,

    /// Why it did, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<LatLon>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub separation_m: Option<f64>,

    /// Events (outages, failures, pauses)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl From<GeoPoint> for LatLon {
    fn from(point: GeoPoint) -> Self {
        Self {
            lat: point.latitude(),
            lon: point.longitude(),
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    pub scenario: String,
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// Access point positions
    pub access_points: Vec<(String, LatLon)>,

    pub frames: Vec<SimFrame>,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Mean distance between estimate and truth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_error_m: Option<f64>,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            access_points: Vec::new(),
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
            mean_error_m: None,
        }
    }

    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    pub fn finalize(
        &mut self,
        passed: bool,
        failure_reason: Option<String>,
        mean_error_m: Option<f64>,
    ) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.mean_error_m = mean_error_m;
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
