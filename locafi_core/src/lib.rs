//! LocaFi Core - Wi-Fi Signal Trilateration
//!
//! This library estimates a device position from the signal strength of
//! nearby access points with known coordinates:
//! 1. **Geodesy**: great-circle distance, bearing and destination on a spherical Earth
//! 2. **Signal Model**: log-distance path loss turning RSSI into range
//! 3. **Change Detection**: only significant scans trigger re-estimation
//! 4. **Trilateration**: weighted candidate locations from range circles
//! 5. **Comparison**: separation from a satellite reference fix

pub mod change_detector;
pub mod comparison;
pub mod config;
pub mod error;
pub mod geodesy;
pub mod observation;
pub mod session;
pub mod signal;
pub mod trilateration;

// Re-export key types for convenience
pub use change_detector::{
    ChangeDetector, ChangeReason, Decision, EstimationSnapshot, EstimationState, TrackingPhase,
};
pub use comparison::{AccuracyReport, ComparisonRecord, ComparisonTracker, ReferenceUpdate};
pub use config::EngineConfig;
pub use error::CoreError;
pub use geodesy::{GeoPoint, LocalFrame, EARTH_RADIUS_M};
pub use observation::{Observation, SignalReading};
pub use session::{SessionSnapshot, SessionStats, SessionUpdate, SharedSession, TrackingSession};
pub use signal::{accuracy_radius_m, quality_level, SignalModel, PLAUSIBLE_RSSI_DBM};
pub use trilateration::{
    best_estimate, Bounds, Estimate, EstimateMethod, TrilaterationEngine, WeightedLocation,
};
