//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of the simulated world:
//! - True position and velocity of the device
//! - Access points at known positions
//! - Scan generation from the path-loss model (with shadowing noise)
//! - Satellite reference fixes (with position noise)

use locafi_core::{GeoPoint, LocalFrame, SignalModel, PLAUSIBLE_RSSI_DBM};
use locafi_env::{AccessPointId, RawPosition, RawReading, ReferenceFix, ScanBatch};
use nalgebra::Vector2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use std::collections::HashMap;

use crate::error::SimError;

/// Weakest signal a simulated radio still reports (dBm).
pub const DETECTION_FLOOR_DBM: i32 = -95;

/// An access point in the simulated world.
#[derive(Debug, Clone)]
pub struct SimAccessPoint {
    pub id: AccessPointId,

    /// Position [east, north] in meters relative to the origin
    pub local: Vector2<f64>,

    pub position: GeoPoint,

    /// Whether the directory knows where this access point is
    pub surveyed: bool,
}

/// The Oracle - maintains ground truth and generates scans.
pub struct Oracle {
    /// RNG for noise
    physics_rng: ChaCha8Rng,

    frame: LocalFrame,
    model: SignalModel,

    access_points: Vec<SimAccessPoint>,

    /// Device position [east, north] in meters
    device: Vector2<f64>,

    /// Device velocity in m/s
    velocity: Vector2<f64>,

    /// Half-width of the east-west corridor the device turns around in
    patrol_half_width_m: Option<f64>,

    /// Current simulation time (seconds)
    current_time: f64,

    /// Shadowing standard deviation (dB)
    shadowing_std_db: f64,

    /// Reference fix noise standard deviation per axis (meters)
    reference_noise_std_m: f64,
}

impl Oracle {
    /// Creates an Oracle around `origin` with the given physics seed.
    ///
    /// Defaults: 2 dB shadowing, 3 m reference fix noise.
    pub fn new(physics_seed: u64, origin: GeoPoint, model: SignalModel) -> Self {
        Self {
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            frame: LocalFrame::new(origin),
            model,
            access_points: Vec::new(),
            device: Vector2::zeros(),
            velocity: Vector2::zeros(),
            patrol_half_width_m: None,
            current_time: 0.0,
            shadowing_std_db: 2.0,
            reference_noise_std_m: 3.0,
        }
    }

    /// Sets the shadowing (RSSI noise) standard deviation in dB.
    pub fn set_shadowing(&mut self, std_db: f64) -> Result<(), SimError> {
        self.shadowing_std_db = validate_std("shadowing", std_db)?;
        Ok(())
    }

    /// Sets the reference fix noise standard deviation in meters.
    pub fn set_reference_noise(&mut self, std_m: f64) -> Result<(), SimError> {
        self.reference_noise_std_m = validate_std("reference noise", std_m)?;
        Ok(())
    }

    /// Zero-mean Gaussian sample with the given standard deviation.
    fn gaussian(&mut self, std: f64) -> f64 {
        let z: f64 = StandardNormal.sample(&mut self.physics_rng);
        z * std
    }

    /// Places a surveyed access point `east`/`north` meters from the origin.
    pub fn add_access_point(&mut self, id: &str, east: f64, north: f64) -> AccessPointId {
        self.insert_access_point(id, east, north, true)
    }

    /// Places an access point the directory does not know about.
    pub fn add_unsurveyed_access_point(
        &mut self,
        id: &str,
        east: f64,
        north: f64,
    ) -> AccessPointId {
        self.insert_access_point(id, east, north, false)
    }

    fn insert_access_point(
        &mut self,
        id: &str,
        east: f64,
        north: f64,
        surveyed: bool,
    ) -> AccessPointId {
        let local = Vector2::new(east, north);
        let ap = SimAccessPoint {
            id: AccessPointId::new(id),
            local,
            position: self.frame.to_geo(&local),
            surveyed,
        };
        let id = ap.id.clone();
        self.access_points.push(ap);
        id
    }

    pub fn place_device(&mut self, east: f64, north: f64) {
        self.device = Vector2::new(east, north);
    }

    pub fn set_velocity(&mut self, east: f64, north: f64) {
        self.velocity = Vector2::new(east, north);
    }

    /// Keeps the device between -`half_width_m` and `half_width_m` east.
    pub fn set_patrol(&mut self, half_width_m: f64) {
        self.patrol_half_width_m = Some(half_width_m.abs());
    }

    /// Advances physics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;
        // Simple constant-velocity model
        self.device += self.velocity * dt;

        if let Some(limit) = self.patrol_half_width_m {
            if self.device.x.abs() > limit {
                self.device.x = self.device.x.clamp(-limit, limit);
                self.velocity.x = -self.velocity.x;
            }
        }
    }

    pub fn time(&self) -> f64 {
        self.current_time
    }

    pub fn access_points(&self) -> &[SimAccessPoint] {
        &self.access_points
    }

    /// True device position.
    pub fn device_position(&self) -> GeoPoint {
        self.frame.to_geo(&self.device)
    }

    /// Directory of surveyed access points.
    pub fn directory(&self) -> HashMap<AccessPointId, RawPosition> {
        self.access_points
            .iter()
            .filter(|ap| ap.surveyed)
            .map(|ap| (ap.id.clone(), ap.position.into()))
            .collect()
    }

    /// Noise-free signal strength of an access point at the device.
    pub fn expected_rssi(&self, ap: &SimAccessPoint) -> f64 {
        self.model.rssi_at((ap.local - self.device).norm())
    }

    /// One scan cycle as the device's radio would report it.
    ///
    /// Readings below [`DETECTION_FLOOR_DBM`] are dropped; a radio pressed
    /// against an access point saturates at the top of the plausible range.
    pub fn generate_scan(&mut self, timestamp_ms: u64) -> ScanBatch {
        let mut readings = Vec::with_capacity(self.access_points.len());
        for i in 0..self.access_points.len() {
            let expected = self.expected_rssi(&self.access_points[i]);
            let rssi = ((expected + self.gaussian(self.shadowing_std_db)).round() as i32)
                .min(*PLAUSIBLE_RSSI_DBM.end());
            if rssi >= DETECTION_FLOOR_DBM {
                readings.push(RawReading::new(self.access_points[i].id.clone(), rssi));
            }
        }
        ScanBatch::new(readings, timestamp_ms)
    }

    /// Noisy satellite fix reporting `accuracy_m`.
    pub fn reference_fix(&mut self, timestamp_ms: u64, accuracy_m: f64) -> ReferenceFix {
        let std = self.reference_noise_std_m;
        let noise = Vector2::new(self.gaussian(std), self.gaussian(std));
        let position = self.frame.to_geo(&(self.device + noise));
        ReferenceFix::new(position.latitude(), position.longitude(), timestamp_ms)
            .with_accuracy(accuracy_m)
    }
}

fn validate_std(name: &str, std: f64) -> Result<f64, SimError> {
    if std.is_finite() && std >= 0.0 {
        Ok(std)
    } else {
        Err(SimError::InvalidNoise(format!("{} std must be >= 0, got {}", name, std)))
    }
}
