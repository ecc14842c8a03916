//! Spherical-Earth geodesy shared by every other engine component.
//!
//! All floating-point geometry lives here:
//! - Great-circle distance (haversine)
//! - Initial bearing and the forward (destination) problem
//! - A local tangent plane for doing circle math in meters

use locafi_env::RawPosition;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated position on the sphere.
///
/// The only way to build one from caller data is [`GeoPoint::new`], so a
/// `GeoPoint` that exists is always inside the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPosition", into = "RawPosition")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Creates a point, rejecting anything outside [-90,90] x [-180,180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoreError> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(CoreError::InvalidGeoPoint {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Builds a point from geometry we produced ourselves.
    ///
    /// Trig round-off can push results a hair past the poles or the
    /// antimeridian; those are folded back rather than rejected.
    pub(crate) fn from_computed(latitude: f64, longitude: f64) -> Self {
        debug_assert!(
            latitude.is_finite() && longitude.is_finite(),
            "computed point is not finite: ({latitude}, {longitude})"
        );
        Self {
            latitude: latitude.clamp(-90.0, 90.0),
            longitude: normalize_longitude(longitude),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        distance(self, other)
    }

    /// Initial bearing towards `other` in degrees (0-360, where 0 is North).
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        initial_bearing(self, other)
    }

    /// Point reached by travelling `distance_m` along `bearing_deg`.
    pub fn destination(&self, distance_m: f64, bearing_deg: f64) -> GeoPoint {
        destination(self, distance_m, bearing_deg)
    }

    pub fn is_within_radius(&self, other: &GeoPoint, radius_m: f64) -> bool {
        self.distance_to(other) <= radius_m
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.latitude, self.longitude)
    }
}

impl TryFrom<RawPosition> for GeoPoint {
    type Error = CoreError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl From<GeoPoint> for RawPosition {
    fn from(point: GeoPoint) -> Self {
        RawPosition::new(point.latitude, point.longitude)
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(point: GeoPoint) -> Self {
        geo::Point::new(point.longitude, point.latitude)
    }
}

/// Folds a longitude into (-180, 180].
pub fn normalize_longitude(longitude: f64) -> f64 {
    let folded = (longitude + 180.0).rem_euclid(360.0) - 180.0;
    if folded == -180.0 {
        180.0
    } else {
        folded
    }
}

/// Great-circle distance using the haversine formula.
/// Read more here: https://en.wikipedia.org/wiki/Haversine_formula
/// Returns the distance in meters.
pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat_from = a.latitude.to_radians();
    let lat_to = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat_from.cos() * lat_to.cos() * (delta_lon / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing from `a` to `b`, in degrees [0, 360).
pub fn initial_bearing(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat_from = a.latitude.to_radians();
    let lat_to = b.latitude.to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let y = delta_lon.sin() * lat_to.cos();
    let x = lat_from.cos() * lat_to.sin() - lat_from.sin() * lat_to.cos() * delta_lon.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Project a position forward by a given distance and bearing.
/// bearing: degrees (0 = North, clockwise)
/// distance: meters
pub fn destination(origin: &GeoPoint, distance_m: f64, bearing_deg: f64) -> GeoPoint {
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();
    let brng = bearing_deg.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat2 = lat1.sin() * angular_distance.cos()
        + lat1.cos() * angular_distance.sin() * brng.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let lon2 = lon1
        + (brng.sin() * angular_distance.sin() * lat1.cos())
            .atan2(angular_distance.cos() - lat1.sin() * lat2.sin());

    GeoPoint::from_computed(lat2.to_degrees(), lon2.to_degrees())
}

/// Equirectangular tangent plane anchored at an origin.
///
/// x grows east, y grows north, both in meters. Accurate to millimeters
/// over the few hundred meters an access point can be heard from.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: GeoPoint,
    meters_per_deg_lat: f64,
    meters_per_deg_lon: f64,
}

impl LocalFrame {
    pub fn new(origin: GeoPoint) -> Self {
        let meters_per_deg_lat = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        // Floor keeps the frame invertible at the poles.
        let cos_lat = origin.latitude.to_radians().cos().max(1e-9);
        Self {
            origin,
            meters_per_deg_lat,
            meters_per_deg_lon: meters_per_deg_lat * cos_lat,
        }
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    pub fn to_local(&self, point: &GeoPoint) -> Vector2<f64> {
        let delta_lon = normalize_longitude(point.longitude - self.origin.longitude);
        let delta_lat = point.latitude - self.origin.latitude;
        Vector2::new(
            delta_lon * self.meters_per_deg_lon,
            delta_lat * self.meters_per_deg_lat,
        )
    }

    pub fn to_geo(&self, local: &Vector2<f64>) -> GeoPoint {
        GeoPoint::from_computed(
            self.origin.latitude + local.y / self.meters_per_deg_lat,
            self.origin.longitude + local.x / self.meters_per_deg_lon,
        )
    }
}
