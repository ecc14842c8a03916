//! Error taxonomy for the estimation engine.
//!
//! Only precondition violations surface as errors. "No usable fix" is an
//! expected steady state and is expressed through empty results instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Latitude/longitude outside the valid range (or not a number)
    #[error("Invalid coordinates: lat={latitude}, lon={longitude}")]
    InvalidGeoPoint { latitude: f64, longitude: f64 },

    /// Scan input that cannot be interpreted (empty or duplicate ids, ...)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Configuration values outside their meaningful domain
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Scan acquisition failed in a way retrying will not fix
    #[error("Environment error: {0}")]
    Environment(#[from] locafi_env::EnvError),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
