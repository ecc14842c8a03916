//! Errors raised by the simulation harness.

use locafi_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Noise parameters a normal distribution cannot take
    #[error("Invalid noise parameter: {0}")]
    InvalidNoise(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize export: {0}")]
    Json(#[from] serde_json::Error),
}
