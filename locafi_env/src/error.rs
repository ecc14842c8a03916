//! Error types for the LocaFi environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to the environment.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Scanning is currently not possible (radio off, adapter missing, etc.)
    #[error("Scan unavailable: {0}")]
    ScanUnavailable(String),

    /// The host refused access to scan results
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a scan-unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ScanUnavailable(msg.into())
    }

    /// Creates a permission error.
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Whether a caller may simply try again on the next scan cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ScanUnavailable(_) | Self::Timeout(_))
    }
}
