//! Error types for iceplant.

use thiserror::Error;

/// Main error type for all acquisition and storage operations.
///
/// Per-frame problems are not errors at this level; see
/// [`Rejection`](crate::protocol::Rejection).
#[derive(Debug, Error)]
pub enum IcePlantError {
    /// I/O error on a log file, the data directory or the link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration file could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Link is not usable right now (device unplugged, interface not up).
    #[error("Link unavailable: {0}")]
    LinkUnavailable(String),

    /// Retention could not free enough space: no log files left to evict.
    #[error("Disk exhausted: {available} bytes available, {required} required")]
    DiskExhausted { available: u64, required: u64 },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IcePlantError {
    /// Check if the acquisition loop should log this error and carry on.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, IcePlantError::LinkUnavailable(_))
    }
}

/// Result type alias using IcePlantError.
pub type Result<T> = std::result::Result<T, IcePlantError>;
