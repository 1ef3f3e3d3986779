//! Error types for Sthana

use crate::config::ConfigLoadError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Sthana error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Measurement failed validation and was discarded
    #[error("Malformed measurement: {0}")]
    MalformedMeasurement(String),

    /// Measurement names a receiver that is not a configured node
    #[error("Unknown receiver: {0}")]
    UnknownReceiver(String),

    /// Configuration could not be loaded or applied
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker channel was closed
    #[error("Channel closed: {0}")]
    Channel(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigLoadError> for Error {
    fn from(e: ConfigLoadError) -> Self {
        Error::Config(e.to_string())
    }
}
