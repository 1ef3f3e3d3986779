//! Error types for the Sthana daemon

use thiserror::Error;

/// Daemon error type
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] sthana::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<sthana::ConfigLoadError> for DaemonError {
    fn from(e: sthana::ConfigLoadError) -> Self {
        DaemonError::Config(e.to_string())
    }
}

impl From<serde_yaml::Error> for DaemonError {
    fn from(e: serde_yaml::Error) -> Self {
        DaemonError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
