//! Configuration loading errors.

use std::path::PathBuf;

/// Why a configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// The file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The YAML did not match the config schema
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Parsed, but semantically invalid
    #[error("invalid config: {0}")]
    Invalid(String),
}
