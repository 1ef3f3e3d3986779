//! Configuration loading for the Sthana daemon
//!
//! The daemon reads the engine file and picks out its own `daemon:` section;
//! the engine ignores that key.

use std::path::Path;

use serde::Deserialize;
use sthana::EngineConfig;

use crate::error::{DaemonError, Result};

/// Daemon-only settings
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DaemonSection {
    /// Measurement source: a JSON-lines file, or "-" for stdin
    #[serde(default = "default_input")]
    pub input: String,

    /// Report sink: a JSON-lines file, or "-" for stdout
    #[serde(default = "default_output")]
    pub output: String,

    /// Seconds between config file change checks (0 disables reload)
    #[serde(default = "default_reload_secs")]
    pub reload_secs: u64,

    /// Seconds between telemetry log lines
    #[serde(default = "default_stats_secs")]
    pub stats_secs: u64,

    /// Write the calibration matrix here on shutdown
    #[serde(default)]
    pub matrix_path: Option<String>,
}

fn default_input() -> String {
    "-".to_string()
}

fn default_output() -> String {
    "-".to_string()
}

fn default_reload_secs() -> u64 {
    10
}

fn default_stats_secs() -> u64 {
    60
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            reload_secs: default_reload_secs(),
            stats_secs: default_stats_secs(),
            matrix_path: None,
        }
    }
}

#[derive(Deserialize, Default)]
struct DaemonFile {
    #[serde(default)]
    daemon: DaemonSection,
}

/// Engine and daemon configuration from one file
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub engine: EngineConfig,
    pub daemon: DaemonSection,
}

impl DaemonConfig {
    /// Load both sections from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DaemonError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&contents)
    }

    /// Parse both sections from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let engine = EngineConfig::from_yaml(yaml)?;
        let file: DaemonFile = serde_yaml::from_str(yaml)?;
        Ok(Self {
            engine,
            daemon: file.daemon,
        })
    }

    /// Load from a path if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            log::info!("Loading configuration from {}", path.display());
            Self::load(path)
        } else {
            log::warn!("{} not found, using default configuration", path.display());
            Ok(Self {
                engine: EngineConfig::default(),
                daemon: DaemonSection::default(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_section() {
        let yaml = r#"
floors:
  - id: ground
    bounds: [[0, 0, 0], [10, 10, 3]]
daemon:
  input: measurements.jsonl
  reload_secs: 0
"#;
        let config = DaemonConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.daemon.input, "measurements.jsonl");
        assert_eq!(config.daemon.output, "-");
        assert_eq!(config.daemon.reload_secs, 0);
        assert_eq!(config.engine.floors.len(), 1);
    }

    #[test]
    fn test_defaults_without_section() {
        let config = DaemonConfig::from_yaml("timeout: 20\n").unwrap();
        assert_eq!(config.daemon, DaemonSection::default());
        assert_eq!(config.engine.timeout, 20.0);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load_or_default(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.daemon.stats_secs, 60);
    }
}
