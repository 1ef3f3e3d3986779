//! Main EngineConfig and loading.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::building::{FloorConfig, NodeConfig};
use super::defaults;
use super::devices::DeviceConfig;
use super::error::ConfigLoadError;
use super::locators::LocatorsSection;
use super::optimization::OptimizationSection;
use super::runtime::{FilteringSection, PipelineSection};

/// Full engine configuration loaded from YAML
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default link timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout: f64,

    /// Floors with bounds and rooms
    #[serde(default)]
    pub floors: Vec<FloorConfig>,

    /// Reference nodes
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Devices to track (literal or glob) and anchors
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Devices never tracked
    #[serde(default)]
    pub exclude_devices: Vec<DeviceConfig>,

    /// Locator selection
    #[serde(default)]
    pub locators: LocatorsSection,

    /// Calibration optimizers
    #[serde(default)]
    pub optimization: OptimizationSection,

    /// Position smoothing
    #[serde(default)]
    pub filtering: FilteringSection,

    /// Pipeline cadence
    #[serde(default)]
    pub pipeline: PipelineSection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: defaults::timeout(),
            floors: Vec::new(),
            nodes: Vec::new(),
            devices: Vec::new(),
            exclude_devices: Vec::new(),
            locators: LocatorsSection::default(),
            optimization: OptimizationSection::default(),
            filtering: FilteringSection::default(),
            pipeline: PipelineSection::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Load from default config path (configs/config.yaml)
    pub fn load_default() -> Result<Self, ConfigLoadError> {
        let path = Path::new("configs/config.yaml");
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(ConfigLoadError::Invalid(format!(
                "timeout must be positive, got {}",
                self.timeout
            )));
        }

        let mut seen = HashSet::new();
        for floor in &self.floors {
            let id = floor.id();
            if !seen.insert(id.clone()) {
                return Err(ConfigLoadError::Invalid(format!("duplicate floor id '{}'", id)));
            }
        }

        let limits = &self.optimization.limits;
        if limits.absorption_min > limits.absorption_max
            || limits.rx_adj_rssi_min > limits.rx_adj_rssi_max
            || limits.tx_ref_rssi_min > limits.tx_ref_rssi_max
        {
            return Err(ConfigLoadError::Invalid(
                "optimization limits have min > max".to_string(),
            ));
        }

        let variance = self.locators.mle.default_variance;
        if !(variance.is_finite() && variance > 0.0) {
            return Err(ConfigLoadError::Invalid(format!(
                "mle default_variance must be positive, got {}",
                variance
            )));
        }

        Ok(())
    }

    /// Default link timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    /// Look up a node's configuration by resolved id.
    pub fn node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
timeout: 20
floors:
  - name: Ground Floor
    bounds: [[0, 0, 0], [10, 10, 3]]
    rooms:
      - name: Kitchen
        points: [[0, 0], [5, 0], [5, 5], [0, 5]]
nodes:
  - name: Kitchen
    point: [1, 1, 1]
    floors: [ground_floor]
  - id: hall
    point: [9, 9, 1]
    stationary: false
    calibration:
      absorption: 3.2
devices:
  - id: "irk:*"
  - name: "Keys"
    point: [2, 2, 1]
exclude_devices:
  - id: "apple:*"
locators:
  nadaraya_watson:
    enabled: true
    floors: ["floor1", "floor2"]
    bandwidth: 0.5
    kernel: "gaussian"
  nelder_mead:
    enabled: false
    floors: ["floor3"]
    weighting:
      algorithm: "linear"
  nearest_node:
    enabled: true
    max_distance: 10.0
optimization:
  enabled: true
  interval_secs: 30
  limits:
    absorption_min: 2.5
"#;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout, 30.0);
        assert!(!config.optimization.enabled);
        assert_eq!(config.optimization.interval_secs, 60);
        assert_eq!(config.filtering.max_velocity, 0.5);
        assert_eq!(config.locators.nelder_mead.weighting.algorithm, "exponential");
    }

    #[test]
    fn test_parse_sample() {
        let config = EngineConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.timeout, 20.0);
        assert_eq!(config.floors[0].id(), "ground_floor");
        assert_eq!(config.nodes[0].id(), "kitchen");
        assert!(config.nodes[0].stationary);
        assert!(!config.nodes[1].stationary);
        assert_eq!(config.nodes[1].calibration.absorption, Some(3.2));
        assert_eq!(config.devices.len(), 2);
        assert!(config.devices[1].anchor().is_some());
        assert_eq!(config.optimization.limits.absorption_min, 2.5);
        assert_eq!(config.optimization.limits.absorption_max, 4.0);
    }

    #[test]
    fn test_locators_deserialization() {
        let config = EngineConfig::from_yaml(SAMPLE).unwrap();
        let nw = &config.locators.nadaraya_watson;
        assert!(nw.enabled);
        assert_eq!(nw.floors.as_deref(), Some(&["floor1".to_string(), "floor2".to_string()][..]));
        assert_eq!(nw.bandwidth, Some(0.5));
        assert_eq!(nw.kernel, "gaussian");

        let nm = &config.locators.nelder_mead;
        assert!(!nm.enabled);
        assert_eq!(nm.weighting.algorithm, "linear");
        assert!(nm.estimate_scale);

        assert!(config.locators.nearest_node.enabled);
        assert_eq!(config.locators.nearest_node.max_distance, Some(10.0));
        assert!(config.locators.any_enabled());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = EngineConfig::from_yaml("timeout: -1").unwrap_err();
        assert!(matches!(err, ConfigLoadError::Invalid(_)));

        let dup = "floors:\n  - id: a\n  - id: a\n";
        assert!(matches!(
            EngineConfig::from_yaml(dup),
            Err(ConfigLoadError::Invalid(_))
        ));

        let variance = "locators:\n  mle:\n    default_variance: 0\n";
        assert!(matches!(
            EngineConfig::from_yaml(variance),
            Err(ConfigLoadError::Invalid(_))
        ));

        let parse = EngineConfig::from_yaml("floors: 3").unwrap_err();
        assert!(matches!(parse, ConfigLoadError::Parse(_)));
        assert!(std::error::Error::source(&parse).is_some());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.nodes.len(), 2);

        let missing = EngineConfig::load(Path::new("/nonexistent/sthana.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigLoadError::Io { .. }));
        assert!(missing.to_string().contains("/nonexistent/sthana.yaml"));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = EngineConfig::from_yaml(SAMPLE).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.nodes.len(), config.nodes.len());
        assert_eq!(parsed.locators, config.locators);
    }
}
