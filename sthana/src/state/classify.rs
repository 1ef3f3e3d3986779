//! Device classification rules.
//!
//! Decides whether a device is tracked and whether it has a fixed anchor.
//! Rules are checked in order, first match wins:
//!
//! 1. `exclude_devices` by id or name (untracked)
//! 2. Stored device settings with an anchor
//! 3. `devices` entries with a literal id
//! 4. `devices` entries with a literal name
//! 5. `devices` entries with an id glob
//! 6. `devices` entries with a name glob
//!
//! Globs support `*` and `?` and ignore case.

use std::collections::HashMap;

use parking_lot::RwLock;
use regex::Regex;

use crate::config::{DeviceConfig, EngineConfig};
use crate::core::Point3D;
use crate::model::Classification;

/// Externally stored per-device settings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceSettings {
    /// Display name
    pub name: Option<String>,
    /// Fixed location
    pub anchor: Option<Point3D>,
}

/// Lookup of stored device settings by device id.
pub trait DeviceSettingsSource: Send + Sync {
    /// Settings for a device, if any were stored.
    fn get(&self, device_id: &str) -> Option<DeviceSettings>;
}

/// Settings held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDeviceSettings {
    settings: RwLock<HashMap<String, DeviceSettings>>,
}

impl InMemoryDeviceSettings {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store settings for a device.
    pub fn set(&self, device_id: impl Into<String>, settings: DeviceSettings) {
        self.settings.write().insert(device_id.into(), settings);
    }

    /// Forget a device.
    pub fn remove(&self, device_id: &str) {
        self.settings.write().remove(device_id);
    }
}

impl DeviceSettingsSource for InMemoryDeviceSettings {
    fn get(&self, device_id: &str) -> Option<DeviceSettings> {
        self.settings.read().get(device_id).cloned()
    }
}

/// Literal or wildcard pattern.
#[derive(Clone, Debug)]
enum Pattern {
    Literal(String),
    Glob(Regex),
}

impl Pattern {
    fn parse(pattern: &str) -> Option<Self> {
        if !pattern.contains(['*', '?']) {
            return Some(Pattern::Literal(pattern.to_string()));
        }
        let body = regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".");
        match Regex::new(&format!("(?i)^{body}$")) {
            Ok(re) => Some(Pattern::Glob(re)),
            Err(e) => {
                log::warn!("Ignoring device pattern '{}': {}", pattern, e);
                None
            }
        }
    }

    fn is_glob(&self) -> bool {
        matches!(self, Pattern::Glob(_))
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Literal(literal) => literal.eq_ignore_ascii_case(value),
            Pattern::Glob(re) => re.is_match(value),
        }
    }
}

#[derive(Clone, Debug)]
struct Rule {
    id: Option<Pattern>,
    name: Option<Pattern>,
    anchor: Option<Point3D>,
}

impl Rule {
    fn from_config(config: &DeviceConfig) -> Self {
        Self {
            id: config.id.as_deref().and_then(Pattern::parse),
            name: config.name.as_deref().and_then(Pattern::parse),
            anchor: config.anchor(),
        }
    }

    fn matches(&self, id: &str, name: Option<&str>) -> bool {
        self.id.as_ref().is_some_and(|p| p.matches(id))
            || match (&self.name, name) {
                (Some(p), Some(name)) => p.matches(name),
                _ => false,
            }
    }
}

/// Outcome of classifying a device.
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    /// Tracked or untracked
    pub classification: Classification,
    /// Fixed location, for anchored devices
    pub anchor: Option<Point3D>,
    /// Name from stored settings
    pub name: Option<String>,
}

impl Verdict {
    fn tracked(anchor: Option<Point3D>) -> Self {
        Self {
            classification: Classification::Tracked,
            anchor,
            name: None,
        }
    }

    fn untracked() -> Self {
        Self {
            classification: Classification::Untracked,
            anchor: None,
            name: None,
        }
    }
}

/// Compiled classification rules.
#[derive(Clone, Debug, Default)]
pub struct ClassificationRules {
    include: Vec<Rule>,
    exclude: Vec<Rule>,
}

impl ClassificationRules {
    /// Compile rules from configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            include: config.devices.iter().map(Rule::from_config).collect(),
            exclude: config.exclude_devices.iter().map(Rule::from_config).collect(),
        }
    }

    /// Classify a device.
    pub fn classify(&self, id: &str, name: Option<&str>, settings: Option<&DeviceSettings>) -> Verdict {
        if self.exclude.iter().any(|r| r.matches(id, name)) {
            return Verdict::untracked();
        }

        if let Some(settings) = settings
            && settings.anchor.is_some()
        {
            return Verdict {
                name: settings.name.clone(),
                ..Verdict::tracked(settings.anchor)
            };
        }

        let literal_id = |r: &&Rule| r.id.as_ref().is_some_and(|p| !p.is_glob() && p.matches(id));
        let literal_name = |r: &&Rule| match (&r.name, name) {
            (Some(p), Some(name)) => !p.is_glob() && p.matches(name),
            _ => false,
        };
        let glob_id = |r: &&Rule| r.id.as_ref().is_some_and(|p| p.is_glob() && p.matches(id));
        let glob_name = |r: &&Rule| match (&r.name, name) {
            (Some(p), Some(name)) => p.is_glob() && p.matches(name),
            _ => false,
        };

        let matched = self
            .include
            .iter()
            .find(literal_id)
            .or_else(|| self.include.iter().find(literal_name))
            .or_else(|| self.include.iter().find(glob_id))
            .or_else(|| self.include.iter().find(glob_name));

        let mut verdict = match matched {
            Some(rule) => Verdict::tracked(rule.anchor),
            None => Verdict::untracked(),
        };
        verdict.name = settings.and_then(|s| s.name.clone());
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(yaml: &str) -> ClassificationRules {
        ClassificationRules::from_config(&EngineConfig::from_yaml(yaml).unwrap())
    }

    const DEVICES: &str = r#"
devices:
  - id: "irk:*"
  - name: "*watch*"
  - id: "phone:alice"
    point: [1, 2, 0]
  - name: "Desk Beacon"
    point: [5, 5, 1]
exclude_devices:
  - id: "irk:blocked"
"#;

    #[test]
    fn test_literal_before_glob() {
        let rules = rules(DEVICES);
        let verdict = rules.classify("phone:alice", None, None);
        assert_eq!(verdict.classification, Classification::Tracked);
        assert_eq!(verdict.anchor, Some(Point3D::new(1.0, 2.0, 0.0)));

        let verdict = rules.classify("ibeacon:1", Some("desk beacon"), None);
        assert_eq!(verdict.anchor, Some(Point3D::new(5.0, 5.0, 1.0)));
    }

    #[test]
    fn test_globs() {
        let rules = rules(DEVICES);
        assert!(rules.classify("irk:1234", None, None).anchor.is_none());
        assert_eq!(
            rules.classify("irk:1234", None, None).classification,
            Classification::Tracked
        );
        assert_eq!(
            rules.classify("mac:1", Some("Bob's Watch"), None).classification,
            Classification::Tracked
        );
        assert_eq!(
            rules.classify("mac:1", Some("Bob's Phone"), None).classification,
            Classification::Untracked
        );
    }

    #[test]
    fn test_exclusion_wins() {
        let rules = rules(DEVICES);
        let settings = DeviceSettings {
            name: None,
            anchor: Some(Point3D::ORIGIN),
        };
        let verdict = rules.classify("irk:blocked", None, Some(&settings));
        assert_eq!(verdict.classification, Classification::Untracked);
        assert!(verdict.anchor.is_none());
    }

    #[test]
    fn test_settings_anchor_before_config() {
        let rules = rules(DEVICES);
        let settings = DeviceSettings {
            name: Some("Moved Phone".into()),
            anchor: Some(Point3D::new(9.0, 9.0, 0.0)),
        };
        let verdict = rules.classify("phone:alice", None, Some(&settings));
        assert_eq!(verdict.anchor, Some(Point3D::new(9.0, 9.0, 0.0)));
        assert_eq!(verdict.name.as_deref(), Some("Moved Phone"));
    }

    #[test]
    fn test_glob_escapes_regex() {
        let pattern = Pattern::parse("a.b*").unwrap();
        assert!(pattern.matches("a.bcd"));
        assert!(!pattern.matches("axbcd"));
        assert!(Pattern::parse("?").unwrap().matches("x"));
    }

    #[test]
    fn test_in_memory_settings() {
        let store = InMemoryDeviceSettings::new();
        assert!(store.get("x").is_none());
        store.set(
            "x",
            DeviceSettings {
                name: Some("X".into()),
                anchor: None,
            },
        );
        assert_eq!(store.get("x").unwrap().name.as_deref(), Some("X"));
        store.remove("x");
        assert!(store.get("x").is_none());
    }
}
