//! Building geometry and node placement settings.

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::core::{Bounds, Floor, Point2D, Point3D, Polygon, Room};

/// Derive a stable identifier from an explicit id or a display name.
///
/// `"Living Room"` becomes `"living_room"`.
pub fn derive_id(id: Option<&str>, name: Option<&str>) -> String {
    if let Some(id) = id.filter(|s| !s.trim().is_empty()) {
        return id.to_string();
    }
    let Some(name) = name.filter(|s| !s.trim().is_empty()) else {
        return "none".to_string();
    };

    let mut out = String::with_capacity(name.len());
    let mut last_underscore = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Floor settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct FloorConfig {
    /// Floor id (derived from the name when absent)
    #[serde(default)]
    pub id: Option<String>,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Bounding box as two corners `[[x, y, z], [x, y, z]]`
    #[serde(default)]
    pub bounds: Option<Vec<Vec<f64>>>,

    /// Rooms on this floor
    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
}

impl FloorConfig {
    /// Resolved floor id.
    pub fn id(&self) -> String {
        derive_id(self.id.as_deref(), self.name.as_deref())
    }

    /// Parsed bounding box, if two valid corners are configured.
    pub fn parsed_bounds(&self) -> Option<Bounds> {
        let corners = self.bounds.as_ref()?;
        let min = Point3D::from_slice(corners.first()?)?;
        let max = Point3D::from_slice(corners.get(1)?)?;
        Some(Bounds::new(min, max))
    }

    /// Convert to runtime geometry.
    pub fn to_floor(&self) -> Floor {
        let id = self.id();
        Floor {
            name: self.name.clone().unwrap_or_else(|| id.clone()),
            id,
            bounds: self.parsed_bounds(),
            rooms: self.rooms.iter().map(RoomConfig::to_room).collect(),
        }
    }
}

/// Room settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RoomConfig {
    /// Room id (derived from the name when absent)
    #[serde(default)]
    pub id: Option<String>,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Outline vertices `[[x, y], ...]`
    #[serde(default)]
    pub points: Vec<Vec<f64>>,
}

impl RoomConfig {
    /// Resolved room id.
    pub fn id(&self) -> String {
        derive_id(self.id.as_deref(), self.name.as_deref())
    }

    /// Convert to runtime geometry.
    pub fn to_room(&self) -> Room {
        let id = self.id();
        let points: Vec<Point2D> = self
            .points
            .iter()
            .filter_map(|p| Point2D::from_slice(p))
            .collect();
        Room {
            name: self.name.clone().unwrap_or_else(|| id.clone()),
            id,
            polygon: Polygon::new(points),
        }
    }
}

/// Per-node calibration defaults.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct NodeCalibrationConfig {
    /// Expected RSSI at 1m from a reference transmitter (dBm)
    #[serde(default)]
    pub tx_ref_rssi: Option<f64>,

    /// Receiver RSSI adjustment (dB)
    #[serde(default)]
    pub rx_adj_rssi: Option<f64>,

    /// Path-loss exponent
    #[serde(default)]
    pub absorption: Option<f64>,
}

/// Node placement settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node id (derived from the name when absent)
    #[serde(default)]
    pub id: Option<String>,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Location `[x, y, z]`
    #[serde(default)]
    pub point: Option<Vec<f64>>,

    /// Floors this node hears on (all floors when absent)
    #[serde(default)]
    pub floors: Option<Vec<String>>,

    /// Fixed installation; only stationary nodes feed calibration
    #[serde(default = "defaults::stationary")]
    pub stationary: bool,

    /// Disabled nodes are not created
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Link timeout in seconds (global timeout when absent)
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Calibration defaults
    #[serde(default)]
    pub calibration: NodeCalibrationConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            point: None,
            floors: None,
            stationary: defaults::stationary(),
            enabled: defaults::enabled(),
            timeout: None,
            calibration: NodeCalibrationConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Resolved node id.
    pub fn id(&self) -> String {
        derive_id(self.id.as_deref(), self.name.as_deref())
    }

    /// Parsed location.
    pub fn location(&self) -> Option<Point3D> {
        self.point.as_deref().and_then(Point3D::from_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_id() {
        assert_eq!(derive_id(Some("abc"), Some("Other")), "abc");
        assert_eq!(derive_id(None, Some("Living Room")), "living_room");
        assert_eq!(derive_id(None, Some("  Bed-Room 2 ")), "bed_room_2");
        assert_eq!(derive_id(Some(""), None), "none");
    }

    #[test]
    fn test_floor_conversion() {
        let cfg = FloorConfig {
            id: None,
            name: Some("Ground Floor".into()),
            bounds: Some(vec![vec![0.0, 0.0, 0.0], vec![10.0, 8.0, 3.0]]),
            rooms: vec![RoomConfig {
                id: None,
                name: Some("Kitchen".into()),
                points: vec![vec![0.0, 0.0], vec![4.0, 0.0], vec![4.0, 4.0], vec![0.0, 4.0]],
            }],
        };
        let floor = cfg.to_floor();
        assert_eq!(floor.id, "ground_floor");
        assert_eq!(floor.name, "Ground Floor");
        assert!(floor.bounds.is_some());
        assert_eq!(floor.rooms[0].id, "kitchen");
        assert!(floor.rooms[0].polygon.is_some());
    }

    #[test]
    fn test_floor_without_bounds() {
        let cfg = FloorConfig {
            id: Some("attic".into()),
            bounds: Some(vec![vec![0.0, 0.0, 0.0]]),
            ..Default::default()
        };
        assert!(cfg.to_floor().bounds.is_none());
    }
}
