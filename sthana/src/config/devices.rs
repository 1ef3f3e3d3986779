//! Device classification settings.

use serde::{Deserialize, Serialize};

use crate::core::Point3D;

/// A device rule: matches by id or name, literal or glob (`*`, `?`).
///
/// A rule with a `point` anchors every matching device at that location.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct DeviceConfig {
    /// Device id or id pattern
    #[serde(default)]
    pub id: Option<String>,

    /// Device name or name pattern
    #[serde(default)]
    pub name: Option<String>,

    /// Fixed anchor location `[x, y, z]`
    #[serde(default)]
    pub point: Option<Vec<f64>>,
}

impl DeviceConfig {
    /// Parsed anchor location.
    pub fn anchor(&self) -> Option<Point3D> {
        self.point.as_deref().and_then(Point3D::from_slice)
    }
}
