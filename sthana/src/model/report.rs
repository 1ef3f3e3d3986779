//! Position reports produced by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::Point3D;

/// Smoothed location of a device, emitted when a scenario moved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    /// Device id
    pub device_id: String,
    /// Device display name
    pub name: Option<String>,
    /// X (m)
    pub x: f64,
    /// Y (m)
    pub y: f64,
    /// Z (m)
    pub z: f64,
    /// Confidence of the winning scenario, 0-100
    pub confidence: i32,
    /// Links used by the winning scenario
    pub fixes: usize,
    /// Winning scenario name
    pub scenario: String,
    /// Floor id
    pub floor: Option<String>,
    /// Room name
    pub room: Option<String>,
    /// When the report was produced
    pub timestamp: DateTime<Utc>,
}

impl PositionReport {
    /// Reported location.
    pub fn location(&self) -> Point3D {
        Point3D::new(self.x, self.y, self.z)
    }
}
