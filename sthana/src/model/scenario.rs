//! Per-device locator bindings and their running state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Floor, Point3D, Room};
use crate::locators::{Locate, LocateContext, Locator, LocatorKind};

/// Minimum move (m) for a scenario to report a new location.
pub const MOVED_THRESHOLD: f64 = 0.1;

/// Why an iterative locator stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Step or simplex spread fell below tolerance
    Converged,
    /// Iteration or evaluation cap reached
    ExceededIterations,
    /// Numerical failure; the previous guess was reused
    Failed,
}

/// Identity of a scenario within a device: locator kind plus floor.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScenarioKey {
    /// Locator kind
    pub kind: LocatorKind,
    /// Floor id for floor-bound locators
    pub floor: Option<String>,
}

impl std::fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.floor {
            Some(floor) => write!(f, "{}@{}", self.kind.name(), floor),
            None => write!(f, "{}", self.kind.name()),
        }
    }
}

/// Estimation state retained across invocations.
#[derive(Clone, Debug, Default)]
pub struct ScenarioState {
    /// Current location
    pub location: Option<Point3D>,
    /// Location before the latest update
    pub last_location: Option<Point3D>,
    /// Trust in `location`, 0-100
    pub confidence: i32,
    /// Estimated global range scale
    pub scale: Option<f64>,
    /// Links used
    pub fixes: usize,
    /// Residual error of the fit
    pub error: Option<f64>,
    /// Iterations or evaluations spent
    pub iterations: Option<usize>,
    /// Why the search stopped
    pub reason_for_exit: Option<ExitReason>,
    /// Smallest live link distance
    pub minimum: Option<f64>,
    /// Pearson r of mapped vs measured distances
    pub pearson: Option<f64>,
    /// Latest hit among the links used
    pub last_hit: Option<DateTime<Utc>>,
    /// Resolved floor
    pub floor: Option<Arc<Floor>>,
    /// Resolved room
    pub room: Option<Room>,
}

impl ScenarioState {
    /// Move to a new location, remembering the previous one.
    pub fn update_location(&mut self, location: Point3D) {
        self.last_location = self.location;
        self.location = Some(location);
    }

    /// Jump to a location with no history.
    pub fn reset_location(&mut self, location: Point3D) {
        self.last_location = Some(location);
        self.location = Some(location);
    }

    /// Mark as inapplicable this round.
    pub fn reset(&mut self) {
        self.room = None;
        self.floor = None;
        self.error = None;
        self.confidence = 0;
    }

    /// Distance moved by the latest update, `None` without history.
    pub fn moved_distance(&self) -> Option<f64> {
        match (self.location, self.last_location) {
            (Some(a), Some(b)) => Some(a.distance_to(&b)),
            (Some(_), None) => None,
            _ => Some(0.0),
        }
    }

    /// True if the latest update moved at least [`MOVED_THRESHOLD`].
    pub fn has_moved(&self) -> bool {
        self.moved_distance().is_none_or(|d| d >= MOVED_THRESHOLD)
    }

    /// Floor id, if resolved.
    pub fn floor_id(&self) -> Option<&str> {
        self.floor.as_ref().map(|f| f.id.as_str())
    }

    /// Room name, if resolved.
    pub fn room_name(&self) -> Option<&str> {
        self.room.as_ref().map(|r| r.name.as_str())
    }
}

/// One (device, locator) binding.
#[derive(Clone, Debug)]
pub struct Scenario {
    key: ScenarioKey,
    locator: Locator,
    /// Running state
    pub state: ScenarioState,
}

impl Scenario {
    /// Bind a locator.
    pub fn new(locator: Locator) -> Self {
        Self {
            key: locator.key(),
            locator,
            state: ScenarioState::default(),
        }
    }

    /// Scenario identity.
    pub fn key(&self) -> &ScenarioKey {
        &self.key
    }

    /// Display name, e.g. `nelder_mead@ground`.
    pub fn name(&self) -> String {
        self.key.to_string()
    }

    /// Bound locator.
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Replace the locator, keeping the running state.
    pub fn set_locator(&mut self, locator: Locator) {
        self.key = locator.key();
        self.locator = locator;
    }

    /// Run the locator; true if the location moved enough to report.
    pub fn locate(&mut self, ctx: &LocateContext<'_>) -> bool {
        self.locator.locate(&mut self.state, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_location_tracks_history() {
        let mut state = ScenarioState::default();
        assert!(!state.has_moved());

        state.update_location(Point3D::new(1.0, 0.0, 0.0));
        assert!(state.has_moved());

        state.update_location(Point3D::new(1.05, 0.0, 0.0));
        assert!(!state.has_moved());
        assert_eq!(state.last_location, Some(Point3D::new(1.0, 0.0, 0.0)));

        state.update_location(Point3D::new(2.0, 0.0, 0.0));
        assert!(state.has_moved());
    }

    #[test]
    fn test_reset_location_has_no_move() {
        let mut state = ScenarioState::default();
        state.reset_location(Point3D::new(3.0, 3.0, 0.0));
        assert!(!state.has_moved());
    }

    #[test]
    fn test_reset() {
        let mut state = ScenarioState {
            confidence: 80,
            error: Some(0.2),
            ..Default::default()
        };
        state.reset();
        assert_eq!(state.confidence, 0);
        assert!(state.error.is_none());
        assert!(state.floor.is_none());
        assert!(state.room.is_none());
    }

    #[test]
    fn test_key_display() {
        let key = ScenarioKey {
            kind: LocatorKind::NelderMead,
            floor: Some("ground".into()),
        };
        assert_eq!(key.to_string(), "nelder_mead@ground");
        let key = ScenarioKey {
            kind: LocatorKind::NearestNode,
            floor: None,
        };
        assert_eq!(key.to_string(), "nearest_node");
    }
}
