//! Fixed-location locator for anchored devices.

use crate::core::Point3D;
use crate::model::ScenarioState;

use super::{Locate, LocateContext};

/// Movement (m) below which an anchored location counts as unchanged.
const ANCHOR_EPSILON: f64 = 0.01;

/// Always reports the operator-configured location.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorLocator {
    /// Configured location
    pub location: Point3D,
}

impl AnchorLocator {
    /// Create a locator for a fixed location.
    pub fn new(location: Point3D) -> Self {
        Self { location }
    }
}

impl Locate for AnchorLocator {
    fn locate(&self, scenario: &mut ScenarioState, ctx: &LocateContext<'_>) -> bool {
        let moved = scenario.last_hit.is_none()
            || scenario
                .location
                .is_none_or(|previous| previous.distance_to(&self.location) > ANCHOR_EPSILON);

        scenario.last_hit = Some(ctx.now);
        scenario.reset_location(self.location);
        scenario.confidence = 100;
        scenario.scale = Some(1.0);
        scenario.error = Some(0.0);
        scenario.iterations = Some(0);
        scenario.fixes = ctx.links.iter().filter(|l| l.is_current(ctx.now)).count();

        scenario.floor = ctx.building.floor_containing_z(self.location.z).cloned();
        scenario.room = scenario
            .floor
            .as_ref()
            .and_then(|f| f.room_at(&self.location).cloned());

        moved
    }
}
