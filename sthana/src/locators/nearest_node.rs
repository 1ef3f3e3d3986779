//! Nearest-node fallback: the device is wherever its closest node is.

use std::sync::Arc;

use crate::core::Floor;
use crate::model::{LinkReading, ScenarioState};

use super::common::live_links;
use super::{Locate, LocateContext};

/// Report the location of the nearest hearing node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NearestNode {
    /// Ignore links farther than this (meters)
    pub max_distance: Option<f64>,
}

impl NearestNode {
    /// Create a locator.
    pub fn new(max_distance: Option<f64>) -> Self {
        Self { max_distance }
    }
}

/// Floor of the node whose bounds contain its location.
fn node_floor(link: &LinkReading, ctx: &LocateContext<'_>) -> Option<Arc<Floor>> {
    let candidates: Vec<&Arc<Floor>> = match &link.floors {
        Some(ids) => ids.iter().filter_map(|id| ctx.building.floor(id)).collect(),
        None => ctx.building.floors().iter().collect(),
    };
    candidates
        .into_iter()
        .find(|f| f.contains(&link.location))
        .map(Arc::clone)
}

impl Locate for NearestNode {
    fn locate(&self, scenario: &mut ScenarioState, ctx: &LocateContext<'_>) -> bool {
        let nearest = live_links(ctx)
            .into_iter()
            .filter(|l| self.max_distance.is_none_or(|max| l.distance <= max))
            .min_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| a.node_id.cmp(&b.node_id))
            });

        let Some(link) = nearest else {
            scenario.reset();
            return false;
        };

        scenario.update_location(link.location);
        scenario.confidence = 1;
        scenario.fixes = 1;
        scenario.scale = None;
        scenario.error = None;
        scenario.minimum = Some(link.distance);
        scenario.last_hit = Some(link.last_hit);
        scenario.pearson = None;

        scenario.floor = node_floor(link, ctx);
        scenario.room = scenario.floor.as_ref().and_then(|floor| {
            floor
                .room_at(&link.location)
                .or_else(|| floor.room_named(&link.node_id))
                .or_else(|| floor.room_named(&link.node_name))
                .cloned()
        });

        scenario.has_moved()
    }
}
