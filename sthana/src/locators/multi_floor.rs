//! Building-wide Nelder-Mead.
//!
//! Uses every live link regardless of floor and solves for position and
//! range scale together. The floor follows from the solved height.

use std::sync::Arc;

use crate::confidence::confidence;
use crate::core::{Bounds, Building, NelderMeadSimplex, Point3D, SimplexError};
use crate::model::{ExitReason, LinkReading, ScenarioState};
use crate::weighting::Weighting;

use super::common::{finalize, live_links, perturbation, record_links, seed, set_pearson};
use super::{Locate, LocateContext};

const TOLERANCE: f64 = 1e-7;
const MAX_EVALUATIONS: usize = 10_000;

/// Nelder-Mead over all floors.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiFloor {
    /// Rank weighting of links
    pub weighting: Weighting,
}

impl MultiFloor {
    /// Create a locator.
    pub fn new(weighting: Weighting) -> Self {
        Self { weighting }
    }
}

/// Box enclosing every bounded floor.
fn building_extent(building: &Building) -> Option<Bounds> {
    building
        .floors()
        .iter()
        .filter_map(|f| f.bounds)
        .reduce(|a, b| {
            Bounds::new(
                Point3D::new(a.min.x.min(b.min.x), a.min.y.min(b.min.y), a.min.z.min(b.min.z)),
                Point3D::new(a.max.x.max(b.max.x), a.max.y.max(b.max.y), a.max.z.max(b.max.z)),
            )
        })
}

fn rms_error(location: &Point3D, links: &[&LinkReading], scale: f64) -> f64 {
    let sum: f64 = links
        .iter()
        .map(|l| (location.distance_to(&l.location) * scale - l.distance).powi(2))
        .sum();
    (sum / links.len() as f64).sqrt()
}

impl Locate for MultiFloor {
    fn locate(&self, scenario: &mut ScenarioState, ctx: &LocateContext<'_>) -> bool {
        let links = live_links(ctx);
        record_links(scenario, &links);
        let Some(guess) = seed(scenario, &links) else {
            scenario.reset();
            return false;
        };
        let extent = building_extent(ctx.building);
        let guess = extent.map_or(guess, |b| b.clamp(&guess));

        let value = if links.len() < 3 {
            scenario.scale = Some(1.0);
            scenario.update_location(guess);
            1
        } else {
            let n = links.len();
            let weights: Vec<f64> = (0..n).map(|i| self.weighting.weight(i, n)).collect();
            let weight_sum: f64 = weights.iter().sum();
            let objective = |x: &[f64]| {
                let scale = x[3];
                if scale <= 0.0 {
                    return f64::INFINITY;
                }
                let p = Point3D::new(x[0], x[1], x[2]);
                let sum: f64 = links
                    .iter()
                    .zip(&weights)
                    .map(|(l, w)| w * (p.distance_to(&l.location) * scale - l.distance).powi(2))
                    .sum();
                (5.0 * (1.0 - scale)).powi(2) + sum / weight_sum
            };

            let scale = scenario.scale.filter(|s| *s > 0.0).unwrap_or(1.0);
            let step = perturbation(&guess, &links, None);
            let start = [guess.x, guess.y, guess.z, scale];
            let steps = [step[0], step[1], step[2], 0.05 * scale];

            match NelderMeadSimplex::new(TOLERANCE, MAX_EVALUATIONS).minimize(objective, &start, &steps) {
                Ok(min) => {
                    let p = Point3D::new(min.point[0], min.point[1], min.point[2]);
                    let location = extent.map_or(p, |b| b.clamp(&p));
                    let scale = min.point[3];
                    scenario.update_location(location);
                    scenario.scale = Some(scale);
                    scenario.iterations = Some(min.evaluations);
                    scenario.reason_for_exit = Some(ExitReason::Converged);
                    let error = rms_error(&location, &links, scale);
                    scenario.error = Some(error);
                    set_pearson(scenario, &links);
                    confidence(Some(error), scenario.pearson, n, ctx.building.node_count())
                }
                Err(SimplexError::ExceededEvaluations(best)) => {
                    log::debug!(
                        "{}: multi-floor search exceeded {} evaluations",
                        ctx.device_id,
                        best.evaluations
                    );
                    scenario.iterations = Some(best.evaluations);
                    scenario.reason_for_exit = Some(ExitReason::ExceededIterations);
                    scenario.update_location(guess);
                    1
                }
                Err(e) => {
                    log::warn!("{}: multi-floor search failed: {}", ctx.device_id, e);
                    scenario.reason_for_exit = Some(ExitReason::Failed);
                    scenario.update_location(guess);
                    0
                }
            }
        };

        set_pearson(scenario, &links);
        scenario.floor = scenario
            .location
            .and_then(|p| ctx.building.floor_containing_z(p.z))
            .map(Arc::clone);
        let floor = scenario.floor.clone();
        finalize(scenario, value, floor.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::super::common::test_support::*;
    use super::*;
    use chrono::Utc;

    fn two_storey() -> Building {
        let ground = square_floor("ground", 10.0, 3.0);
        let mut first = square_floor("first", 10.0, 3.0);
        first.bounds = Some(Bounds::new(Point3D::new(0.0, 0.0, 3.0), Point3D::new(10.0, 10.0, 6.0)));
        building(vec![ground, first], 6)
    }

    #[test]
    fn test_building_extent() {
        let extent = building_extent(&two_storey()).unwrap();
        assert_eq!(extent.min, Point3D::ORIGIN);
        assert_eq!(extent.max, Point3D::new(10.0, 10.0, 6.0));
        assert!(building_extent(&Building::default()).is_none());
    }

    #[test]
    fn test_locates_upstairs() {
        let building = two_storey();
        let now = Utc::now();
        let nodes = vec![
            Point3D::new(0.0, 0.0, 1.0),
            Point3D::new(10.0, 0.0, 5.0),
            Point3D::new(10.0, 10.0, 1.0),
            Point3D::new(0.0, 10.0, 5.0),
            Point3D::new(5.0, 0.0, 3.0),
            Point3D::new(5.0, 10.0, 3.0),
        ];
        let target = Point3D::new(4.0, 6.0, 4.5);
        let links = readings_to(target, &nodes, now);
        let ctx = LocateContext {
            device_id: "test",
            links: &links,
            building: &building,
            now,
        };

        let locator = MultiFloor::new(Weighting::Equal);
        let mut scenario = ScenarioState::default();
        assert!(locator.locate(&mut scenario, &ctx));
        let location = scenario.location.unwrap();
        assert!(location.distance_to(&target) < 0.2, "{location}");
        assert_eq!(scenario.floor_id(), Some("first"));
        assert!(scenario.confidence >= 5);
    }

    #[test]
    fn test_two_links_midpoint() {
        let building = two_storey();
        let now = Utc::now();
        let links = vec![
            reading("a", Point3D::new(1.0, 1.0, 1.0), 1.0, now),
            reading("b", Point3D::new(3.0, 1.0, 1.0), 2.0, now),
        ];
        let ctx = LocateContext {
            device_id: "test",
            links: &links,
            building: &building,
            now,
        };
        let mut scenario = ScenarioState::default();
        assert!(MultiFloor::new(Weighting::default()).locate(&mut scenario, &ctx));
        assert_eq!(scenario.location, Some(Point3D::new(2.0, 1.0, 1.0)));
        assert_eq!(scenario.confidence, 1);
        assert_eq!(scenario.floor_id(), Some("ground"));
        assert_eq!(scenario.room.as_ref().map(|r| r.id.as_str()), Some("west"));
    }

    #[test]
    fn test_no_links_resets() {
        let building = two_storey();
        let ctx = LocateContext {
            device_id: "test",
            links: &[],
            building: &building,
            now: Utc::now(),
        };
        let mut scenario = ScenarioState {
            confidence: 40,
            ..Default::default()
        };
        assert!(!MultiFloor::new(Weighting::default()).locate(&mut scenario, &ctx));
        assert_eq!(scenario.confidence, 0);
    }
}
