//! Nadaraya-Watson kernel regression on one floor.
//!
//! The location is the kernel-weighted centroid of the hearing nodes, with
//! weights from the scaled measured distance. A range scale is refit after
//! each round so that scaled measurements agree with the geometry.

use crate::confidence::confidence;
use crate::core::{Floor, Point3D};
use crate::model::{ExitReason, LinkReading, ScenarioState};
use crate::weighting::Kernel;

use super::common::{finalize, floor_links, initialize, set_pearson};
use super::{Locate, LocateContext};

const SCALE_RANGE: (f64, f64) = (0.5, 1.5);

/// Kernel regression locator bound to a floor.
#[derive(Clone, Debug, PartialEq)]
pub struct NadarayaWatson {
    /// Floor to locate on
    pub floor_id: String,
    /// Distance kernel
    pub kernel: Kernel,
    /// Scale refinement rounds
    pub iterations: usize,
}

impl NadarayaWatson {
    /// Create a locator.
    pub fn new(floor_id: &str, kernel: Kernel, iterations: usize) -> Self {
        Self {
            floor_id: floor_id.to_string(),
            kernel,
            iterations: iterations.max(1),
        }
    }

    /// Weighted centroid of the links at range scale `scale`.
    fn centroid(&self, links: &[&LinkReading], scale: f64) -> Option<Point3D> {
        let mut total = 0.0;
        let mut sum = Point3D::ORIGIN;
        for link in links {
            let w = self.kernel.evaluate(scale * link.distance);
            if w.is_finite() && w > 0.0 {
                total += w;
                sum = sum + link.location * w;
            }
        }
        (total > 0.0).then(|| sum * (1.0 / total))
    }
}

/// Least squares scale mapping measured distances onto geometric ones.
fn refit_scale(location: &Point3D, links: &[&LinkReading]) -> Option<f64> {
    let (num, den) = links.iter().fold((0.0, 0.0), |(num, den), l| {
        let geo = location.distance_to(&l.location);
        (num + geo * l.distance, den + l.distance * l.distance)
    });
    (den > f64::EPSILON).then(|| (num / den).clamp(SCALE_RANGE.0, SCALE_RANGE.1))
}

fn rms_error(location: &Point3D, links: &[&LinkReading], scale: f64) -> f64 {
    let sum: f64 = links
        .iter()
        .map(|l| (location.distance_to(&l.location) - scale * l.distance).powi(2))
        .sum();
    (sum / links.len() as f64).sqrt()
}

impl NadarayaWatson {
    /// Iterate centroid and scale refit. Returns the confidence.
    fn solve(
        &self,
        scenario: &mut ScenarioState,
        links: &[&LinkReading],
        floor: &Floor,
        guess: Point3D,
        ctx: &LocateContext<'_>,
    ) -> i32 {
        let mut scale = 1.0;
        let mut estimate = None;
        let mut rounds = 0;
        for _ in 0..self.iterations {
            let Some(location) = self.centroid(links, scale) else {
                break;
            };
            let location = floor.clamp(&location);
            estimate = Some(location);
            rounds += 1;
            if let Some(refit) = refit_scale(&location, links) {
                scale = refit;
            }
        }

        let Some(location) = estimate else {
            log::debug!(
                "{}: kernel weights vanished on {}, keeping guess",
                ctx.device_id,
                self.floor_id
            );
            scenario.reason_for_exit = Some(ExitReason::Failed);
            scenario.update_location(guess);
            return 1;
        };

        scenario.update_location(location);
        scenario.scale = Some(scale);
        scenario.iterations = Some(rounds);
        scenario.reason_for_exit = Some(ExitReason::Converged);
        let error = rms_error(&location, links, scale);
        scenario.error = Some(error);
        set_pearson(scenario, links);

        confidence(
            Some(error),
            scenario.pearson,
            links.len(),
            ctx.building.nodes_on_floor(&floor.id),
        )
    }
}

impl Locate for NadarayaWatson {
    fn locate(&self, scenario: &mut ScenarioState, ctx: &LocateContext<'_>) -> bool {
        let Some(floor) = ctx.building.floor(&self.floor_id) else {
            scenario.reset();
            return false;
        };

        let links = floor_links(ctx, &floor.id);
        let Some(guess) = initialize(scenario, &links, floor) else {
            return false;
        };

        let confidence = match floor.bounds {
            Some(_) if links.len() >= 3 => self.solve(scenario, &links, floor, guess, ctx),
            _ => {
                scenario.scale = Some(1.0);
                scenario.update_location(guess);
                1
            }
        };

        set_pearson(scenario, &links);
        finalize(scenario, confidence, Some(floor))
    }
}

#[cfg(test)]
mod tests {
    use super::super::common::test_support::*;
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;
    use std::collections::HashMap;

    fn locator(kernel: &str) -> NadarayaWatson {
        NadarayaWatson::new("ground", Kernel::from_name(kernel, &HashMap::new()), 3)
    }

    #[test]
    fn test_symmetric_links_give_center() {
        let building = building(vec![square_floor("ground", 10.0, 3.0)], 4);
        let now = Utc::now();
        let links = readings_to(Point3D::new(5.0, 5.0, 0.0), &square_nodes(), now);
        let ctx = LocateContext {
            device_id: "test",
            links: &links,
            building: &building,
            now,
        };

        for kernel in ["gaussian", "epanechnikov", "inverse_square"] {
            let mut scenario = ScenarioState::default();
            let moved = locator(kernel).locate(&mut scenario, &ctx);
            let location = scenario.location.unwrap();
            if kernel == "epanechnikov" {
                // Every link lies beyond the unit bandwidth
                assert_eq!(scenario.confidence, 1);
                assert!(moved);
                continue;
            }
            assert_relative_eq!(location.x, 5.0, epsilon = 1e-9);
            assert_relative_eq!(location.y, 5.0, epsilon = 1e-9);
            assert!(moved);
            assert!(scenario.confidence >= 5);
            assert_eq!(scenario.fixes, 4);
        }
    }

    #[test]
    fn test_pulls_toward_nearest_node() {
        let building = building(vec![square_floor("ground", 10.0, 3.0)], 4);
        let now = Utc::now();
        let links = readings_to(Point3D::new(2.0, 2.0, 0.0), &square_nodes(), now);
        let ctx = LocateContext {
            device_id: "test",
            links: &links,
            building: &building,
            now,
        };
        let mut scenario = ScenarioState::default();
        assert!(locator("inverse_square").locate(&mut scenario, &ctx));
        let location = scenario.location.unwrap();
        assert!(location.x < 5.0 && location.y < 5.0, "{location}");
        let scale = scenario.scale.unwrap();
        assert!((0.5..=1.5).contains(&scale));
    }

    #[test]
    fn test_single_link_is_inapplicable() {
        let building = building(vec![square_floor("ground", 10.0, 3.0)], 4);
        let now = Utc::now();
        let links = vec![reading("a", Point3D::new(1.0, 1.0, 0.0), 1.0, now)];
        let ctx = LocateContext {
            device_id: "test",
            links: &links,
            building: &building,
            now,
        };
        let mut scenario = ScenarioState::default();
        assert!(!locator("gaussian").locate(&mut scenario, &ctx));
        assert_eq!(scenario.confidence, 0);
    }

    #[test]
    fn test_two_links_midpoint() {
        let building = building(vec![square_floor("ground", 10.0, 3.0)], 4);
        let now = Utc::now();
        let links = vec![
            reading("a", Point3D::new(0.0, 0.0, 0.0), 1.0, now),
            reading("b", Point3D::new(10.0, 0.0, 0.0), 9.0, now),
        ];
        let ctx = LocateContext {
            device_id: "test",
            links: &links,
            building: &building,
            now,
        };
        let mut scenario = ScenarioState::default();
        assert!(locator("gaussian").locate(&mut scenario, &ctx));
        assert_eq!(scenario.location, Some(Point3D::new(5.0, 0.0, 0.0)));
        assert_eq!(scenario.confidence, 1);
    }

    #[test]
    fn test_unbounded_floor_keeps_seed() {
        let mut floor = square_floor("ground", 10.0, 3.0);
        floor.bounds = None;
        let building = building(vec![floor], 4);
        let now = Utc::now();
        let links = readings_to(Point3D::new(2.0, 2.0, 0.0), &square_nodes(), now);
        let ctx = LocateContext {
            device_id: "test",
            links: &links,
            building: &building,
            now,
        };
        let mut scenario = ScenarioState::default();
        assert!(locator("gaussian").locate(&mut scenario, &ctx));
        assert_eq!(scenario.confidence, 1);
        // Midpoint of the two nearest nodes
        assert_eq!(scenario.location, Some(Point3D::new(5.0, 0.0, 0.0)));
    }
}
