//! Nelder-Mead simplex multilateration on one floor.
//!
//! Minimizes the rank-weighted mean squared range residual. The
//! scale-estimating variant adds a global range scale as a fourth variable,
//! penalized toward 1 and confined to `[0.5, 1.5]`.

use crate::core::{Bounds, NelderMeadSimplex, Point3D, SimplexError};
use crate::model::{ExitReason, LinkReading, ScenarioState};
use crate::weighting::Weighting;

use super::common::{finalize, floor_links, initialize, perturbation, set_pearson};
use super::{Locate, LocateContext};

const TOLERANCE: f64 = 1e-7;
const MAX_EVALUATIONS: usize = 10_000;

/// Scale bounds for the scale-estimating variant.
pub const SCALE_RANGE: (f64, f64) = (0.5, 1.5);

/// Nelder-Mead locator bound to a floor.
#[derive(Clone, Debug, PartialEq)]
pub struct NelderMead {
    /// Floor to locate on
    pub floor_id: String,
    /// Rank weighting of links
    pub weighting: Weighting,
    /// Estimate the range scale as a fourth variable
    pub estimate_scale: bool,
}

impl NelderMead {
    /// Create a locator.
    pub fn new(floor_id: &str, weighting: Weighting, estimate_scale: bool) -> Self {
        Self {
            floor_id: floor_id.to_string(),
            weighting,
            estimate_scale,
        }
    }

    fn objective<'a>(
        &'a self,
        links: &'a [&'a LinkReading],
        weights: &'a [f64],
        bounds: Bounds,
    ) -> impl Fn(&[f64]) -> f64 + 'a {
        move |x: &[f64]| {
            let p = Point3D::new(x[0], x[1], x[2]);
            let (scale, penalty) = if self.estimate_scale {
                let scale = x[3];
                if !bounds.contains(&p) || !(SCALE_RANGE.0..=SCALE_RANGE.1).contains(&scale) {
                    return f64::INFINITY;
                }
                (scale, (5.0 * (1.0 - scale)).powi(2))
            } else {
                let outside = bounds.distance_outside(&p);
                let penalty = if outside > 0.0 { 5f64.powf(1.0 + outside) } else { 0.0 };
                (1.0, penalty)
            };

            let sum: f64 = links
                .iter()
                .zip(weights)
                .map(|(l, w)| w * (p.distance_to(&l.location) * scale - l.distance).powi(2))
                .sum();
            penalty + sum / links.len() as f64
        }
    }

    /// Run the simplex search; returns the confidence.
    fn solve(
        &self,
        scenario: &mut ScenarioState,
        links: &[&LinkReading],
        bounds: Bounds,
        guess: Point3D,
        ctx: &LocateContext<'_>,
    ) -> i32 {
        let n = links.len();
        let weights: Vec<f64> = (0..n).map(|i| self.weighting.weight(i, n)).collect();
        let objective = self.objective(links, &weights, bounds);

        let step = perturbation(&guess, links, ctx.building.floor(&self.floor_id).map(|f| f.as_ref()));
        let mut start = vec![guess.x, guess.y, guess.z];
        let mut steps = step.to_vec();
        if self.estimate_scale {
            let scale = scenario
                .scale
                .filter(|s| (SCALE_RANGE.0..=SCALE_RANGE.1).contains(s))
                .unwrap_or(1.0);
            start.push(scale);
            steps.push(0.05 * scale);
        }

        let solver = NelderMeadSimplex::new(TOLERANCE, MAX_EVALUATIONS);
        match solver.minimize(objective, &start, &steps) {
            Ok(min) => {
                let location = bounds.clamp(&Point3D::new(min.point[0], min.point[1], min.point[2]));
                let scale = if self.estimate_scale {
                    min.point[3].clamp(SCALE_RANGE.0, SCALE_RANGE.1)
                } else {
                    1.0
                };
                scenario.update_location(location);
                scenario.scale = Some(scale);
                scenario.error = Some(min.value);
                scenario.iterations = Some(min.evaluations);
                scenario.reason_for_exit = Some(ExitReason::Converged);
                confidence(scenario.minimum.unwrap_or(1.0), scale, min.value, n)
            }
            Err(SimplexError::ExceededEvaluations(best)) => {
                log::debug!(
                    "{}: Nelder-Mead on {} exceeded {} evaluations",
                    ctx.device_id,
                    self.floor_id,
                    best.evaluations
                );
                scenario.iterations = Some(best.evaluations);
                scenario.reason_for_exit = Some(ExitReason::ExceededIterations);
                scenario.update_location(guess);
                1
            }
            Err(e) => {
                log::warn!(
                    "{}: Nelder-Mead on {} failed: {}",
                    ctx.device_id,
                    self.floor_id,
                    e
                );
                scenario.reason_for_exit = Some(ExitReason::Failed);
                scenario.update_location(guess);
                0
            }
        }
    }
}

/// Confidence from the nearest distance, scale deviation, fit and link count.
fn confidence(minimum: f64, scale: f64, value: f64, fixes: usize) -> i32 {
    let loss = 0.5 * minimum * minimum + (10.0 * (1.0 - scale)).powi(2) + minimum + 10.0 * value;
    let bonus = 2.0 * (fixes as f64 - 3.0);
    (100.0 - loss + bonus).clamp(10.0, 100.0) as i32
}

impl Locate for NelderMead {
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
            Some(bounds) if links.len() >= 3 => self.solve(scenario, &links, bounds, guess, ctx),
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
