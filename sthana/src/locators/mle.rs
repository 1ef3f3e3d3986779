//! Variance-weighted maximum-likelihood multilateration on one floor.
//!
//! Each link contributes the Gaussian negative log-likelihood of its range
//! residual, `(r·s - d)² / 2σ²`, where `σ²` is the variance the receiver
//! reported for the distance. Location and range scale `s` are searched
//! together with Nelder-Mead. Leaving the floor box or the scale range is
//! penalized rather than rejected so the simplex can walk back in.

use crate::core::{Bounds, NelderMeadSimplex, Point3D, SimplexError};
use crate::model::{ExitReason, LinkReading, ScenarioState};
use crate::weighting::Weighting;

use super::common::{finalize, floor_links, initialize, perturbation, set_pearson};
use super::nelder_mead::SCALE_RANGE;
use super::{Locate, LocateContext};

const TOLERANCE: f64 = 1e-7;
const MAX_EVALUATIONS: usize = 10_000;
const MIN_VARIANCE: f64 = 1e-6;

/// Maximum-likelihood locator bound to a floor.
#[derive(Clone, Debug, PartialEq)]
pub struct Mle {
    /// Floor to locate on
    pub floor_id: String,
    /// Rank weighting of links
    pub weighting: Weighting,
    /// Variance assumed for links that report none (m²)
    pub default_variance: f64,
}

impl Mle {
    /// Create a locator.
    pub fn new(floor_id: &str, weighting: Weighting, default_variance: f64) -> Self {
        Self {
            floor_id: floor_id.to_string(),
            weighting,
            default_variance,
        }
    }

    fn variance(&self, link: &LinkReading) -> f64 {
        link.variance
            .unwrap_or(self.default_variance)
            .max(MIN_VARIANCE)
    }

    fn objective<'a>(
        &'a self,
        links: &'a [&'a LinkReading],
        weights: &'a [f64],
        bounds: Bounds,
    ) -> impl Fn(&[f64]) -> f64 + 'a {
        move |x: &[f64]| {
            let p = Point3D::new(x[0], x[1], x[2]);
            let scale = x[3];
            let outside = bounds.distance_outside(&p)
                + (SCALE_RANGE.0 - scale).max(0.0)
                + (scale - SCALE_RANGE.1).max(0.0);
            let mut penalty = (5.0 * (1.0 - scale)).powi(2);
            if outside > 0.0 {
                penalty += 5f64.powf(1.0 + outside);
            }

            let sum: f64 = links
                .iter()
                .zip(weights)
                .map(|(l, w)| {
                    let residual = p.distance_to(&l.location) * scale - l.distance;
                    let nll = residual * residual / (2.0 * self.variance(l));
                    w * nll * nll
                })
                .sum();
            let total: f64 = weights.iter().sum();
            penalty + if total > 0.0 { sum / total } else { 0.0 }
        }
    }

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

        let floor = ctx.building.floor(&self.floor_id);
        let step = perturbation(&guess, links, floor.map(|f| f.as_ref()));
        let scale = scenario
            .scale
            .filter(|s| (SCALE_RANGE.0..=SCALE_RANGE.1).contains(s))
            .unwrap_or(1.0);
        let start = [guess.x, guess.y, guess.z, scale];
        let steps = [step[0], step[1], step[2], 0.05 * scale];

        let solver = NelderMeadSimplex::new(TOLERANCE, MAX_EVALUATIONS);
        match solver.minimize(objective, &start, &steps) {
            Ok(min) => {
                let location = bounds.clamp(&Point3D::new(min.point[0], min.point[1], min.point[2]));
                let scale = min.point[3].clamp(SCALE_RANGE.0, SCALE_RANGE.1);
                scenario.update_location(location);
                scenario.scale = Some(scale);
                scenario.error = Some(min.value);
                scenario.iterations = Some(min.evaluations);
                scenario.reason_for_exit = Some(ExitReason::Converged);
                confidence(scenario.minimum.unwrap_or(1.0), scale, min.value)
            }
            Err(SimplexError::ExceededEvaluations(best)) => {
                log::debug!(
                    "{}: MLE on {} exceeded {} evaluations",
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
                log::warn!("{}: MLE on {} failed: {}", ctx.device_id, self.floor_id, e);
                scenario.reason_for_exit = Some(ExitReason::Failed);
                scenario.update_location(guess);
                0
            }
        }
    }
}

/// Confidence from the nearest distance, scale deviation and likelihood.
fn confidence(minimum: f64, scale: f64, value: f64) -> i32 {
    let loss = minimum * minimum + (10.0 * (1.0 - scale)).powi(2) + minimum + value;
    (100.0 - loss).clamp(10.0, 100.0) as i32
}

impl Locate for Mle {
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
