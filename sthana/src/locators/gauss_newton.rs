//! Gauss-Newton multilateration on one floor.

use nalgebra::{Matrix3, Vector3};

use crate::core::{Bounds, Point3D};
use crate::model::{ExitReason, LinkReading, ScenarioState};

use super::common::{finalize, floor_links, initialize, mean_squared_residual, set_pearson};
use super::{Locate, LocateContext};

const MAX_ITERATIONS: usize = 100;
const STEP_EPSILON: f64 = 1e-3;
const DAMPING: f64 = 1e-3;
const COLLINEAR_EPSILON: f64 = 1e-5;
const TRANSMITTERS: usize = 4;

/// Gauss-Newton locator bound to a floor.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussNewton {
    /// Floor to locate on
    pub floor_id: String,
}

/// Outcome of the iteration.
enum Solve {
    Converged { location: Point3D, iterations: usize },
    Exhausted,
    Singular,
}

impl GaussNewton {
    /// Create a locator.
    pub fn new(floor_id: &str) -> Self {
        Self {
            floor_id: floor_id.to_string(),
        }
    }
}

/// Up to `count` transmitters, nearest first, skipping any that is
/// collinear with two already chosen. Falls back to every link when fewer
/// than `count` qualify.
fn select_non_collinear<'a>(links: &[&'a LinkReading], count: usize) -> Vec<&'a LinkReading> {
    let mut selected: Vec<&LinkReading> = Vec::with_capacity(count);
    for &candidate in links {
        let collinear = selected.iter().enumerate().any(|(j, a)| {
            selected[j + 1..].iter().any(|b| {
                let v1 = a.location - candidate.location;
                let v2 = b.location - candidate.location;
                v1.cross(&v2).norm() < COLLINEAR_EPSILON
            })
        });
        if !collinear {
            selected.push(candidate);
        }
        if selected.len() >= count {
            return selected;
        }
    }
    links.to_vec()
}

fn iterate(links: &[&LinkReading], bounds: &Bounds, guess: Point3D) -> Solve {
    let mut x = guess.to_vector();

    for iteration in 0..MAX_ITERATIONS {
        // Normal equations JᵀJ and Jᵀr accumulated row by row
        let mut normal = Matrix3::<f64>::identity() * DAMPING;
        let mut gradient = Vector3::<f64>::zeros();
        for link in links {
            let diff: Vector3<f64> = x - link.location.to_vector();
            let distance = diff.norm();
            if distance <= f64::EPSILON {
                continue;
            }
            let unit = diff / distance;
            normal += unit * unit.transpose();
            gradient += unit * (distance - link.distance);
        }

        let Some(inverse) = normal.try_inverse() else {
            return Solve::Singular;
        };
        let step = inverse * gradient;
        if !step.iter().all(|v| v.is_finite()) {
            return Solve::Singular;
        }

        let next = bounds.clamp(&Point3D::from_vector(&(x - step))).to_vector();
        let moved = (next - x).norm();
        x = next;

        if moved < STEP_EPSILON {
            return Solve::Converged {
                location: Point3D::from_vector(&x),
                iterations: iteration + 1,
            };
        }
    }

    Solve::Exhausted
}

impl Locate for GaussNewton {
    fn locate(&self, scenario: &mut ScenarioState, ctx: &LocateContext<'_>) -> bool {
        let Some(floor) = ctx.building.floor(&self.floor_id) else {
            scenario.reset();
            return false;
        };

        let links = floor_links(ctx, &floor.id);
        let Some(guess) = initialize(scenario, &links, floor) else {
            return false;
        };

        let transmitters = select_non_collinear(&links, TRANSMITTERS);
        scenario.minimum = transmitters.iter().map(|l| l.distance).reduce(f64::min);
        scenario.fixes = transmitters.len();

        let confidence = match floor.bounds {
            Some(bounds) if transmitters.len() >= 3 => match iterate(&transmitters, &bounds, guess) {
                Solve::Converged {
                    location,
                    iterations,
                } => {
                    scenario.update_location(location);
                    scenario.error = Some(mean_squared_residual(&location, &transmitters));
                    scenario.iterations = Some(iterations);
                    scenario.reason_for_exit = Some(ExitReason::Converged);
                    let minimum = scenario.minimum.unwrap_or(0.0);
                    (100.0 - minimum * minimum).clamp(10.0, 100.0) as i32
                }
                Solve::Exhausted => {
                    log::debug!(
                        "{}: Gauss-Newton on {} did not converge",
                        ctx.device_id,
                        self.floor_id
                    );
                    scenario.iterations = Some(MAX_ITERATIONS);
                    scenario.reason_for_exit = Some(ExitReason::ExceededIterations);
                    scenario.update_location(guess);
                    1
                }
                Solve::Singular => {
                    log::warn!(
                        "{}: Gauss-Newton on {} hit a singular system",
                        ctx.device_id,
                        self.floor_id
                    );
                    scenario.reason_for_exit = Some(ExitReason::Failed);
                    scenario.update_location(guess);
                    0
                }
            },
            _ => {
                scenario.update_location(guess);
                1
            }
        };

        set_pearson(scenario, &links);
        finalize(scenario, confidence, Some(floor))
    }
}
