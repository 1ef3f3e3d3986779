//! Derivative-free Nelder-Mead simplex minimization.
//!
//! Used by the multilateration locators and the calibration optimizers.
//! Objectives may return `+∞` to reject a region; such vertices are
//! replaced by contraction like any other poor vertex.

use thiserror::Error;

/// Keeps the convergence test finite when the minimum is near zero.
const JITTER: f64 = 1e-10;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Result of a converged search.
#[derive(Clone, Debug, PartialEq)]
pub struct Minimum {
    /// Minimizing point
    pub point: Vec<f64>,
    /// Objective value at `point`
    pub value: f64,
    /// Objective evaluations spent
    pub evaluations: usize,
}

/// Simplex search failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimplexError {
    /// Evaluation cap reached before convergence; carries the best vertex
    #[error("exceeded {} evaluations (best value {})", .0.evaluations, .0.value)]
    ExceededEvaluations(Minimum),

    /// Every vertex of the simplex evaluated to a non-finite value
    #[error("objective is not finite on the initial simplex")]
    NonFinite,

    /// Start point and perturbation lengths differ or are empty
    #[error("invalid dimensions: start {start}, perturbation {perturbation}")]
    Dimension {
        /// Start point length
        start: usize,
        /// Perturbation length
        perturbation: usize,
    },
}

/// Nelder-Mead simplex solver.
///
/// # Example
///
/// ```
/// use sthana::core::NelderMeadSimplex;
///
/// let solver = NelderMeadSimplex::new(1e-10, 2000);
/// let min = solver
///     .minimize(|x| (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2), &[0.0, 0.0], &[0.5, 0.5])
///     .unwrap();
/// assert!((min.point[0] - 1.0).abs() < 1e-3);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct NelderMeadSimplex {
    tolerance: f64,
    max_evaluations: usize,
}

impl NelderMeadSimplex {
    /// Create a solver.
    ///
    /// # Arguments
    /// * `tolerance` - Relative spread of vertex values at which to stop
    /// * `max_evaluations` - Objective evaluation cap
    pub fn new(tolerance: f64, max_evaluations: usize) -> Self {
        Self {
            tolerance,
            max_evaluations,
        }
    }

    /// Minimize `f` starting at `start`.
    ///
    /// Vertex `i + 1` of the initial simplex is `start` moved by
    /// `perturbation[i]` along axis `i`.
    pub fn minimize<F>(&self, f: F, start: &[f64], perturbation: &[f64]) -> Result<Minimum, SimplexError>
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = start.len();
        if n == 0 || perturbation.len() != n {
            return Err(SimplexError::Dimension {
                start: n,
                perturbation: perturbation.len(),
            });
        }

        let eval = |x: &[f64]| {
            let v = f(x);
            if v.is_nan() { f64::INFINITY } else { v }
        };

        let mut vertices: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        vertices.push(start.to_vec());
        for (i, step) in perturbation.iter().enumerate() {
            let mut v = start.to_vec();
            v[i] += step;
            vertices.push(v);
        }
        let mut values: Vec<f64> = vertices.iter().map(|v| eval(v)).collect();
        let mut evaluations = n + 1;

        if values.iter().all(|v| !v.is_finite()) {
            return Err(SimplexError::NonFinite);
        }

        let mut order: Vec<usize> = (0..=n).collect();
        loop {
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            let best = order[0];
            let worst = order[n];
            let second_worst = order[n - 1];

            if converged(values[best], values[worst], self.tolerance) {
                return Ok(Minimum {
                    point: vertices[best].clone(),
                    value: values[best],
                    evaluations,
                });
            }

            if evaluations >= self.max_evaluations {
                return Err(SimplexError::ExceededEvaluations(Minimum {
                    point: vertices[best].clone(),
                    value: values[best],
                    evaluations,
                }));
            }

            let centroid = centroid(&vertices, worst);

            let reflected = along(&centroid, &vertices[worst], -REFLECTION);
            let f_reflected = eval(&reflected);
            evaluations += 1;

            if f_reflected < values[best] {
                let expanded = along(&centroid, &vertices[worst], -EXPANSION);
                let f_expanded = eval(&expanded);
                evaluations += 1;
                if f_expanded < f_reflected {
                    vertices[worst] = expanded;
                    values[worst] = f_expanded;
                } else {
                    vertices[worst] = reflected;
                    values[worst] = f_reflected;
                }
                continue;
            }

            if f_reflected < values[second_worst] {
                vertices[worst] = reflected;
                values[worst] = f_reflected;
                continue;
            }

            // Contract outside toward the reflection or inside toward the worst vertex
            let (contracted, threshold) = if f_reflected < values[worst] {
                (along(&centroid, &reflected, CONTRACTION), f_reflected)
            } else {
                (along(&centroid, &vertices[worst], CONTRACTION), values[worst])
            };
            let f_contracted = eval(&contracted);
            evaluations += 1;

            if f_contracted <= threshold && f_contracted.is_finite() {
                vertices[worst] = contracted;
                values[worst] = f_contracted;
                continue;
            }

            // Shrink toward the best vertex
            let anchor = vertices[best].clone();
            for i in 0..=n {
                if i == best {
                    continue;
                }
                vertices[i] = along(&anchor, &vertices[i], SHRINK);
                values[i] = eval(&vertices[i]);
                evaluations += 1;
            }
        }
    }
}

fn converged(best: f64, worst: f64, tolerance: f64) -> bool {
    if !best.is_finite() || !worst.is_finite() {
        return false;
    }
    2.0 * (worst - best).abs() / (best.abs() + worst.abs() + JITTER) <= tolerance
}

fn centroid(vertices: &[Vec<f64>], exclude: usize) -> Vec<f64> {
    let n = vertices[0].len();
    let count = (vertices.len() - 1) as f64;
    let mut c = vec![0.0; n];
    for (i, v) in vertices.iter().enumerate() {
        if i == exclude {
            continue;
        }
        for (ci, vi) in c.iter_mut().zip(v) {
            *ci += vi;
        }
    }
    c.iter_mut().for_each(|ci| *ci /= count);
    c
}

/// `from + t * (to - from)`
fn along(from: &[f64], to: &[f64], t: f64) -> Vec<f64> {
    from.iter().zip(to).map(|(a, b)| a + t * (b - a)).collect()
}
