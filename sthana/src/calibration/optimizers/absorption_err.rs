//! Absorption fitted on distance error.

use std::collections::HashMap;

use super::{Optimizer, distance_error, modeled_distance};
use crate::calibration::results::OptimizationResults;
use crate::calibration::snapshot::SnapshotWindow;
use crate::config::LimitsSection;
use crate::core::{NelderMeadSimplex, SimplexError};
use crate::model::NodeCalibration;

const MIN_MEASURES: usize = 3;
const TOLERANCE: f64 = 1e-4;
const MAX_EVALUATIONS: usize = 10_000;

/// Minimizes the squared error between modeled and mapped distance over
/// the absorption exponent, per receiver.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbsorptionErrOptimizer;

impl Optimizer for AbsorptionErrOptimizer {
    fn name(&self) -> &'static str {
        "absorption_err"
    }

    fn optimize(
        &self,
        window: &SnapshotWindow,
        _current: &HashMap<String, NodeCalibration>,
        limits: &LimitsSection,
    ) -> OptimizationResults {
        let mut results = OptimizationResults::default();
        let (min, max) = (limits.absorption_min, limits.absorption_max);

        for rx in window.receivers() {
            let measures = window.measures_for(&rx);
            if measures.len() < MIN_MEASURES {
                continue;
            }

            let objective = |x: &[f64]| {
                if x[0] <= min || x[0] >= max {
                    return f64::INFINITY;
                }
                distance_error(&measures, |m| modeled_distance(m.ref_rssi, 0.0, m.rssi, x[0]))
            };

            let start = limits.absorption_mid();
            let step = (max - min) / 8.0;
            let solver = NelderMeadSimplex::new(TOLERANCE, MAX_EVALUATIONS);
            let best = match solver.minimize(objective, &[start], &[step]) {
                Ok(min) | Err(SimplexError::ExceededEvaluations(min)) => min,
                Err(e) => {
                    log::warn!("{}: {} failed: {}", rx, self.name(), e);
                    continue;
                }
            };

            let value = best.point[0];
            if value.is_finite() && value > min && value < max {
                results.node_mut(&rx).absorption = Some(value);
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::snapshot::test_support::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_recovers_absorption() {
        let window = window(vec![
            measure("a", "r", 2.0, 3.3, 0.0),
            measure("b", "r", 5.0, 3.3, 0.0),
            measure("c", "r", 8.0, 3.3, 0.0),
        ]);
        let results = AbsorptionErrOptimizer.optimize(&window, &HashMap::new(), &LimitsSection::default());
        assert_abs_diff_eq!(results.nodes["r"].absorption.unwrap(), 3.3, epsilon = 0.01);
    }
}
