//! Absorption from a least-squares path-loss line.

use std::collections::HashMap;

use super::Optimizer;
use crate::calibration::results::OptimizationResults;
use crate::calibration::snapshot::SnapshotWindow;
use crate::config::LimitsSection;
use crate::core::fit_line;
use crate::model::NodeCalibration;

/// Fits `ref - rssi = a + 10·n·log10 d` per receiver and proposes `n`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbsorptionLineFitOptimizer;

impl Optimizer for AbsorptionLineFitOptimizer {
    fn name(&self) -> &'static str {
        "absorption_line_fit"
    }

    fn optimize(
        &self,
        window: &SnapshotWindow,
        _current: &HashMap<String, NodeCalibration>,
        limits: &LimitsSection,
    ) -> OptimizationResults {
        let mut results = OptimizationResults::default();

        for rx in window.receivers() {
            let measures = window.measures_for(&rx);
            let x: Vec<f64> = measures.iter().map(|m| m.mapped_distance.log10()).collect();
            let y: Vec<f64> = measures.iter().map(|m| m.ref_rssi - m.rssi).collect();

            let Some((_, slope)) = fit_line(&x, &y) else {
                continue;
            };
            let absorption = slope / 10.0;
            if absorption.is_finite() && (limits.absorption_min..=limits.absorption_max).contains(&absorption) {
                results.node_mut(&rx).absorption = Some(absorption);
            } else {
                log::debug!("{}: {} outside limits ({:.2})", rx, self.name(), absorption);
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
    fn test_slope_ignores_offset() {
        let window = window(vec![
            measure("a", "r", 1.5, 2.2, 6.0),
            measure("b", "r", 4.0, 2.2, 6.0),
            measure("c", "r", 9.0, 2.2, 6.0),
            measure("a", "flat", 3.0, 2.2, 0.0),
        ]);
        let results = AbsorptionLineFitOptimizer.optimize(&window, &HashMap::new(), &LimitsSection::default());
        assert_abs_diff_eq!(results.nodes["r"].absorption.unwrap(), 2.2, epsilon = 1e-9);
        // A single distance has no slope
        assert!(!results.nodes.contains_key("flat"));
    }
}
