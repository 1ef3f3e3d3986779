//! Absorption as the mean of per-measure path-loss exponents.

use std::collections::HashMap;

use super::Optimizer;
use crate::calibration::results::OptimizationResults;
use crate::calibration::snapshot::SnapshotWindow;
use crate::config::LimitsSection;
use crate::model::NodeCalibration;

/// Averages `-(rssi - ref) / (10·log10 d)` per receiver.
#[derive(Clone, Copy, Debug, Default)]
pub struct AbsorptionAvgOptimizer;

impl Optimizer for AbsorptionAvgOptimizer {
    fn name(&self) -> &'static str {
        "absorption_avg"
    }

    fn optimize(
        &self,
        window: &SnapshotWindow,
        _current: &HashMap<String, NodeCalibration>,
        limits: &LimitsSection,
    ) -> OptimizationResults {
        let mut results = OptimizationResults::default();

        for rx in window.receivers() {
            // Within a meter the exponent is undefined or flips sign
            let exponents: Vec<f64> = window
                .measures_for(&rx)
                .iter()
                .filter(|m| m.mapped_distance > 1.0)
                .map(|m| -(m.rssi - m.ref_rssi) / (10.0 * m.mapped_distance.log10()))
                .filter(|v| v.is_finite())
                .collect();
            if exponents.is_empty() {
                continue;
            }

            let mean = exponents.iter().sum::<f64>() / exponents.len() as f64;
            if mean < limits.absorption_min || mean > limits.absorption_max {
                log::debug!("{}: {} outside limits ({:.2})", rx, self.name(), mean);
                continue;
            }
            results.node_mut(&rx).absorption = Some(mean);
        }
        results
    }
}
