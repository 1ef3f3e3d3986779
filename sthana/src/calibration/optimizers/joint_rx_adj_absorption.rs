//! Receiver RSSI adjustment and absorption fitted together.

use std::collections::HashMap;

use super::{Optimizer, modeled_distance};
use crate::calibration::results::OptimizationResults;
use crate::calibration::snapshot::SnapshotWindow;
use crate::config::LimitsSection;
use crate::core::{NelderMeadSimplex, SimplexError};
use crate::model::{DEFAULT_TX_REF_RSSI, NodeCalibration};

const MIN_MEASURES: usize = 3;
const TOLERANCE: f64 = 1e-9;
const MAX_EVALUATIONS: usize = 10_000;
const RX_ADJ_STEP: f64 = 2.0;
const REGULARIZATION: f64 = 0.25;

/// Two-variable simplex over `rx_adj_rssi` and absorption per receiver.
///
/// The loss is the mean fourth power of the distance error plus a small
/// penalty pulling the adjustment toward zero and absorption toward the
/// middle of its limits.
#[derive(Clone, Copy, Debug, Default)]
pub struct JointRxAdjAbsorptionOptimizer;

impl Optimizer for JointRxAdjAbsorptionOptimizer {
    fn name(&self) -> &'static str {
        "joint_rx_adj_absorption"
    }

    fn optimize(
        &self,
        window: &SnapshotWindow,
        current: &HashMap<String, NodeCalibration>,
        limits: &LimitsSection,
    ) -> OptimizationResults {
        let mut results = OptimizationResults::default();
        let mid = limits.absorption_mid();
        let rx_range = limits.rx_adj_rssi_min..=limits.rx_adj_rssi_max;
        let abs_range = limits.absorption_min..=limits.absorption_max;

        for rx in window.receivers() {
            let measures = window.measures_for(&rx);
            if measures.len() < MIN_MEASURES {
                continue;
            }

            let objective = |x: &[f64]| {
                if !rx_range.contains(&x[0]) || !abs_range.contains(&x[1]) {
                    return f64::INFINITY;
                }
                let error: f64 = measures
                    .iter()
                    .map(|m| {
                        let modeled = modeled_distance(DEFAULT_TX_REF_RSSI, x[0], m.rssi, x[1]);
                        (m.mapped_distance - modeled).powi(4)
                    })
                    .sum::<f64>()
                    / measures.len() as f64;
                error + REGULARIZATION * (x[0].abs() + (x[1] - mid).powi(2))
            };

            let calibration = current.get(&rx);
            let rx_adj = calibration
                .and_then(|c| c.rx_adj_rssi)
                .unwrap_or(0.0)
                .clamp(limits.rx_adj_rssi_min, limits.rx_adj_rssi_max);
            let absorption = calibration
                .and_then(|c| c.absorption)
                .unwrap_or(mid)
                .clamp(limits.absorption_min, limits.absorption_max);
            let rx_step = if rx_adj + RX_ADJ_STEP > limits.rx_adj_rssi_max {
                -RX_ADJ_STEP
            } else {
                RX_ADJ_STEP
            };
            let abs_step = if absorption > mid { -0.25 } else { 0.25 };

            let solver = NelderMeadSimplex::new(TOLERANCE, MAX_EVALUATIONS);
            let best = match solver.minimize(objective, &[rx_adj, absorption], &[rx_step, abs_step]) {
                Ok(min) | Err(SimplexError::ExceededEvaluations(min)) => min,
                Err(e) => {
                    log::warn!("{}: {} failed: {}", rx, self.name(), e);
                    continue;
                }
            };
            if !best.value.is_finite() {
                continue;
            }

            let rx_adj = best.point[0].clamp(limits.rx_adj_rssi_min, limits.rx_adj_rssi_max);
            let absorption = best.point[1].clamp(limits.absorption_min, limits.absorption_max);
            log::debug!(
                "{}: {} proposes rx_adj_rssi {:.2}, absorption {:.2}",
                rx,
                self.name(),
                rx_adj,
                absorption
            );
            let node = results.node_mut(&rx);
            node.rx_adj_rssi = Some(rx_adj);
            node.absorption = Some(absorption);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::snapshot::test_support::*;
    use approx::assert_abs_diff_eq;

    fn current(rx: &str, rx_adj: f64) -> HashMap<String, NodeCalibration> {
        let mut current = HashMap::new();
        current.insert(
            rx.to_string(),
            NodeCalibration {
                rx_adj_rssi: Some(rx_adj),
                ..Default::default()
            },
        );
        current
    }

    #[test]
    fn test_recovers_uncalibrated_receiver() {
        let limits = LimitsSection::default();
        let mid = limits.absorption_mid();
        let window = window(vec![
            measure("a", "r", 2.0, mid, 0.0),
            measure("b", "r", 4.0, mid, 0.0),
            measure("c", "r", 7.0, mid, 0.0),
        ]);

        let results = JointRxAdjAbsorptionOptimizer.optimize(&window, &current("r", 5.0), &limits);
        let node = &results.nodes["r"];
        assert_abs_diff_eq!(node.rx_adj_rssi.unwrap(), 0.0, epsilon = 0.1);
        assert_abs_diff_eq!(node.absorption.unwrap(), mid, epsilon = 0.05);
    }

    #[test]
    fn test_offset_pulls_adjustment_up() {
        let limits = LimitsSection::default();
        let mid = limits.absorption_mid();
        let window = window(vec![
            measure("a", "r", 2.0, mid, 4.0),
            measure("b", "r", 4.0, mid, 4.0),
            measure("c", "r", 7.0, mid, 4.0),
            measure("a", "thin", 3.0, mid, 4.0),
        ]);

        let results = JointRxAdjAbsorptionOptimizer.optimize(&window, &HashMap::new(), &limits);
        let node = &results.nodes["r"];
        let rx_adj = node.rx_adj_rssi.unwrap();
        assert!(rx_adj > 1.0 && rx_adj <= 4.5, "rx_adj {rx_adj}");
        let absorption = node.absorption.unwrap();
        assert!((limits.absorption_min..=limits.absorption_max).contains(&absorption));
        assert!(!results.nodes.contains_key("thin"));
    }
}
