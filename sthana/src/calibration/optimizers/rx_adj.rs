//! Receiver RSSI adjustment.

use std::collections::HashMap;

use super::{Optimizer, distance_error, modeled_distance};
use crate::calibration::results::OptimizationResults;
use crate::calibration::snapshot::SnapshotWindow;
use crate::config::LimitsSection;
use crate::core::{NelderMeadSimplex, SimplexError};
use crate::model::{DEFAULT_TX_REF_RSSI, NodeCalibration};

const MIN_MEASURES: usize = 3;
const TOLERANCE: f64 = 1e-7;
const MAX_EVALUATIONS: usize = 1000;
const STEP: f64 = 1.0;

/// Fits `rx_adj_rssi` per receiver with absorption held at the middle of
/// its limits.
#[derive(Clone, Copy, Debug, Default)]
pub struct RxAdjOptimizer;

impl Optimizer for RxAdjOptimizer {
    fn name(&self) -> &'static str {
        "rx_adj"
    }

    fn optimize(
        &self,
        window: &SnapshotWindow,
        current: &HashMap<String, NodeCalibration>,
        limits: &LimitsSection,
    ) -> OptimizationResults {
        let mut results = OptimizationResults::default();
        let absorption = limits.absorption_mid();
        let range = limits.rx_adj_rssi_min..=limits.rx_adj_rssi_max;

        for rx in window.receivers() {
            let measures = window.measures_for(&rx);
            if measures.len() < MIN_MEASURES {
                continue;
            }

            let objective = |x: &[f64]| {
                if !range.contains(&x[0]) {
                    return f64::INFINITY;
                }
                distance_error(&measures, |m| {
                    modeled_distance(DEFAULT_TX_REF_RSSI, x[0], m.rssi, absorption)
                })
            };

            let start = current
                .get(&rx)
                .and_then(|c| c.rx_adj_rssi)
                .unwrap_or(0.0)
                .clamp(limits.rx_adj_rssi_min, limits.rx_adj_rssi_max);
            let step = if start + STEP > limits.rx_adj_rssi_max { -STEP } else { STEP };

            let solver = NelderMeadSimplex::new(TOLERANCE, MAX_EVALUATIONS);
            let best = match solver.minimize(objective, &[start], &[step]) {
                Ok(min) | Err(SimplexError::ExceededEvaluations(min)) => min,
                Err(e) => {
                    log::warn!("{}: {} failed: {}", rx, self.name(), e);
                    continue;
                }
            };

            let value = best.point[0].clamp(limits.rx_adj_rssi_min, limits.rx_adj_rssi_max);
            log::debug!("{}: {} proposes rx_adj_rssi {:.2}", rx, self.name(), value);
            results.node_mut(&rx).rx_adj_rssi = Some(value);
        }
        results
    }
}
