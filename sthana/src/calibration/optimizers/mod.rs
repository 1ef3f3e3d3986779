//! Calibration optimizers.
//!
//! Each optimizer reads the snapshot window and proposes per-node values.
//! Optimizers never touch live state; the runner applies a proposal only
//! when it lowers the window error.
//!
//! | Optimizer | Proposes | Method |
//! |-----------|----------|--------|
//! | [`RxAdjOptimizer`] | `rx_adj_rssi` | 1-D simplex on distance error |
//! | [`AbsorptionAvgOptimizer`] | `absorption` | mean of per-measure exponents |
//! | [`AbsorptionErrOptimizer`] | `absorption` | 1-D simplex on distance error |
//! | [`AbsorptionLineFitOptimizer`] | `absorption` | least-squares path-loss slope |
//! | [`JointRxAdjAbsorptionOptimizer`] | both | 2-D simplex, quartic distance error |

mod absorption_avg;
mod absorption_err;
mod absorption_line_fit;
mod joint_rx_adj_absorption;
mod rx_adj;

use std::collections::HashMap;

pub use absorption_avg::AbsorptionAvgOptimizer;
pub use absorption_err::AbsorptionErrOptimizer;
pub use absorption_line_fit::AbsorptionLineFitOptimizer;
pub use joint_rx_adj_absorption::JointRxAdjAbsorptionOptimizer;
pub use rx_adj::RxAdjOptimizer;

use super::results::OptimizationResults;
use super::snapshot::{Measure, SnapshotWindow};
use crate::config::LimitsSection;
use crate::model::NodeCalibration;

/// Calibration optimizer capability.
pub trait Optimizer: Send + Sync {
    /// Get the optimizer name for logging
    fn name(&self) -> &'static str;

    /// Propose calibration values from the window.
    fn optimize(
        &self,
        window: &SnapshotWindow,
        current: &HashMap<String, NodeCalibration>,
        limits: &LimitsSection,
    ) -> OptimizationResults;
}

/// The standard optimizer set, in evaluation order.
pub fn default_optimizers() -> Vec<Box<dyn Optimizer>> {
    vec![
        Box::new(RxAdjOptimizer),
        Box::new(AbsorptionAvgOptimizer),
        Box::new(AbsorptionErrOptimizer),
        Box::new(AbsorptionLineFitOptimizer),
        Box::new(JointRxAdjAbsorptionOptimizer),
    ]
}

/// Distance implied by a log-distance path-loss model.
///
/// `10^((ref + rx_adj - rssi) / (10·n))`
pub(crate) fn modeled_distance(ref_rssi: f64, rx_adj: f64, rssi: f64, absorption: f64) -> f64 {
    10f64.powf((ref_rssi + rx_adj - rssi) / (10.0 * absorption))
}

/// Mean squared difference between modeled and mapped distance.
pub(crate) fn distance_error(measures: &[&Measure], model: impl Fn(&Measure) -> f64) -> f64 {
    let sum: f64 = measures
        .iter()
        .map(|m| (model(m) - m.mapped_distance).powi(2))
        .sum();
    sum / measures.len() as f64
}
