//! Online node calibration.
//!
//! Reference nodes hear each other (and anchored devices) at known
//! distances. Those links are captured into a rolling [`SnapshotWindow`],
//! optimizers propose per-node `rx_adj_rssi` and `absorption`, and the
//! [`Calibrator`] keeps a proposal only if it lowers the RSSI error over the
//! whole window.
//!
//! ```text
//! links ──capture──► SnapshotWindow ──optimize──► OptimizationResults
//!                                                      │ evaluate
//!                                   Node::update_calibration ◄─ better?
//! ```

pub mod optimizers;
mod results;
mod runner;
mod snapshot;

pub use optimizers::{Optimizer, default_optimizers};
pub use results::{
    CalibrationMatrix, Evaluation, MatrixCell, OptimizationResults, current_calibrations, evaluate,
    predicted_rssi,
};
pub use runner::{CalibrationRunner, Calibrator, OptimizerState};
pub use snapshot::{CalibrationSnapshot, Measure, SnapshotWindow};
