//! Calibration round and its background thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::optimizers::{Optimizer, default_optimizers};
use super::results::{current_calibrations, evaluate};
use super::snapshot::{CalibrationSnapshot, SnapshotWindow};
use crate::error::Result;
use crate::state::TrackingState;

/// Poll interval while optimization is disabled.
const DISABLED_POLL: Duration = Duration::from_secs(5);

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Diagnostics for the last calibration round.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OptimizerState {
    /// Optimizers in evaluation order
    pub optimizers: Vec<String>,
    /// RMS error of the applied calibration (dB)
    pub best_rmse: Option<f64>,
    /// Pearson r of the applied calibration
    pub best_r: Option<f64>,
    /// Names of proposals applied in the last round
    pub applied: Vec<String>,
    /// Time of the last round
    pub last_run: Option<DateTime<Utc>>,
}

/// Snapshot window plus the optimizer set.
pub struct Calibrator {
    window: Mutex<SnapshotWindow>,
    optimizers: Vec<Box<dyn Optimizer>>,
    state: RwLock<OptimizerState>,
}

impl Calibrator {
    /// Calibrator with the standard optimizers.
    pub fn new(state: &TrackingState) -> Self {
        Self::with_optimizers(state, default_optimizers())
    }

    /// Calibrator with a custom optimizer set.
    pub fn with_optimizers(state: &TrackingState, optimizers: Vec<Box<dyn Optimizer>>) -> Self {
        let window = SnapshotWindow::from_config(&state.config().optimization);
        let names = optimizers.iter().map(|o| o.name().to_string()).collect();
        Self {
            window: Mutex::new(window),
            optimizers,
            state: RwLock::new(OptimizerState {
                optimizers: names,
                ..Default::default()
            }),
        }
    }

    /// Diagnostics copy.
    pub fn state(&self) -> OptimizerState {
        self.state.read().clone()
    }

    /// Snapshots currently held.
    pub fn window_len(&self) -> usize {
        self.window.lock().len()
    }

    /// Capture a snapshot of the current links into the window.
    pub fn capture(&self, state: &TrackingState, now: DateTime<Utc>) {
        let snapshot = CalibrationSnapshot::capture(state, now);
        let mut window = self.window.lock();
        window.configure(&state.config().optimization);
        if snapshot.is_empty() {
            log::debug!("Calibration snapshot empty, skipped");
            return;
        }
        window.push(snapshot);
    }

    /// One calibration round: capture, evaluate the baseline, then try
    /// each optimizer and apply proposals that lower the error.
    ///
    /// Returns the names of applied optimizers.
    pub fn run_once(&self, state: &TrackingState, now: DateTime<Utc>) -> Vec<String> {
        self.capture(state, now);

        let limits = state.config().optimization.limits.clone();
        let window = self.window.lock();
        let mut current = current_calibrations(state);

        let Some(baseline) = evaluate(&window, &current) else {
            log::debug!("Calibration window empty");
            self.state.write().last_run = Some(now);
            return Vec::new();
        };
        log::debug!(
            "Calibration baseline rmse {:.3} r {:.3} over {} measures",
            baseline.rmse,
            baseline.correlation,
            baseline.count
        );

        let mut best = baseline;
        let mut applied = Vec::new();
        for optimizer in &self.optimizers {
            let proposal = optimizer.optimize(&window, &current, &limits);
            if proposal.is_empty() {
                continue;
            }

            let candidate = proposal.overlay(&current);
            let Some(evaluation) = evaluate(&window, &candidate) else {
                continue;
            };
            if evaluation.rmse.is_finite() && evaluation.rmse < best.rmse {
                log::info!(
                    "{}: rmse {:.3} -> {:.3}, applying to {} nodes",
                    optimizer.name(),
                    best.rmse,
                    evaluation.rmse,
                    proposal.nodes.len()
                );
                for (id, proposed) in &proposal.nodes {
                    if let Some(node) = state.node(id) {
                        node.update_calibration(|c| {
                            if proposed.tx_ref_rssi.is_some() {
                                c.tx_ref_rssi = proposed.tx_ref_rssi;
                            }
                            if proposed.rx_adj_rssi.is_some() {
                                c.rx_adj_rssi = proposed.rx_adj_rssi;
                            }
                            if proposed.absorption.is_some() {
                                c.absorption = proposed.absorption;
                            }
                        });
                    }
                }
                current = candidate;
                best = evaluation;
                applied.push(optimizer.name().to_string());
            } else {
                log::info!(
                    "{}: rejected, rmse {:.3} not below {:.3}",
                    optimizer.name(),
                    evaluation.rmse,
                    best.rmse
                );
            }
        }

        let mut diag = self.state.write();
        diag.best_rmse = Some(best.rmse);
        diag.best_r = Some(best.correlation);
        diag.applied = applied.clone();
        diag.last_run = Some(now);
        applied
    }
}

/// Background calibration loop.
///
/// Polls the enabled gate every 5 s. Once enabled, captures a snapshot and
/// runs a round every `interval_secs`.
pub struct CalibrationRunner {
    calibrator: Arc<Calibrator>,
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl CalibrationRunner {
    /// Spawn the calibration thread.
    pub fn spawn(state: Arc<TrackingState>) -> Result<Self> {
        let calibrator = Arc::new(Calibrator::new(&state));
        let shutdown = Arc::new(AtomicBool::new(false));

        let calibrator_clone = Arc::clone(&calibrator);
        let shutdown_clone = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("calibration".to_string())
            .spawn(move || Self::run(&state, &calibrator_clone, &shutdown_clone))?;

        log::info!("Calibration runner started");
        Ok(Self {
            calibrator,
            handle: Some(handle),
            shutdown,
        })
    }

    fn run(state: &TrackingState, calibrator: &Calibrator, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            let optimization = state.config().optimization.clone();
            if !optimization.enabled {
                sleep_unless(shutdown, DISABLED_POLL);
                continue;
            }

            let interval = Duration::from_secs(optimization.interval_secs.max(1));
            if !sleep_unless(shutdown, interval) {
                break;
            }
            let applied = calibrator.run_once(state, Utc::now());
            if !applied.is_empty() {
                log::debug!("Calibration applied: {}", applied.join(", "));
            }
        }
        log::debug!("Calibration thread exiting");
    }

    /// Shared calibrator, for diagnostics.
    pub fn calibrator(&self) -> &Arc<Calibrator> {
        &self.calibrator
    }

    /// True while the thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the loop to stop; returns immediately.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for CalibrationRunner {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Calibration thread panicked");
        }
    }
}

/// Sleep for `duration` in slices. Returns false if shutdown was requested.
fn sleep_unless(shutdown: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
