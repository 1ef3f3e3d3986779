//! Pipeline thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::Sender;

use super::locate::run_tick;
use crate::error::{Error, Result};
use crate::model::PositionReport;
use crate::state::TrackingState;

/// Background positioning loop.
///
/// Waits for dirty devices (or the poll interval), runs a tick and sends
/// every report on the channel. Stops when asked or when the report
/// receiver goes away.
pub struct PipelineWorker {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl PipelineWorker {
    /// Spawn the pipeline thread.
    pub fn spawn(state: Arc<TrackingState>, reports: Sender<PositionReport>) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("pipeline".to_string())
            .spawn(move || {
                if let Err(e) = Self::run(&state, &reports, &shutdown_clone) {
                    log::warn!("Pipeline exiting: {}", e);
                }
            })?;

        log::info!("Pipeline started");
        Ok(Self {
            handle: Some(handle),
            shutdown,
        })
    }

    fn run(state: &TrackingState, reports: &Sender<PositionReport>, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            let pipeline = state.config().pipeline.clone();
            state.dirty().wait(Duration::from_millis(pipeline.poll_interval_ms));
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            let now = Utc::now();
            if pipeline.idle_recheck {
                state.recheck_idle(now);
            }

            for report in run_tick(state, now) {
                reports
                    .send(report)
                    .map_err(|_| Error::Channel("report receiver closed".to_string()))?;
            }
        }
        log::debug!("Pipeline thread exiting");
        Ok(())
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

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Pipeline thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::Measurement;
    use crossbeam_channel::unbounded;

    const CONFIG: &str = r#"
floors:
  - id: ground
    bounds: [[0, 0, 0], [10, 10, 3]]
nodes:
  - { id: a, point: [0, 0, 0] }
  - { id: b, point: [10, 0, 0] }
  - { id: c, point: [10, 10, 0] }
devices:
  - id: "*"
pipeline:
  poll_interval_ms: 10
"#;

    fn feed(state: &TrackingState) {
        for (rx_id, distance) in [("a", 4.0), ("b", 7.0), ("c", 8.0)] {
            state
                .ingest(&Measurement {
                    transmitter: "tag".into(),
                    receiver: rx_id.into(),
                    distance,
                    rssi: -70.0,
                    ref_rssi: None,
                    timestamp: None,
                    name: None,
                    variance: None,
                })
                .unwrap();
        }
    }

    #[test]
    fn test_worker_emits_reports() {
        let state = Arc::new(TrackingState::new(EngineConfig::from_yaml(CONFIG).unwrap()));
        let (tx, rx) = unbounded();
        let worker = PipelineWorker::spawn(Arc::clone(&state), tx).unwrap();
        feed(&state);

        let report = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report.device_id, "tag");
        assert!(worker.is_running());
        drop(worker);
    }

    #[test]
    fn test_worker_exits_when_receiver_dropped() {
        let state = Arc::new(TrackingState::new(EngineConfig::from_yaml(CONFIG).unwrap()));
        let (tx, rx) = unbounded();
        drop(rx);
        let worker = PipelineWorker::spawn(Arc::clone(&state), tx).unwrap();
        feed(&state);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while worker.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!worker.is_running());
    }
}
