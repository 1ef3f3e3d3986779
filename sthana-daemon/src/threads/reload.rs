//! Reload thread: apply config file changes to the running engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use sthana::TrackingState;

use crate::config::DaemonConfig;

const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Polls the config file's modification time and hot-applies changes.
pub struct ReloadThread {
    path: PathBuf,
    interval: Duration,
    state: Arc<TrackingState>,
    running: Arc<AtomicBool>,
    last_modified: Option<SystemTime>,
}

impl ReloadThread {
    pub fn new(path: PathBuf, interval: Duration, state: Arc<TrackingState>, running: Arc<AtomicBool>) -> Self {
        let last_modified = modified(&path);
        Self {
            path,
            interval,
            state,
            running,
            last_modified,
        }
    }

    pub fn run(&mut self) {
        log::info!(
            "Watching {} every {}s",
            self.path.display(),
            self.interval.as_secs()
        );
        while self.sleep() {
            self.check();
        }
    }

    /// Reload if the file changed. Returns true if a new config was applied.
    pub fn check(&mut self) -> bool {
        let current = modified(&self.path);
        if current.is_none() || current == self.last_modified {
            return false;
        }
        self.last_modified = current;

        match DaemonConfig::load(&self.path) {
            Ok(config) => {
                self.state.apply_config(config.engine);
                log::info!("Reloaded {}", self.path.display());
                true
            }
            // Keep running on the previous config
            Err(e) => {
                log::error!("Reload of {} failed: {}", self.path.display(), e);
                false
            }
        }
    }

    fn sleep(&self) -> bool {
        let mut slept = Duration::ZERO;
        while slept < self.interval {
            if !self.running.load(Ordering::Relaxed) {
                return false;
            }
            std::thread::sleep(SLEEP_SLICE);
            slept += SLEEP_SLICE;
        }
        self.running.load(Ordering::Relaxed)
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
