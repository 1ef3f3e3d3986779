//! Smoothing filter and pipeline cadence settings.

use serde::{Deserialize, Serialize};

use super::defaults;

/// Kalman smoothing parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct FilteringSection {
    /// Process noise (lower adapts slower)
    #[serde(default = "defaults::process_noise")]
    pub process_noise: f64,

    /// Measurement noise (higher trusts measurements less)
    #[serde(default = "defaults::measurement_noise")]
    pub measurement_noise: f64,

    /// Maximum plausible speed (m/s)
    #[serde(default = "defaults::max_velocity")]
    pub max_velocity: f64,
}

impl Default for FilteringSection {
    fn default() -> Self {
        Self {
            process_noise: defaults::process_noise(),
            measurement_noise: defaults::measurement_noise(),
            max_velocity: defaults::max_velocity(),
        }
    }
}

/// Positioning pipeline cadence.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PipelineSection {
    /// Idle wake-up interval when no device is dirty (ms)
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Re-run estimation for tracked devices not calculated within the timeout
    #[serde(default = "defaults::idle_recheck")]
    pub idle_recheck: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::poll_interval_ms(),
            idle_recheck: defaults::idle_recheck(),
        }
    }
}
