//! Calibration optimizer settings.

use serde::{Deserialize, Serialize};

use super::defaults;

/// Bounds on proposed calibration values.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LimitsSection {
    /// Lowest accepted absorption
    #[serde(default = "defaults::absorption_min")]
    pub absorption_min: f64,

    /// Highest accepted absorption
    #[serde(default = "defaults::absorption_max")]
    pub absorption_max: f64,

    /// Lowest accepted reference RSSI (dBm)
    #[serde(default = "defaults::tx_ref_rssi_min")]
    pub tx_ref_rssi_min: f64,

    /// Highest accepted reference RSSI (dBm)
    #[serde(default = "defaults::tx_ref_rssi_max")]
    pub tx_ref_rssi_max: f64,

    /// Lowest accepted receiver adjustment (dB)
    #[serde(default = "defaults::rx_adj_rssi_min")]
    pub rx_adj_rssi_min: f64,

    /// Highest accepted receiver adjustment (dB)
    #[serde(default = "defaults::rx_adj_rssi_max")]
    pub rx_adj_rssi_max: f64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            absorption_min: defaults::absorption_min(),
            absorption_max: defaults::absorption_max(),
            tx_ref_rssi_min: defaults::tx_ref_rssi_min(),
            tx_ref_rssi_max: defaults::tx_ref_rssi_max(),
            rx_adj_rssi_min: defaults::rx_adj_rssi_min(),
            rx_adj_rssi_max: defaults::rx_adj_rssi_max(),
        }
    }
}

impl LimitsSection {
    /// Midpoint of the absorption range.
    pub fn absorption_mid(&self) -> f64 {
        (self.absorption_max - self.absorption_min) / 2.0 + self.absorption_min
    }
}

/// Optimizer cadence and limits.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OptimizationSection {
    /// Run calibration at all
    #[serde(default)]
    pub enabled: bool,

    /// Seconds between optimization rounds
    #[serde(default = "defaults::interval_secs")]
    pub interval_secs: u64,

    /// Snapshots kept in the rolling window
    #[serde(default = "defaults::max_snapshots")]
    pub max_snapshots: usize,

    /// Snapshots older than this are dropped (minutes)
    #[serde(default = "defaults::keep_snapshot_mins")]
    pub keep_snapshot_mins: f64,

    /// Proposal limits
    #[serde(default)]
    pub limits: LimitsSection,
}

impl Default for OptimizationSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: defaults::interval_secs(),
            max_snapshots: defaults::max_snapshots(),
            keep_snapshot_mins: defaults::keep_snapshot_mins(),
            limits: LimitsSection::default(),
        }
    }
}
