//! Incoming measurements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Transmitter prefix marking a node-to-node measurement.
pub const NODE_PREFIX: &str = "node:";

/// One range reading reported by a receiver node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Transmitter (device) id, or `node:<id>` for another node
    pub transmitter: String,
    /// Receiving node id
    pub receiver: String,
    /// Estimated distance (m)
    pub distance: f64,
    /// Raw RSSI (dBm)
    pub rssi: f64,
    /// Transmitter's reference RSSI at 1m (dBm)
    #[serde(default)]
    pub ref_rssi: Option<f64>,
    /// When the reading was taken; arrival time when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Transmitter name, if advertised
    #[serde(default)]
    pub name: Option<String>,
    /// Distance variance reported by the receiver's filter (m²)
    #[serde(default)]
    pub variance: Option<f64>,
}

impl Measurement {
    /// Reject readings that would corrupt link state.
    pub fn validate(&self) -> Result<()> {
        if self.transmitter.trim().is_empty() {
            return Err(Error::MalformedMeasurement("empty transmitter".into()));
        }
        if self.receiver.trim().is_empty() {
            return Err(Error::MalformedMeasurement("empty receiver".into()));
        }
        if !self.distance.is_finite() || self.distance < 0.0 {
            return Err(Error::MalformedMeasurement(format!(
                "{} -> {}: distance {}",
                self.transmitter, self.receiver, self.distance
            )));
        }
        if !self.rssi.is_finite() {
            return Err(Error::MalformedMeasurement(format!(
                "{} -> {}: rssi {}",
                self.transmitter, self.receiver, self.rssi
            )));
        }
        if let Some(r) = self.ref_rssi
            && !r.is_finite()
        {
            return Err(Error::MalformedMeasurement(format!(
                "{} -> {}: ref_rssi {}",
                self.transmitter, self.receiver, r
            )));
        }
        if let Some(v) = self.variance
            && (!v.is_finite() || v < 0.0)
        {
            return Err(Error::MalformedMeasurement(format!(
                "{} -> {}: variance {}",
                self.transmitter, self.receiver, v
            )));
        }
        Ok(())
    }

    /// Transmitting node id for node-to-node readings.
    pub fn transmitting_node(&self) -> Option<&str> {
        self.transmitter
            .strip_prefix(NODE_PREFIX)
            .filter(|id| !id.is_empty())
    }

    /// Reading time, defaulting to `now`.
    pub fn time_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.timestamp.unwrap_or(now)
    }

    /// Parse a JSON measurement.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::MalformedMeasurement(e.to_string()))
    }
}
