//! Optimizer proposals, their evaluation, and the calibration matrix.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::{CalibrationSnapshot, SnapshotWindow};
use crate::core::pearson_correlation;
use crate::model::NodeCalibration;
use crate::state::TrackingState;

/// Calibration values proposed per receiving node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResults {
    /// Proposed values by node id; unset fields are left alone
    pub nodes: BTreeMap<String, NodeCalibration>,
}

impl OptimizationResults {
    /// True if nothing was proposed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Proposal for one node, created on first use.
    pub fn node_mut(&mut self, id: &str) -> &mut NodeCalibration {
        self.nodes.entry(id.to_string()).or_default()
    }

    /// `current` with every proposed field replaced.
    pub fn overlay(&self, current: &HashMap<String, NodeCalibration>) -> HashMap<String, NodeCalibration> {
        let mut merged = current.clone();
        for (id, proposed) in &self.nodes {
            let entry = merged.entry(id.clone()).or_default();
            if proposed.tx_ref_rssi.is_some() {
                entry.tx_ref_rssi = proposed.tx_ref_rssi;
            }
            if proposed.rx_adj_rssi.is_some() {
                entry.rx_adj_rssi = proposed.rx_adj_rssi;
            }
            if proposed.absorption.is_some() {
                entry.absorption = proposed.absorption;
            }
        }
        merged
    }
}

/// Fit of a calibration against the snapshot window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// RMS of predicted minus measured RSSI (dB)
    pub rmse: f64,
    /// Pearson r of predicted vs measured RSSI
    pub correlation: f64,
    /// Measures evaluated
    pub count: usize,
}

/// Predicted RSSI for a receiver calibration at distance `d`.
///
/// `ref + rx_adj - 10·n·log10(d)`
pub fn predicted_rssi(ref_rssi: f64, calibration: &NodeCalibration, distance: f64) -> f64 {
    ref_rssi + calibration.rx_adj_rssi_or_default()
        - 10.0 * calibration.absorption_or_default() * distance.log10()
}

/// Evaluate calibrations over every measure in the window.
///
/// Returns `None` for an empty window.
pub fn evaluate(window: &SnapshotWindow, calibrations: &HashMap<String, NodeCalibration>) -> Option<Evaluation> {
    let default = NodeCalibration::default();
    let (predicted, measured): (Vec<f64>, Vec<f64>) = window
        .measures()
        .map(|m| {
            let calibration = calibrations.get(&m.rx_id).unwrap_or(&default);
            (predicted_rssi(m.ref_rssi, calibration, m.mapped_distance), m.rssi)
        })
        .unzip();

    if predicted.is_empty() {
        return None;
    }

    let sum: f64 = predicted
        .iter()
        .zip(&measured)
        .map(|(p, m)| (p - m).powi(2))
        .sum();
    Some(Evaluation {
        rmse: (sum / predicted.len() as f64).sqrt(),
        correlation: pearson_correlation(&predicted, &measured),
        count: predicted.len(),
    })
}

/// Current calibration of every node.
pub fn current_calibrations(state: &TrackingState) -> HashMap<String, NodeCalibration> {
    state
        .nodes()
        .iter()
        .map(|e| (e.key().clone(), e.value().calibration()))
        .collect()
}

/// One transmitter → receiver pair in the calibration matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixCell {
    /// Distance reported by the receiver (m)
    pub distance: f64,
    /// Received signal strength (dBm)
    pub rssi: f64,
    /// Geometric distance (m)
    pub mapped: f64,
    /// Transmitter reference RSSI (dBm)
    pub tx_ref_rssi: f64,
    /// Receiver RSSI adjustment (dB)
    pub rx_adj_rssi: f64,
    /// Receiver path-loss exponent
    pub absorption: f64,
    /// Reported minus mapped distance (m)
    pub error: f64,
}

/// Per-pair view of calibration links, computed on demand.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMatrix {
    /// Cells by transmitter id, then receiver id
    pub cells: BTreeMap<String, BTreeMap<String, MatrixCell>>,
    /// Pearson r of mapped vs reported distance
    pub correlation: Option<f64>,
    /// RMS of the distance error (m)
    pub rmse: Option<f64>,
    /// When the matrix was computed
    pub timestamp: Option<DateTime<Utc>>,
}

impl CalibrationMatrix {
    /// Build the matrix from the live links.
    pub fn compute(state: &TrackingState, now: DateTime<Utc>) -> Self {
        let snapshot = CalibrationSnapshot::capture(state, now);
        let calibrations = current_calibrations(state);
        let default = NodeCalibration::default();

        let mut matrix = Self {
            timestamp: Some(now),
            ..Self::default()
        };
        for m in &snapshot.measures {
            let calibration = calibrations.get(&m.rx_id).unwrap_or(&default);
            matrix.cells.entry(m.tx_id.clone()).or_default().insert(
                m.rx_id.clone(),
                MatrixCell {
                    distance: m.distance,
                    rssi: m.rssi,
                    mapped: m.mapped_distance,
                    tx_ref_rssi: m.ref_rssi,
                    rx_adj_rssi: calibration.rx_adj_rssi_or_default(),
                    absorption: calibration.absorption_or_default(),
                    error: m.distance - m.mapped_distance,
                },
            );
        }

        if !snapshot.is_empty() {
            let mapped: Vec<f64> = snapshot.measures.iter().map(|m| m.mapped_distance).collect();
            let reported: Vec<f64> = snapshot.measures.iter().map(|m| m.distance).collect();
            let sum: f64 = mapped.iter().zip(&reported).map(|(a, b)| (b - a).powi(2)).sum();
            matrix.correlation = Some(pearson_correlation(&mapped, &reported));
            matrix.rmse = Some((sum / mapped.len() as f64).sqrt());
        }
        matrix
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    /// True if no pair was captured.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
