//! Immutable captures of calibration links and the rolling window they
//! accumulate in.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::OptimizationSection;
use crate::core::Point3D;
use crate::model::DEFAULT_TX_REF_RSSI;
use crate::state::TrackingState;

/// Pairs closer than this (m) carry no usable path loss.
const MIN_MAPPED_DISTANCE: f64 = 0.1;

/// One transmitter → receiver observation with known geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Transmitting node or anchored device
    pub tx_id: String,
    /// Receiving node
    pub rx_id: String,
    /// Transmitter location
    pub tx_location: Point3D,
    /// Receiver location
    pub rx_location: Point3D,
    /// Distance reported by the receiver (m)
    pub distance: f64,
    /// Geometric distance between the two locations (m)
    pub mapped_distance: f64,
    /// Received signal strength (dBm)
    pub rssi: f64,
    /// Transmitter reference RSSI at 1 m (dBm)
    pub ref_rssi: f64,
}

/// All live calibration links at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Measures sorted by receiver then transmitter
    pub measures: Vec<Measure>,
}

impl CalibrationSnapshot {
    /// Capture live node-to-node and anchored-device-to-node links.
    pub fn capture(state: &TrackingState, now: DateTime<Utc>) -> Self {
        let mut measures = Vec::new();

        for entry in state.nodes().iter() {
            let rx = entry.value();
            let Some(rx_location) = rx.location.filter(|_| rx.is_reference()) else {
                continue;
            };

            for link in rx.current_rx_links(now) {
                let Some(tx) = state.node(&link.tx_id) else {
                    continue;
                };
                let Some(tx_location) = tx.location.filter(|_| tx.is_reference()) else {
                    continue;
                };
                measures.push(Measure {
                    tx_id: link.tx_id.clone(),
                    rx_id: rx.id.clone(),
                    tx_location,
                    rx_location,
                    distance: link.distance,
                    mapped_distance: tx_location.distance_to(&rx_location),
                    rssi: link.rssi,
                    ref_rssi: link.ref_rssi,
                });
            }
        }

        for entry in state.devices().iter() {
            let device = entry.value();
            let Some(anchor) = device.anchor() else {
                continue;
            };
            for entry in state.nodes().iter() {
                let rx = entry.value();
                let Some(rx_location) = rx.location.filter(|_| rx.is_reference()) else {
                    continue;
                };
                let Some(link) = device.link(&rx.id).filter(|l| l.is_current(now, rx.timeout)) else {
                    continue;
                };
                measures.push(Measure {
                    tx_id: device.id.clone(),
                    rx_id: rx.id.clone(),
                    tx_location: anchor,
                    rx_location,
                    distance: link.distance,
                    mapped_distance: anchor.distance_to(&rx_location),
                    rssi: link.rssi,
                    ref_rssi: link.ref_rssi.unwrap_or(DEFAULT_TX_REF_RSSI),
                });
            }
        }

        measures.retain(|m| m.mapped_distance > MIN_MAPPED_DISTANCE);
        measures.sort_by(|a, b| a.rx_id.cmp(&b.rx_id).then_with(|| a.tx_id.cmp(&b.tx_id)));

        Self {
            timestamp: now,
            measures,
        }
    }

    /// True if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }
}

/// Rolling window of snapshots bounded by age and count.
#[derive(Clone, Debug)]
pub struct SnapshotWindow {
    snapshots: VecDeque<CalibrationSnapshot>,
    max_snapshots: usize,
    keep: Duration,
}

impl SnapshotWindow {
    /// Create an empty window.
    pub fn new(max_snapshots: usize, keep_minutes: f64) -> Self {
        Self {
            snapshots: VecDeque::new(),
            max_snapshots: max_snapshots.max(1),
            keep: Duration::milliseconds((keep_minutes * 60_000.0) as i64),
        }
    }

    /// Create a window sized from configuration.
    pub fn from_config(config: &OptimizationSection) -> Self {
        Self::new(config.max_snapshots, config.keep_snapshot_mins)
    }

    /// Resize after a configuration change.
    pub fn configure(&mut self, config: &OptimizationSection) {
        self.max_snapshots = config.max_snapshots.max(1);
        self.keep = Duration::milliseconds((config.keep_snapshot_mins * 60_000.0) as i64);
        self.prune();
    }

    /// Add a snapshot, dropping those that fell out of the window.
    pub fn push(&mut self, snapshot: CalibrationSnapshot) {
        self.snapshots.push_back(snapshot);
        self.prune();
    }

    fn prune(&mut self) {
        if let Some(newest) = self.snapshots.back().map(|s| s.timestamp) {
            while self
                .snapshots
                .front()
                .is_some_and(|s| newest - s.timestamp > self.keep)
            {
                self.snapshots.pop_front();
            }
        }
        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
        }
    }

    /// Snapshots held, oldest first.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// True if the window holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Every measure of every snapshot, oldest first.
    pub fn measures(&self) -> impl Iterator<Item = &Measure> {
        self.snapshots.iter().flat_map(|s| s.measures.iter())
    }

    /// Receivers appearing in the window, sorted.
    pub fn receivers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.measures().map(|m| m.rx_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Measures heard by one receiver.
    pub fn measures_for(&self, rx_id: &str) -> Vec<&Measure> {
        self.measures().filter(|m| m.rx_id == rx_id).collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Measure with RSSI following `ref - 10·n·log10(d)` plus `offset`.
    pub fn measure(tx: &str, rx: &str, mapped: f64, absorption: f64, offset: f64) -> Measure {
        let ref_rssi = DEFAULT_TX_REF_RSSI;
        Measure {
            tx_id: tx.into(),
            rx_id: rx.into(),
            tx_location: Point3D::ORIGIN,
            rx_location: Point3D::new(mapped, 0.0, 0.0),
            distance: mapped,
            mapped_distance: mapped,
            rssi: ref_rssi - 10.0 * absorption * mapped.log10() + offset,
            ref_rssi,
        }
    }

    pub fn window(measures: Vec<Measure>) -> SnapshotWindow {
        let mut window = SnapshotWindow::new(10, 5.0);
        window.push(CalibrationSnapshot {
            timestamp: Utc::now(),
            measures,
        });
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::Measurement;

    fn snapshot_at(at: DateTime<Utc>) -> CalibrationSnapshot {
        CalibrationSnapshot {
            timestamp: at,
            measures: vec![],
        }
    }

    #[test]
    fn test_window_drops_old_snapshots() {
        let now = Utc::now();
        let mut window = SnapshotWindow::new(60, 5.0);
        window.push(snapshot_at(now - Duration::minutes(10)));
        window.push(snapshot_at(now - Duration::minutes(4)));
        window.push(snapshot_at(now));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_window_caps_count() {
        let now = Utc::now();
        let mut window = SnapshotWindow::new(3, 5.0);
        for i in 0..5 {
            window.push(snapshot_at(now + Duration::seconds(i)));
        }
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_capture_node_and_anchor_links() {
        let yaml = r#"
nodes:
  - { id: a, point: [0, 0, 0] }
  - { id: b, point: [4, 0, 0] }
  - { id: c, point: [0, 3, 0] }
  - { id: loose }
devices:
  - { id: "beacon", point: [0, 0, 3] }
"#;
        let state = TrackingState::new(EngineConfig::from_yaml(yaml).unwrap());
        let now = Utc::now();
        let m = |tx: &str, rx: &str, distance: f64| Measurement {
            transmitter: tx.into(),
            receiver: rx.into(),
            distance,
            rssi: -70.0,
            ref_rssi: Some(-60.0),
            timestamp: Some(now),
            name: None,
            variance: None,
        };
        state.ingest_at(&m("node:a", "b", 4.2), now).unwrap();
        state.ingest_at(&m("node:loose", "b", 1.0), now).unwrap();
        state.ingest_at(&m("beacon", "c", 4.5), now).unwrap();

        let snapshot = CalibrationSnapshot::capture(&state, now);
        assert_eq!(snapshot.measures.len(), 2);

        let first = &snapshot.measures[0];
        assert_eq!((first.tx_id.as_str(), first.rx_id.as_str()), ("a", "b"));
        assert_eq!(first.mapped_distance, 4.0);
        assert_eq!(first.ref_rssi, -60.0);

        let second = &snapshot.measures[1];
        assert_eq!((second.tx_id.as_str(), second.rx_id.as_str()), ("beacon", "c"));
        assert!((second.mapped_distance - 18f64.sqrt()).abs() < 1e-12);
    }
}
