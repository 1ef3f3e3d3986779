//! Fixed reference receivers.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::NodeConfig;
use crate::core::Point3D;

/// Reference RSSI at 1m assumed when a transmitter does not report one.
pub const DEFAULT_TX_REF_RSSI: f64 = -59.0;

/// Path-loss exponent assumed when no absorption is configured.
pub const DEFAULT_ABSORPTION: f64 = 3.0;

/// Radio calibration of a node.
///
/// Values set by the calibration optimizers survive config reloads; values
/// from configuration are only the starting point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeCalibration {
    /// Expected RSSI at 1m from this node as a transmitter (dBm)
    pub tx_ref_rssi: Option<f64>,
    /// Offset added to RSSI received by this node (dB)
    pub rx_adj_rssi: Option<f64>,
    /// Path-loss exponent
    pub absorption: Option<f64>,
}

impl NodeCalibration {
    /// Reference RSSI, falling back to the default.
    pub fn tx_ref_rssi_or_default(&self) -> f64 {
        self.tx_ref_rssi.unwrap_or(DEFAULT_TX_REF_RSSI)
    }

    /// Receiver adjustment, falling back to zero.
    pub fn rx_adj_rssi_or_default(&self) -> f64 {
        self.rx_adj_rssi.unwrap_or(0.0)
    }

    /// Absorption, falling back to the default.
    pub fn absorption_or_default(&self) -> f64 {
        self.absorption.unwrap_or(DEFAULT_ABSORPTION)
    }

    /// Overlay explicitly configured values.
    fn overlay(mut self, config: &crate::config::NodeCalibrationConfig) -> Self {
        if config.tx_ref_rssi.is_some() {
            self.tx_ref_rssi = config.tx_ref_rssi;
        }
        if config.rx_adj_rssi.is_some() {
            self.rx_adj_rssi = config.rx_adj_rssi;
        }
        if config.absorption.is_some() {
            self.absorption = config.absorption;
        }
        self
    }
}

/// Latest node-to-node reading heard by a receiver node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeLink {
    /// Transmitting node id
    pub tx_id: String,
    /// Reported distance (m)
    pub distance: f64,
    /// Raw RSSI (dBm)
    pub rssi: f64,
    /// Transmitter's reference RSSI at 1m (dBm)
    pub ref_rssi: f64,
    /// When the reading was taken
    pub last_hit: DateTime<Utc>,
}

/// A fixed reference receiver.
#[derive(Debug)]
pub struct Node {
    /// Node identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Installed location, absent for unplaced nodes
    pub location: Option<Point3D>,
    /// Floors this node hears on, `None` for every floor
    pub floors: Option<Vec<String>>,
    /// Fixed installation
    pub stationary: bool,
    /// Link currency window (s)
    pub timeout: f64,
    calibration: RwLock<NodeCalibration>,
    rx_links: DashMap<String, NodeLink>,
}

impl Node {
    /// Create a node.
    pub fn new(id: impl Into<String>, location: Option<Point3D>, timeout: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            location,
            floors: None,
            stationary: true,
            timeout,
            calibration: RwLock::new(NodeCalibration::default()),
            rx_links: DashMap::new(),
        }
    }

    /// Build a node from configuration, carrying over calibrated values and
    /// node-to-node readings from the node it replaces.
    pub fn from_config(config: &NodeConfig, default_timeout: f64, previous: Option<&Node>) -> Self {
        let id = config.id();
        let base = previous.map(Node::calibration).unwrap_or_default();
        let rx_links = DashMap::new();
        if let Some(prev) = previous {
            for entry in prev.rx_links.iter() {
                rx_links.insert(entry.key().clone(), entry.value().clone());
            }
        }

        Self {
            name: config.name.clone().unwrap_or_else(|| id.clone()),
            id,
            location: config.location(),
            floors: config.floors.clone(),
            stationary: config.stationary,
            timeout: config.timeout.unwrap_or(default_timeout),
            calibration: RwLock::new(base.overlay(&config.calibration)),
            rx_links,
        }
    }

    /// Builder: restrict to floors.
    pub fn with_floors(mut self, floors: Vec<String>) -> Self {
        self.floors = Some(floors);
        self
    }

    /// Builder: set calibration.
    pub fn with_calibration(self, calibration: NodeCalibration) -> Self {
        *self.calibration.write() = calibration;
        self
    }

    /// Builder: mark as mobile.
    pub fn mobile(mut self) -> Self {
        self.stationary = false;
        self
    }

    /// True if the node hears on the floor.
    pub fn hears_on(&self, floor_id: &str) -> bool {
        match &self.floors {
            Some(floors) => floors.iter().any(|f| f == floor_id),
            None => true,
        }
    }

    /// Current calibration (never torn).
    pub fn calibration(&self) -> NodeCalibration {
        *self.calibration.read()
    }

    /// Read-modify-write of the calibration under the node's lock.
    pub fn update_calibration(&self, f: impl FnOnce(&mut NodeCalibration)) {
        f(&mut self.calibration.write());
    }

    /// True if the node can take part in calibration.
    pub fn is_reference(&self) -> bool {
        self.stationary && self.location.is_some()
    }

    /// Record a node-to-node reading heard by this node.
    ///
    /// Returns false if the reading is older than the one held.
    pub fn record_rx(&self, link: NodeLink) -> bool {
        let mut entry = self.rx_links.entry(link.tx_id.clone()).or_insert_with(|| link.clone());
        if link.last_hit < entry.last_hit {
            return false;
        }
        *entry = link;
        true
    }

    /// Node-to-node readings heard within the timeout.
    pub fn current_rx_links(&self, now: DateTime<Utc>) -> Vec<NodeLink> {
        self.rx_links
            .iter()
            .filter(|e| is_current(e.last_hit, now, self.timeout))
            .map(|e| e.value().clone())
            .collect()
    }
}

/// True if a reading at `last_hit` is within `timeout` seconds of `now`.
pub fn is_current(last_hit: DateTime<Utc>, now: DateTime<Utc>, timeout: f64) -> bool {
    let age = (now - last_hit).num_milliseconds() as f64 / 1000.0;
    age < timeout
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeCalibrationConfig;
    use chrono::Duration;

    fn reading(tx: &str, at: DateTime<Utc>) -> NodeLink {
        NodeLink {
            tx_id: tx.into(),
            distance: 3.0,
            rssi: -70.0,
            ref_rssi: -59.0,
            last_hit: at,
        }
    }

    #[test]
    fn test_hears_on() {
        let node = Node::new("a", None, 30.0);
        assert!(node.hears_on("anything"));
        let node = node.with_floors(vec!["ground".into()]);
        assert!(node.hears_on("ground"));
        assert!(!node.hears_on("first"));
    }

    #[test]
    fn test_calibration_defaults() {
        let cal = NodeCalibration::default();
        assert_eq!(cal.tx_ref_rssi_or_default(), -59.0);
        assert_eq!(cal.rx_adj_rssi_or_default(), 0.0);
        assert_eq!(cal.absorption_or_default(), 3.0);
    }

    #[test]
    fn test_reload_keeps_calibrated_values() {
        let config = NodeConfig {
            id: Some("kitchen".into()),
            point: Some(vec![1.0, 2.0, 3.0]),
            ..Default::default()
        };
        let first = Node::from_config(&config, 30.0, None);
        first.update_calibration(|c| c.rx_adj_rssi = Some(4.0));
        first.record_rx(reading("hall", Utc::now()));

        let mut changed = config.clone();
        changed.calibration = NodeCalibrationConfig {
            absorption: Some(2.7),
            ..Default::default()
        };
        let second = Node::from_config(&changed, 30.0, Some(&first));
        let cal = second.calibration();
        assert_eq!(cal.rx_adj_rssi, Some(4.0));
        assert_eq!(cal.absorption, Some(2.7));
        assert_eq!(second.current_rx_links(Utc::now()).len(), 1);
        assert_eq!(second.location, Some(Point3D::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_rx_links_ignore_stale_and_expire() {
        let node = Node::new("rx", Some(Point3D::ORIGIN), 30.0);
        let now = Utc::now();
        assert!(node.record_rx(reading("tx", now)));
        assert!(!node.record_rx(reading("tx", now - Duration::seconds(5))));
        assert_eq!(node.current_rx_links(now).len(), 1);
        assert!(node.current_rx_links(now + Duration::seconds(31)).is_empty());
    }

    #[test]
    fn test_is_current() {
        let now = Utc::now();
        assert!(is_current(now - Duration::seconds(29), now, 30.0));
        assert!(!is_current(now - Duration::seconds(30), now, 30.0));
    }
}
