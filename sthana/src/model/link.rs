//! Device-to-node measurement links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::measurement::Measurement;
use super::node::{Node, is_current};
use crate::core::Point3D;

/// Distance change (m) below which a reading is treated as noise.
pub const MOVE_THRESHOLD: f64 = 0.25;

/// Outcome of applying a measurement to a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkUpdate {
    /// First reading, or distance changed by more than [`MOVE_THRESHOLD`]
    Moved,
    /// Refreshed without a significant change
    Refreshed,
    /// Older than the reading already held; ignored
    Stale,
}

/// Latest reading for one device-node pair.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceLink {
    /// Latest reported distance (m)
    pub distance: f64,
    /// Distance at the last significant change (m)
    pub last_distance: f64,
    /// Raw RSSI (dBm)
    pub rssi: f64,
    /// Reference RSSI at 1m (dBm)
    pub ref_rssi: Option<f64>,
    /// Distance variance (m²)
    pub variance: Option<f64>,
    /// Readings applied
    pub hits: u64,
    /// Time of the latest reading
    pub last_hit: Option<DateTime<Utc>>,
    /// Time of the last significant change
    pub last_moved: Option<DateTime<Utc>>,
}

impl DeviceLink {
    /// Apply a measurement taken at `at`.
    pub fn read(&mut self, m: &Measurement, at: DateTime<Utc>) -> LinkUpdate {
        if let Some(last) = self.last_hit
            && at < last
        {
            return LinkUpdate::Stale;
        }

        let first = self.hits == 0;
        self.rssi = m.rssi;
        self.ref_rssi = m.ref_rssi;
        self.variance = m.variance;
        self.distance = m.distance;
        self.last_hit = Some(at);
        self.hits += 1;

        if first || (self.last_distance - m.distance).abs() > MOVE_THRESHOLD {
            self.last_distance = m.distance;
            self.last_moved = Some(at);
            LinkUpdate::Moved
        } else {
            LinkUpdate::Refreshed
        }
    }

    /// True if the latest reading is within `timeout` seconds of `now`.
    pub fn is_current(&self, now: DateTime<Utc>, timeout: f64) -> bool {
        self.last_hit.is_some_and(|t| is_current(t, now, timeout))
    }
}

/// Immutable copy of a link joined with its node, taken once per tick.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkReading {
    /// Receiving node id
    pub node_id: String,
    /// Receiving node name
    pub node_name: String,
    /// Receiving node location
    pub location: Point3D,
    /// Floors the node hears on, `None` for every floor
    pub floors: Option<Vec<String>>,
    /// Reported distance (m)
    pub distance: f64,
    /// Raw RSSI (dBm)
    pub rssi: f64,
    /// Distance variance (m²)
    pub variance: Option<f64>,
    /// Time of the reading
    pub last_hit: DateTime<Utc>,
    /// Node currency window (s)
    pub timeout: f64,
}

impl LinkReading {
    /// Join a link with its node. Unplaced nodes and never-hit links yield `None`.
    pub fn new(node: &Node, link: &DeviceLink) -> Option<Self> {
        Some(Self {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            location: node.location?,
            floors: node.floors.clone(),
            distance: link.distance,
            rssi: link.rssi,
            variance: link.variance,
            last_hit: link.last_hit?,
            timeout: node.timeout,
        })
    }

    /// True if the reading is within the node's timeout.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        is_current(self.last_hit, now, self.timeout)
    }

    /// True if the node hears on the floor.
    pub fn hears_on(&self, floor_id: &str) -> bool {
        match &self.floors {
            Some(floors) => floors.iter().any(|f| f == floor_id),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn measurement(distance: f64) -> Measurement {
        Measurement {
            transmitter: "phone".into(),
            receiver: "kitchen".into(),
            distance,
            rssi: -70.0,
            ref_rssi: Some(-59.0),
            timestamp: None,
            name: None,
            variance: None,
        }
    }

    #[test]
    fn test_moved_threshold() {
        let now = Utc::now();
        let mut link = DeviceLink::default();
        assert_eq!(link.read(&measurement(3.0), now), LinkUpdate::Moved);
        assert_eq!(link.read(&measurement(3.2), now), LinkUpdate::Refreshed);
        assert_eq!(link.distance, 3.2);
        assert_eq!(link.last_distance, 3.0);
        assert_eq!(link.read(&measurement(3.3), now), LinkUpdate::Moved);
        assert_eq!(link.hits, 3);
    }

    #[test]
    fn test_first_close_reading_moves() {
        let now = Utc::now();
        let mut link = DeviceLink::default();
        assert_eq!(link.read(&measurement(0.1), now), LinkUpdate::Moved);
        assert_eq!(link.last_distance, 0.1);
        assert_eq!(link.last_moved, Some(now));
        assert_eq!(link.read(&measurement(0.2), now), LinkUpdate::Refreshed);
    }

    #[test]
    fn test_stale_reading_does_not_regress() {
        let now = Utc::now();
        let mut link = DeviceLink::default();
        link.read(&measurement(5.0), now);
        let update = link.read(&measurement(1.0), now - Duration::seconds(2));
        assert_eq!(update, LinkUpdate::Stale);
        assert_eq!(link.distance, 5.0);
        assert_eq!(link.hits, 1);
    }

    #[test]
    fn test_reading_requires_location() {
        let mut link = DeviceLink::default();
        let now = Utc::now();
        link.read(&measurement(2.0), now);

        let unplaced = Node::new("n", None, 30.0);
        assert!(LinkReading::new(&unplaced, &link).is_none());

        let placed = Node::new("n", Some(Point3D::ORIGIN), 30.0);
        let reading = LinkReading::new(&placed, &link).unwrap();
        assert!(reading.is_current(now));
        assert!(!reading.is_current(now + Duration::seconds(30)));
        assert!(reading.hears_on("any"));
    }
}
