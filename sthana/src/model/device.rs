//! Tracked transmitters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};

use super::link::{DeviceLink, LinkReading, LinkUpdate};
use super::measurement::Measurement;
use super::node::Node;
use super::report::PositionReport;
use super::scenario::Scenario;
use crate::config::FilteringSection;
use crate::core::Point3D;
use crate::filter::KalmanFilter;

/// Whether a device is located.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Not yet matched against device rules
    #[default]
    Unclassified,
    /// Located by the pipeline
    Tracked,
    /// Measurements skipped, never located
    Untracked,
}

/// A transmitter heard by one or more nodes.
#[derive(Debug)]
pub struct Device {
    /// Device identifier
    pub id: String,
    name: RwLock<Option<String>>,
    classification: RwLock<Classification>,
    check: AtomicBool,
    anchor: RwLock<Option<Point3D>>,
    links: DashMap<String, DeviceLink>,
    scenarios: Mutex<Vec<Scenario>>,
    filter: Mutex<KalmanFilter>,
    last_report: RwLock<Option<PositionReport>>,
    last_calculated: RwLock<Option<DateTime<Utc>>>,
}

impl Device {
    /// Create an unclassified device awaiting its first check.
    pub fn new(id: impl Into<String>, filtering: FilteringSection) -> Self {
        Self {
            id: id.into(),
            name: RwLock::new(None),
            classification: RwLock::new(Classification::Unclassified),
            check: AtomicBool::new(true),
            anchor: RwLock::new(None),
            links: DashMap::new(),
            scenarios: Mutex::new(Vec::new()),
            filter: Mutex::new(KalmanFilter::new(filtering)),
            last_report: RwLock::new(None),
            last_calculated: RwLock::new(None),
        }
    }

    /// Display name.
    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    /// Set the display name; a change requests reclassification.
    pub fn set_name(&self, name: Option<&str>) -> bool {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return false;
        };
        let mut current = self.name.write();
        if current.as_deref() == Some(name) {
            return false;
        }
        *current = Some(name.to_string());
        self.request_check();
        true
    }

    /// Current classification.
    pub fn classification(&self) -> Classification {
        *self.classification.read()
    }

    /// Set the classification.
    pub fn set_classification(&self, classification: Classification) {
        *self.classification.write() = classification;
    }

    /// True if the pipeline locates this device.
    pub fn is_tracked(&self) -> bool {
        self.classification() == Classification::Tracked
    }

    /// Request reclassification on the next measurement.
    pub fn request_check(&self) {
        self.check.store(true, Ordering::Release);
    }

    /// Consume a pending reclassification request.
    pub fn take_check(&self) -> bool {
        self.check.swap(false, Ordering::AcqRel)
    }

    /// Fixed anchor location.
    pub fn anchor(&self) -> Option<Point3D> {
        *self.anchor.read()
    }

    /// Pin or unpin the device. Returns true if the anchor changed.
    pub fn set_anchor(&self, anchor: Option<Point3D>) -> bool {
        let mut current = self.anchor.write();
        if *current == anchor {
            return false;
        }
        *current = anchor;
        true
    }

    /// True if pinned to a fixed location.
    pub fn is_anchored(&self) -> bool {
        self.anchor.read().is_some()
    }

    /// Apply a measurement to the link with `node_id` atomically.
    pub fn read_link(&self, node_id: &str, m: &Measurement, at: DateTime<Utc>) -> LinkUpdate {
        self.links.entry(node_id.to_string()).or_default().read(m, at)
    }

    /// Copy of one link.
    pub fn link(&self, node_id: &str) -> Option<DeviceLink> {
        self.links.get(node_id).map(|l| l.value().clone())
    }

    /// Number of links ever recorded.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Consistent copy of every link whose node is known and placed.
    ///
    /// Staleness is not filtered here; locators decide currency at `now`.
    pub fn link_snapshot(&self, nodes: &DashMap<String, Arc<Node>>) -> Vec<LinkReading> {
        let mut readings: Vec<LinkReading> = self
            .links
            .iter()
            .filter_map(|entry| {
                let node = nodes.get(entry.key())?;
                LinkReading::new(&node, entry.value())
            })
            .collect();
        readings.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        readings
    }

    /// Lock the scenarios for evaluation or reconciliation.
    pub fn scenarios(&self) -> MutexGuard<'_, Vec<Scenario>> {
        self.scenarios.lock()
    }

    /// Smooth a winning location through the device's filter.
    pub fn smooth(&self, location: Point3D, confidence: i32, now: DateTime<Utc>) -> Point3D {
        self.filter.lock().update_at(location, confidence, now)
    }

    /// Reset the smoothing filter at a location.
    pub fn reset_filter(&self, location: Point3D, now: DateTime<Utc>) {
        self.filter.lock().reset_at(location, now);
    }

    /// Replace the filter, e.g. after a filtering config change.
    pub fn replace_filter(&self, filtering: FilteringSection) {
        *self.filter.lock() = KalmanFilter::new(filtering);
    }

    /// Last emitted report.
    pub fn last_report(&self) -> Option<PositionReport> {
        self.last_report.read().clone()
    }

    /// Record an emitted report.
    pub fn set_last_report(&self, report: PositionReport) {
        *self.last_report.write() = Some(report);
    }

    /// When scenarios were last evaluated.
    pub fn last_calculated(&self) -> Option<DateTime<Utc>> {
        *self.last_calculated.read()
    }

    /// Record a scenario evaluation.
    pub fn set_last_calculated(&self, at: DateTime<Utc>) {
        *self.last_calculated.write() = Some(at);
    }
}
