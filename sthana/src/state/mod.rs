//! Shared tracking state.
//!
//! [`TrackingState`] is shared between the ingestion side, the positioning
//! pipeline and the calibration runner:
//! - Ingestion: creates devices, updates links, marks devices dirty
//! - Pipeline: drains the dirty set, runs scenarios, stores reports
//! - Calibration: snapshots node links, writes node calibration
//!
//! Nodes and devices live in `DashMap`s keyed by id; get-or-insert is the
//! only allocating entry point. Configuration and geometry are swapped as
//! whole `Arc`s on reload.

mod classify;
mod telemetry;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

pub use classify::{ClassificationRules, DeviceSettings, DeviceSettingsSource, InMemoryDeviceSettings, Verdict};
pub use telemetry::{Telemetry, TelemetrySnapshot};

use crate::config::EngineConfig;
use crate::core::Building;
use crate::error::{Error, Result};
use crate::locators::{Locator, build_locators};
use crate::model::{Device, LinkUpdate, Measurement, Node, NodeLink, Scenario, ScenarioKey};
use crate::pipeline::DirtySet;

/// What ingestion did with a measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ingested {
    /// Node-to-node link recorded for calibration
    NodeLink,
    /// Device link moved; the device was marked dirty
    Moved,
    /// Device link refreshed without a significant change
    Refreshed,
    /// Older than the stored reading; ignored
    Stale,
    /// Device is not tracked
    Skipped,
}

/// Replace scenarios with those for `locators`, keeping the state of every
/// scenario whose key survives.
pub fn reconcile_scenarios(scenarios: &mut Vec<Scenario>, locators: Vec<Locator>) {
    let mut previous: HashMap<ScenarioKey, Scenario> =
        scenarios.drain(..).map(|s| (s.key().clone(), s)).collect();
    scenarios.extend(locators.into_iter().map(|locator| match previous.remove(&locator.key()) {
        Some(mut scenario) => {
            scenario.set_locator(locator);
            scenario
        }
        None => Scenario::new(locator),
    }));
}

/// Engine state shared by all workers.
pub struct TrackingState {
    config: RwLock<Arc<EngineConfig>>,
    building: RwLock<Arc<Building>>,
    rules: RwLock<Arc<ClassificationRules>>,
    nodes: DashMap<String, Arc<Node>>,
    devices: DashMap<String, Arc<Device>>,
    settings: Arc<dyn DeviceSettingsSource>,
    dirty: DirtySet,
    telemetry: Telemetry,
}

impl TrackingState {
    /// Create state from configuration with no stored device settings.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_settings(config, Arc::new(InMemoryDeviceSettings::new()))
    }

    /// Create state with an external device settings source.
    pub fn with_settings(config: EngineConfig, settings: Arc<dyn DeviceSettingsSource>) -> Self {
        let state = Self {
            config: RwLock::new(Arc::new(EngineConfig::default())),
            building: RwLock::new(Arc::new(Building::default())),
            rules: RwLock::new(Arc::new(ClassificationRules::default())),
            nodes: DashMap::new(),
            devices: DashMap::new(),
            settings,
            dirty: DirtySet::new(),
            telemetry: Telemetry::default(),
        };
        state.apply_config(config);
        state
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.config.read())
    }

    /// Current building geometry.
    pub fn building(&self) -> Arc<Building> {
        Arc::clone(&self.building.read())
    }

    /// Configured nodes by id.
    pub fn nodes(&self) -> &DashMap<String, Arc<Node>> {
        &self.nodes
    }

    /// Look up a node.
    pub fn node(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes.get(id).map(|n| Arc::clone(n.value()))
    }

    /// Known devices by id.
    pub fn devices(&self) -> &DashMap<String, Arc<Device>> {
        &self.devices
    }

    /// Look up a device.
    pub fn device(&self, id: &str) -> Option<Arc<Device>> {
        self.devices.get(id).map(|d| Arc::clone(d.value()))
    }

    /// Devices waiting for the pipeline.
    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    /// Ingestion counters.
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Replace the configuration.
    ///
    /// Nodes are rebuilt keeping optimizer-set calibration and their
    /// node-to-node links. Every device is reclassified and its scenarios
    /// reconciled against the new locator set.
    pub fn apply_config(&self, config: EngineConfig) {
        let previous = self.config();

        let mut keep = Vec::new();
        for node_config in config.nodes.iter().filter(|n| n.enabled) {
            let id = node_config.id();
            let existing = self.node(&id);
            let node = Node::from_config(node_config, config.timeout, existing.as_deref());
            self.nodes.insert(id.clone(), Arc::new(node));
            keep.push(id);
        }
        self.nodes.retain(|id, _| keep.contains(id));

        let filtering_changed = previous.filtering != config.filtering;
        *self.building.write() = Arc::new(Building::from_config(&config));
        *self.rules.write() = Arc::new(ClassificationRules::from_config(&config));
        *self.config.write() = Arc::new(config);

        log::info!(
            "Configuration applied: {} nodes, {} floors",
            self.nodes.len(),
            self.building().floors().len()
        );

        let filtering = self.config().filtering;
        for entry in self.devices.iter() {
            let device = entry.value();
            if filtering_changed {
                device.replace_filter(filtering);
            }
            device.request_check();
            self.check_device(device);
        }
    }

    /// Get a device, creating it on first sight with any stored settings.
    pub fn get_or_create_device(&self, id: &str) -> Arc<Device> {
        if let Some(device) = self.device(id) {
            return device;
        }

        let device = Arc::new(Device::new(id, self.config().filtering));
        if let Some(settings) = self.settings.get(id) {
            device.set_name(settings.name.as_deref());
            device.set_anchor(settings.anchor);
        }
        let device = Arc::clone(self.devices.entry(id.to_string()).or_insert(device).value());
        log::debug!("New device {}", id);
        device
    }

    /// Reclassify a device if a check was requested, and rebuild its
    /// scenarios when tracked.
    pub fn check_device(&self, device: &Device) {
        if !device.take_check() {
            return;
        }

        let rules = Arc::clone(&self.rules.read());
        let settings = self.settings.get(&device.id);
        let name = device.name();
        let verdict = rules.classify(&device.id, name.as_deref(), settings.as_ref());

        if verdict.name.is_some() {
            device.set_name(verdict.name.as_deref());
            device.take_check();
        }
        let was = device.classification();
        device.set_classification(verdict.classification);
        device.set_anchor(verdict.anchor);

        if device.is_tracked() {
            let locators = build_locators(&self.config(), &self.building(), verdict.anchor);
            reconcile_scenarios(&mut device.scenarios(), locators);
            self.dirty.mark(&device.id);
        } else {
            device.scenarios().clear();
        }

        if was != verdict.classification {
            log::info!("{}: classified as {:?}", device.id, verdict.classification);
        }
    }

    /// Ingest a measurement at the current time.
    pub fn ingest(&self, m: &Measurement) -> Result<Ingested> {
        self.ingest_at(m, Utc::now())
    }

    /// Ingest a measurement; `now` stands in for a missing timestamp.
    pub fn ingest_at(&self, m: &Measurement, now: DateTime<Utc>) -> Result<Ingested> {
        if let Err(e) = m.validate() {
            Telemetry::bump(&self.telemetry.malformed);
            return Err(e);
        }
        Telemetry::bump(&self.telemetry.messages);

        let Some(receiver) = self.node(&m.receiver) else {
            Telemetry::bump(&self.telemetry.unknown_node);
            log::warn!("Dropping measurement from {}: unknown receiver {}", m.transmitter, m.receiver);
            return Err(Error::UnknownReceiver(m.receiver.clone()));
        };
        let at = m.time_or(now);

        if let Some(tx_id) = m.transmitting_node()
            && let Some(transmitter) = self.node(tx_id)
            && transmitter.is_reference()
            && receiver.is_reference()
        {
            let ref_rssi = m
                .ref_rssi
                .unwrap_or_else(|| transmitter.calibration().tx_ref_rssi_or_default());
            receiver.record_rx(NodeLink {
                tx_id: tx_id.to_string(),
                distance: m.distance,
                rssi: m.rssi,
                ref_rssi,
                last_hit: at,
            });
            return Ok(Ingested::NodeLink);
        }

        let device = self.get_or_create_device(&m.transmitter);
        device.set_name(m.name.as_deref());
        self.check_device(&device);
        if !device.is_tracked() {
            Telemetry::bump(&self.telemetry.skipped);
            return Ok(Ingested::Skipped);
        }

        Ok(match device.read_link(&receiver.id, m, at) {
            LinkUpdate::Moved => {
                Telemetry::bump(&self.telemetry.moved);
                self.dirty.mark(&device.id);
                Ingested::Moved
            }
            LinkUpdate::Refreshed => Ingested::Refreshed,
            LinkUpdate::Stale => Ingested::Stale,
        })
    }

    /// Parse and ingest one JSON measurement at the current time.
    ///
    /// Unparseable payloads count as malformed, like ones failing validation.
    pub fn ingest_json(&self, json: &str) -> Result<Ingested> {
        let m = Measurement::from_json(json).inspect_err(|_| Telemetry::bump(&self.telemetry.malformed))?;
        self.ingest(&m)
    }

    /// Reclassify a device after its stored settings changed.
    pub fn refresh_device(&self, device_id: &str) {
        if let Some(device) = self.device(device_id) {
            device.request_check();
            self.check_device(&device);
        }
    }

    /// Mark tracked devices not located within the timeout as dirty, so
    /// their scenarios can decay.
    pub fn recheck_idle(&self, now: DateTime<Utc>) -> usize {
        let timeout = chrono::Duration::milliseconds((self.config().timeout * 1000.0) as i64);
        let mut marked = 0;
        for entry in self.devices.iter() {
            let device = entry.value();
            if !device.is_tracked() || device.link_count() == 0 {
                continue;
            }
            let idle = device.last_calculated().is_none_or(|t| now - t > timeout);
            if idle {
                self.dirty.mark(&device.id);
                marked += 1;
            }
        }
        marked
    }
}
