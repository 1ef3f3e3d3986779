//! Runtime data model: nodes, devices, links, scenarios.
//!
//! Everything here is shared between the ingestion path and the pipeline,
//! so mutable fields sit behind per-entry locks or `DashMap` entries and
//! are never locked for longer than a single update.

mod device;
mod link;
mod measurement;
mod node;
mod report;
mod scenario;

pub use device::{Classification, Device};
pub use link::{DeviceLink, LinkReading, LinkUpdate, MOVE_THRESHOLD};
pub use measurement::{Measurement, NODE_PREFIX};
pub use node::{
    DEFAULT_ABSORPTION, DEFAULT_TX_REF_RSSI, Node, NodeCalibration, NodeLink, is_current,
};
pub use report::PositionReport;
pub use scenario::{ExitReason, MOVED_THRESHOLD, Scenario, ScenarioKey, ScenarioState};
