//! # Sthana
//!
//! Indoor positioning engine for BLE devices heard by fixed receiver nodes.
//!
//! ## Overview
//!
//! Receiver nodes report a distance and RSSI per transmitter they hear.
//! Sthana turns those reports into per-device position estimates:
//!
//! - **Ingestion** validates measurements, classifies the transmitter and
//!   records the link on the device (or on the node, for node-to-node links)
//! - **Locators** each produce a candidate location with a 0-100 confidence
//! - **Pipeline** picks the best moved candidate, smooths it and emits a
//!   [`PositionReport`]
//! - **Calibration** fits per-node RSSI corrections from node-to-node links
//!
//! ## Locators
//!
//! | Locator | Scope | Method |
//! |---------|-------|--------|
//! | Nelder-Mead | floor | weighted multilateration with range scale |
//! | Gauss-Newton | floor | damped least-squares multilateration |
//! | Nadaraya-Watson | floor | kernel-weighted centroid |
//! | MLE | floor | variance-weighted likelihood with range scale |
//! | Multi-floor | building | Nelder-Mead over all floors |
//! | Nearest node | building | closest receiver |
//! | Anchor | fixed | operator-supplied location |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sthana::{EngineConfig, Measurement, PipelineWorker, TrackingState};
//!
//! let config = EngineConfig::load("configs/config.yaml")?;
//! let state = Arc::new(TrackingState::new(config));
//! let (tx, rx) = crossbeam_channel::unbounded();
//! let _pipeline = PipelineWorker::spawn(Arc::clone(&state), tx)?;
//!
//! state.ingest(&measurement)?;
//! let report = rx.recv()?;
//! println!("{} at ({:.1}, {:.1})", report.device_id, report.x, report.y);
//! ```
//!
//! ## Coordinate System
//!
//! Building coordinates in meters. Z is up; floors are stacked by their
//! z-range.

#![warn(missing_docs)]

// Geometry and numerics
pub mod core;

// YAML configuration
pub mod config;

// Error types
pub mod error;

// Link weightings and kernels
pub mod weighting;

// Confidence scoring
pub mod confidence;

// Position smoothing
pub mod filter;

// Nodes, devices, links and scenarios
pub mod model;

// Positioning strategies
pub mod locators;

// Shared tracking state and ingestion
pub mod state;

// Dirty-set driven positioning loop
pub mod pipeline;

// Node calibration
pub mod calibration;

pub use config::{ConfigLoadError, EngineConfig};
pub use core::{Bounds, Building, Floor, Point3D, Room};
pub use error::{Error, Result};

pub use model::{Classification, Device, Measurement, Node, NodeCalibration, PositionReport, Scenario};

pub use locators::{Locate, LocateContext, Locator, LocatorKind, build_locators};

pub use state::{
    DeviceSettings, DeviceSettingsSource, InMemoryDeviceSettings, Ingested, Telemetry,
    TelemetrySnapshot, TrackingState,
};

pub use pipeline::{PipelineWorker, run_tick};

pub use calibration::{CalibrationMatrix, CalibrationRunner, Calibrator, OptimizerState};
