//! Configuration loading for the positioning engine.
//!
//! Loads the building, node, device and locator settings from a single YAML
//! file with sensible defaults for everything but the geometry.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sthana::config::EngineConfig;
//!
//! // Load from default path (configs/config.yaml)
//! let config = EngineConfig::load_default()?;
//!
//! // Or parse a string
//! let config = EngineConfig::from_yaml("timeout: 30")?;
//! ```
//!
//! ## Configuration Sections
//!
//! | Section | Description |
//! |---------|-------------|
//! | `floors` | Floor bounds and room outlines |
//! | `nodes` | Node placement, floors, calibration defaults |
//! | `devices` / `exclude_devices` | Tracking rules and anchors |
//! | [`LocatorsSection`] | Which locators run, on which floors |
//! | [`OptimizationSection`] | Calibration cadence and limits |
//! | [`FilteringSection`] | Kalman smoothing |
//! | [`PipelineSection`] | Pipeline polling and idle recheck |
//!
//! ## Example YAML
//!
//! ```yaml
//! timeout: 30
//! floors:
//!   - id: ground
//!     bounds: [[0, 0, 0], [12, 8, 3]]
//!     rooms:
//!       - name: Kitchen
//!         points: [[0, 0], [4, 0], [4, 4], [0, 4]]
//! nodes:
//!   - name: Kitchen
//!     point: [1, 1, 1.2]
//!     floors: [ground]
//! devices:
//!   - id: "irk:*"
//! locators:
//!   nelder_mead:
//!     enabled: true
//!     weighting:
//!       algorithm: exponential
//!       props: { lambda: 3 }
//! optimization:
//!   enabled: true
//!   interval_secs: 60
//! ```

mod building;
mod defaults;
mod devices;
mod engine;
mod error;
mod locators;
mod optimization;
mod runtime;

// Re-export main types
pub use engine::EngineConfig;
pub use error::ConfigLoadError;

// Re-export section types
pub use building::{FloorConfig, NodeCalibrationConfig, NodeConfig, RoomConfig, derive_id};
pub use devices::DeviceConfig;
pub use locators::{
    GaussNewtonSection, LocatorsSection, MleSection, MultiFloorSection, NadarayaWatsonSection,
    NearestNodeSection, NelderMeadSection, WeightingConfig,
};
pub use optimization::{LimitsSection, OptimizationSection};
pub use runtime::{FilteringSection, PipelineSection};
