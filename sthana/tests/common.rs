//! Test utilities for Sthana integration tests.
//!
//! Builds small buildings, noiseless or noisy link sets, and runs a locator
//! once against them.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::StdRng;
use sthana::locators::{Locate, LocateContext, Locator};
use sthana::model::{LinkReading, ScenarioState};
use sthana::{Building, EngineConfig, Measurement, Point3D};

/// One 10 x 10 x 3 floor with a west room, and four corner nodes at z=0.
pub const SQUARE_CONFIG: &str = r#"
timeout: 30
floors:
  - id: ground
    bounds: [[0, 0, 0], [10, 10, 3]]
    rooms:
      - id: west
        name: West
        points: [[0, 0], [5, 0], [5, 10], [0, 10]]
      - id: east
        name: East
        points: [[5, 0], [10, 0], [10, 10], [5, 10]]
nodes:
  - { id: n0, point: [0, 0, 0] }
  - { id: n1, point: [10, 0, 0] }
  - { id: n2, point: [10, 10, 0] }
  - { id: n3, point: [0, 10, 0] }
"#;

/// Parse a configuration, panicking on error.
pub fn config(yaml: &str) -> EngineConfig {
    EngineConfig::from_yaml(yaml).expect("test config parses")
}

/// Building for [`SQUARE_CONFIG`].
pub fn square_building() -> Building {
    Building::from_config(&config(SQUARE_CONFIG))
}

/// Corner nodes of [`SQUARE_CONFIG`].
pub fn square_nodes() -> Vec<Point3D> {
    vec![
        Point3D::new(0.0, 0.0, 0.0),
        Point3D::new(10.0, 0.0, 0.0),
        Point3D::new(10.0, 10.0, 0.0),
        Point3D::new(0.0, 10.0, 0.0),
    ]
}

/// Nodes spread in height so every axis is observable.
pub fn spread_nodes() -> Vec<Point3D> {
    vec![
        Point3D::new(0.0, 0.0, 0.5),
        Point3D::new(10.0, 0.0, 2.5),
        Point3D::new(10.0, 10.0, 0.5),
        Point3D::new(0.0, 10.0, 2.5),
    ]
}

/// A live reading from node `id`.
pub fn reading(id: &str, location: Point3D, distance: f64, at: DateTime<Utc>) -> LinkReading {
    LinkReading {
        node_id: id.into(),
        node_name: id.into(),
        location,
        floors: None,
        distance,
        rssi: -70.0,
        variance: None,
        last_hit: at,
        timeout: 30.0,
    }
}

/// Noiseless readings from every node to `target`, named `n0..`.
pub fn readings_to(target: Point3D, nodes: &[Point3D], at: DateTime<Utc>) -> Vec<LinkReading> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, n)| reading(&format!("n{i}"), *n, n.distance_to(&target), at))
        .collect()
}

/// Readings to `target` with uniform noise of half-width `noise`.
pub fn noisy_readings(
    rng: &mut StdRng,
    target: Point3D,
    nodes: &[Point3D],
    noise: f64,
    at: DateTime<Utc>,
) -> Vec<LinkReading> {
    let mut links = readings_to(target, nodes, at);
    for link in &mut links {
        let jitter = if noise > 0.0 { rng.gen_range(-noise..noise) } else { 0.0 };
        link.distance = (link.distance + jitter).max(0.0);
    }
    links
}

/// Run a locator once. Returns the moved flag.
pub fn locate(
    locator: &Locator,
    scenario: &mut ScenarioState,
    links: &[LinkReading],
    building: &Building,
    now: DateTime<Utc>,
) -> bool {
    let ctx = LocateContext {
        device_id: "test",
        links,
        building,
        now,
    };
    locator.locate(scenario, &ctx)
}

/// Measurement from `tx` heard by `rx`.
pub fn measurement(tx: &str, rx: &str, distance: f64, rssi: f64) -> Measurement {
    Measurement {
        transmitter: tx.into(),
        receiver: rx.into(),
        distance,
        rssi,
        ref_rssi: None,
        timestamp: None,
        name: None,
        variance: None,
    }
}
