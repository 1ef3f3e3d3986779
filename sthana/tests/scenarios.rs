//! Reference scenarios, end to end through the public API.

mod common;

use std::io::Write;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sthana::locators::{Locator, NelderMead};
use sthana::model::{DEFAULT_TX_REF_RSSI, ScenarioState};
use sthana::weighting::Weighting;
use sthana::{
    Calibrator, DeviceSettings, EngineConfig, InMemoryDeviceSettings, Point3D, TrackingState,
    run_tick,
};

/// Four corner nodes, device at the center with exact ranges.
#[test]
fn test_square_room_center() {
    let building = square_building();
    let now = Utc::now();
    let links: Vec<_> = square_nodes()
        .iter()
        .enumerate()
        .map(|(i, p)| reading(&format!("n{i}"), *p, 7.07, now))
        .collect();

    let locator = Locator::NelderMead(NelderMead::new("ground", Weighting::default(), true));
    let mut scenario = ScenarioState::default();
    assert!(locate(&locator, &mut scenario, &links, &building, now));

    let location = scenario.location.unwrap();
    assert!(location.distance_to(&Point3D::new(5.0, 5.0, 0.0)) < 0.1, "{location}");
    assert!(scenario.confidence >= 50, "confidence {}", scenario.confidence);
    assert_eq!(scenario.floor_id(), Some("ground"));
}

/// One live link is not enough to place anything.
#[test]
fn test_single_link() {
    let building = square_building();
    let now = Utc::now();
    let links = vec![reading("n0", Point3D::ORIGIN, 2.0, now)];

    let locator = Locator::NelderMead(NelderMead::new("ground", Weighting::default(), true));
    let mut scenario = ScenarioState::default();
    assert!(!locate(&locator, &mut scenario, &links, &building, now));
    assert_eq!(scenario.confidence, 0);
    assert!(scenario.floor.is_none());
    assert!(scenario.room.is_none());
}

/// Node-to-node links that already fit the default model leave calibration
/// untouched.
#[test]
fn test_calibration_at_zero_error() {
    let yaml = r#"
floors:
  - id: ground
    bounds: [[0, 0, 0], [20, 20, 3]]
nodes:
  - { id: a, point: [0, 0, 1] }
  - { id: b, point: [7, 0, 1] }
  - { id: c, point: [0, 9, 1] }
  - { id: d, point: [7, 9, 1] }
optimization:
  enabled: true
"#;
    let state = TrackingState::new(config(yaml));
    let ids = ["a", "b", "c", "d"];
    for tx in ids {
        for rx in ids.iter().filter(|rx| **rx != tx) {
            let from = state.node(tx).unwrap().location.unwrap();
            let to = state.node(rx).unwrap().location.unwrap();
            let d = from.distance_to(&to);
            let rssi = DEFAULT_TX_REF_RSSI - 30.0 * d.log10();
            state
                .ingest(&measurement(&format!("node:{tx}"), rx, d, rssi))
                .unwrap();
        }
    }

    let before: Vec<_> = ids.iter().map(|id| state.node(id).unwrap().calibration()).collect();
    let calibrator = Calibrator::new(&state);
    let applied = calibrator.run_once(&state, Utc::now());
    let after: Vec<_> = ids.iter().map(|id| state.node(id).unwrap().calibration()).collect();

    assert!(applied.is_empty(), "applied {applied:?}");
    assert_eq!(before, after);
    assert_eq!(calibrator.state().best_rmse, Some(0.0));
}

/// Anchored devices report their fixed point at full confidence however
/// much they are heard, and the anchor round-trips through settings.
#[test]
fn test_anchor_stability() {
    let yaml = format!("{SQUARE_CONFIG}devices:\n  - id: \"tag:*\"\n");
    let settings = Arc::new(InMemoryDeviceSettings::new());
    let anchor = Point3D::new(2.5, 7.5, 1.0);
    settings.set(
        "tag:1",
        DeviceSettings {
            name: Some("Desk".into()),
            anchor: Some(anchor),
        },
    );
    let state = TrackingState::with_settings(config(&yaml), settings.clone());

    let mut rng = StdRng::seed_from_u64(3);
    let now = Utc::now();
    let mut reports = Vec::new();
    for step in 0..5 {
        let at = now + Duration::seconds(step);
        for rx in ["n0", "n1", "n2", "n3"] {
            let distance = rng.gen_range(1.0..12.0);
            state.ingest_at(&measurement("tag:1", rx, distance, -70.0), at).unwrap();
        }
        reports.extend(run_tick(&state, at));
    }

    // Only the first tick moves an anchor
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].location(), anchor);
    assert_eq!(reports[0].confidence, 100);
    assert_eq!(reports[0].scenario, "anchor");
    assert_eq!(reports[0].room.as_deref(), Some("West"));

    // Drop the anchor, then restore the same point
    settings.set(
        "tag:1",
        DeviceSettings {
            name: Some("Desk".into()),
            anchor: None,
        },
    );
    state.refresh_device("tag:1");
    assert!(!state.device("tag:1").unwrap().is_anchored());

    settings.set(
        "tag:1",
        DeviceSettings {
            name: Some("Desk".into()),
            anchor: Some(anchor),
        },
    );
    state.refresh_device("tag:1");
    let later = now + Duration::seconds(10);
    let reports = run_tick(&state, later);
    let report = reports.iter().find(|r| r.device_id == "tag:1").unwrap();
    assert_eq!(report.location(), anchor);
    assert_eq!(report.confidence, 100);
}

/// Noisy ranges through ingestion, pipeline tick and smoothing.
#[test]
fn test_pipeline_tracks_noisy_device() {
    let yaml = format!(
        "{SQUARE_CONFIG}devices:\n  - id: \"phone:*\"\nlocators:\n  nelder_mead:\n    enabled: true\n  gauss_newton:\n    enabled: true\n"
    );
    let state = TrackingState::new(config(&yaml));
    let target = Point3D::new(6.0, 4.0, 1.0);
    let mut rng = StdRng::seed_from_u64(42);
    let now = Utc::now();

    let mut last = None;
    for step in 0..10 {
        let at = now + Duration::seconds(step);
        for (i, node) in square_nodes().iter().enumerate() {
            let distance = node.distance_to(&target) + rng.gen_range(-0.2..0.2);
            state
                .ingest_at(&measurement("phone:1", &format!("n{i}"), distance, -70.0), at)
                .unwrap();
        }
        if let Some(report) = run_tick(&state, at).into_iter().find(|r| r.device_id == "phone:1") {
            last = Some(report);
        }
    }

    let report = last.expect("at least one report");
    let location = report.location();
    assert!(
        (location.x - target.x).abs() < 1.0 && (location.y - target.y).abs() < 1.0,
        "{location}"
    );
    assert_eq!(report.floor.as_deref(), Some("ground"));
    assert!(report.confidence > 0);
    assert!(state.telemetry().snapshot().messages >= 40);
}

/// Configuration loads from disk and hot-reloads into running state.
#[test]
fn test_config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SQUARE_CONFIG.as_bytes()).unwrap();

    let loaded = EngineConfig::load(file.path()).unwrap();
    assert_eq!(loaded.nodes.len(), 4);
    assert_eq!(loaded.floors.len(), 1);

    let state = TrackingState::new(loaded);
    assert!(state.node("n3").is_some());

    let mut smaller = tempfile::NamedTempFile::new().unwrap();
    let yaml = SQUARE_CONFIG.replace("  - { id: n3, point: [0, 10, 0] }\n", "");
    smaller.write_all(yaml.as_bytes()).unwrap();
    state.apply_config(EngineConfig::load(smaller.path()).unwrap());
    assert!(state.node("n3").is_none());
    assert_eq!(state.building().node_count(), 3);

    let mut broken = tempfile::NamedTempFile::new().unwrap();
    broken.write_all(b"timeout: [not, a, number]").unwrap();
    assert!(EngineConfig::load(broken.path()).is_err());
}

/// The shipped example configuration stays loadable.
#[test]
fn test_shipped_config_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/config.yaml");
    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.floors.len(), 2);
    let state = TrackingState::new(config);
    assert_eq!(state.building().floors().len(), 2);
    assert_eq!(state.nodes().len(), 6);
    assert!(state.node("living_room").is_some());
    let office = state.node("office").unwrap().calibration();
    assert_eq!(office.rx_adj_rssi, Some(-2.0));
}
