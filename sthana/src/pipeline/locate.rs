//! One pipeline tick: locate dirty devices and produce reports.

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::locators::LocateContext;
use crate::model::{Device, PositionReport};
use crate::state::TrackingState;

/// Scenario outcome of one evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// Scenario reported a reportable move
    pub moved: bool,
    /// Scenario confidence after the evaluation
    pub confidence: i32,
}

/// Index of the best outcome: highest confidence among moved scenarios
/// with confidence above zero. Ties go to the lower index.
pub fn select_best(outcomes: &[Outcome]) -> Option<usize> {
    outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| o.moved && o.confidence > 0)
        .fold(None, |best: Option<(usize, i32)>, (i, o)| match best {
            Some((_, confidence)) if confidence >= o.confidence => best,
            _ => Some((i, o.confidence)),
        })
        .map(|(i, _)| i)
}

/// Evaluate every scenario of a device and report the winner.
///
/// Returns `None` when no scenario moved; the last report stands.
pub fn locate_device(state: &TrackingState, device: &Device, now: DateTime<Utc>) -> Option<PositionReport> {
    state.check_device(device);
    if !device.is_tracked() {
        return None;
    }

    let building = state.building();
    let links = device.link_snapshot(state.nodes());
    let ctx = LocateContext {
        device_id: &device.id,
        links: &links,
        building: &building,
        now,
    };

    let mut scenarios = device.scenarios();
    let outcomes: Vec<Outcome> = scenarios
        .par_iter_mut()
        .map(|scenario| Outcome {
            moved: scenario.locate(&ctx),
            confidence: scenario.state.confidence,
        })
        .collect();
    device.set_last_calculated(now);

    let best = &scenarios[select_best(&outcomes)?];
    let location = best.state.location?;

    let reported = if device.is_anchored() {
        device.reset_filter(location, now);
        location
    } else {
        device.smooth(location, best.state.confidence, now)
    };

    let report = PositionReport {
        device_id: device.id.clone(),
        name: device.name(),
        x: reported.x,
        y: reported.y,
        z: reported.z,
        confidence: best.state.confidence,
        fixes: best.state.fixes,
        scenario: best.name(),
        floor: best.state.floor_id().map(str::to_string),
        room: best.state.room_name().map(str::to_string),
        timestamp: now,
    };
    log::debug!(
        "{}: {} at {} ({}%)",
        device.id,
        report.scenario,
        reported,
        report.confidence
    );
    device.set_last_report(report.clone());
    Some(report)
}

/// Drain the dirty set and locate each device once.
pub fn run_tick(state: &TrackingState, now: DateTime<Utc>) -> Vec<PositionReport> {
    state
        .dirty()
        .take()
        .iter()
        .filter_map(|id| state.device(id))
        .filter_map(|device| locate_device(state, &device, now))
        .collect()
}
