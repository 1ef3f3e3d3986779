//! Steps shared by the floor-bound multilateration locators.

use std::sync::Arc;

use crate::core::{Floor, Point3D, pearson_correlation};
use crate::model::{LinkReading, ScenarioState};

use super::LocateContext;

/// Confidence below which the search restarts from the two nearest links.
pub(crate) const RESEED_CONFIDENCE: i32 = 5;

/// Live links heard on `floor_id`, nearest first.
pub(crate) fn floor_links<'a>(ctx: &LocateContext<'a>, floor_id: &str) -> Vec<&'a LinkReading> {
    let mut links: Vec<&LinkReading> = ctx
        .links
        .iter()
        .filter(|l| l.is_current(ctx.now) && l.hears_on(floor_id))
        .collect();
    links.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    links
}

/// Every live link, nearest first.
pub(crate) fn live_links<'a>(ctx: &LocateContext<'a>) -> Vec<&'a LinkReading> {
    let mut links: Vec<&LinkReading> = ctx.links.iter().filter(|l| l.is_current(ctx.now)).collect();
    links.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    links
}

/// Record link statistics on the scenario.
pub(crate) fn record_links(scenario: &mut ScenarioState, links: &[&LinkReading]) {
    scenario.minimum = links.first().map(|l| l.distance);
    scenario.last_hit = links.iter().map(|l| l.last_hit).max();
    scenario.fixes = links.len();
}

/// Starting point for a search, or `None` when fewer than two links remain.
///
/// Restarts from the midpoint of the two nearest links while confidence is
/// low, otherwise continues from the previous location.
pub(crate) fn seed(scenario: &ScenarioState, links: &[&LinkReading]) -> Option<Point3D> {
    if links.len() < 2 {
        return None;
    }
    match scenario.location {
        Some(previous) if scenario.confidence >= RESEED_CONFIDENCE && previous.is_finite() => {
            Some(previous)
        }
        _ => Some(Point3D::midpoint(&links[0].location, &links[1].location)),
    }
}

/// Record links and compute the seed, clamped into the floor.
///
/// Resets the scenario and returns `None` with one link or fewer.
pub(crate) fn initialize(
    scenario: &mut ScenarioState,
    links: &[&LinkReading],
    floor: &Arc<Floor>,
) -> Option<Point3D> {
    record_links(scenario, links);
    let Some(guess) = seed(scenario, links) else {
        scenario.reset();
        return None;
    };
    scenario.floor = Some(Arc::clone(floor));
    Some(floor.clamp(&guess))
}

/// Pearson r of measured against mapped distances.
pub(crate) fn set_pearson(scenario: &mut ScenarioState, links: &[&LinkReading]) {
    scenario.pearson = match scenario.location {
        Some(location) if links.len() >= 2 => {
            let measured: Vec<f64> = links.iter().map(|l| l.distance).collect();
            let mapped: Vec<f64> = links.iter().map(|l| location.distance_to(&l.location)).collect();
            Some(pearson_correlation(&measured, &mapped))
        }
        _ => None,
    };
}

/// Store the confidence and decide whether the move is reportable.
///
/// The room is only reassigned when the location moved.
pub(crate) fn finalize(scenario: &mut ScenarioState, confidence: i32, floor: Option<&Floor>) -> bool {
    scenario.confidence = confidence;
    if confidence <= 0 || !scenario.has_moved() {
        return false;
    }
    scenario.room = match (floor, scenario.location) {
        (Some(floor), Some(location)) => floor.room_at(&location).cloned(),
        _ => None,
    };
    true
}

/// Unit step from `from` toward the centroid of the three nearest links,
/// with a fallback step on axes the direction leaves flat.
pub(crate) fn perturbation(from: &Point3D, links: &[&LinkReading], floor: Option<&Floor>) -> [f64; 3] {
    const MIN_COMPONENT: f64 = 0.05;
    const FALLBACK_STEP: f64 = 0.25;

    let direction = Point3D::centroid(links.iter().take(3).map(|l| &l.location))
        .and_then(|c| (c - *from).normalized())
        .unwrap_or(Point3D::new(1.0, 1.0, 1.0));

    let bounds = floor.and_then(|f| f.bounds);
    let fallback = |value: f64, max: Option<f64>| match max {
        Some(max) if value + FALLBACK_STEP > max => -FALLBACK_STEP,
        _ => FALLBACK_STEP,
    };

    let components = [
        (direction.x, from.x, bounds.map(|b| b.max.x)),
        (direction.y, from.y, bounds.map(|b| b.max.y)),
        (direction.z, from.z, bounds.map(|b| b.max.z)),
    ];
    components.map(|(c, value, max)| {
        if c.abs() < MIN_COMPONENT {
            fallback(value, max)
        } else {
            c
        }
    })
}

/// Mean squared range residual at `location`.
pub(crate) fn mean_squared_residual(location: &Point3D, links: &[&LinkReading]) -> f64 {
    if links.is_empty() {
        return 0.0;
    }
    links
        .iter()
        .map(|l| (location.distance_to(&l.location) - l.distance).powi(2))
        .sum::<f64>()
        / links.len() as f64
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};

    use crate::core::{Bounds, Building, Floor, Point2D, Point3D, Polygon, Room};
    use crate::model::LinkReading;

    pub fn square_floor(id: &str, size: f64, height: f64) -> Floor {
        Floor {
            id: id.into(),
            name: id.into(),
            bounds: Some(Bounds::new(Point3D::ORIGIN, Point3D::new(size, size, height))),
            rooms: vec![Room {
                id: "west".into(),
                name: "West".into(),
                polygon: Polygon::new(vec![
                    Point2D::new(0.0, 0.0),
                    Point2D::new(size / 2.0, 0.0),
                    Point2D::new(size / 2.0, size),
                    Point2D::new(0.0, size),
                ]),
            }],
        }
    }

    pub fn building(floors: Vec<Floor>, node_count: usize) -> Building {
        let per_floor = floors.iter().map(|f| (f.id.clone(), node_count)).collect();
        Building::new(floors, per_floor, node_count)
    }

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

    /// Noiseless readings from nodes at `nodes` to `target`.
    pub fn readings_to(target: Point3D, nodes: &[Point3D], at: DateTime<Utc>) -> Vec<LinkReading> {
        nodes
            .iter()
            .enumerate()
            .map(|(i, n)| reading(&format!("n{i}"), *n, n.distance_to(&target), at))
            .collect()
    }

    pub fn square_nodes() -> Vec<Point3D> {
        vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(10.0, 0.0, 0.0),
            Point3D::new(10.0, 10.0, 0.0),
            Point3D::new(0.0, 10.0, 0.0),
        ]
    }
}
