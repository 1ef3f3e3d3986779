//! Locator strategies.
//!
//! A locator turns a device's live links into a location, confidence and
//! diagnostics written into a [`ScenarioState`]. Every strategy implements
//! [`Locate`]; the set of strategies is closed in [`Locator`] and chosen
//! per device and floor from configuration.
//!
//! | Locator | Floor-bound | Confidence |
//! |---------|-------------|------------|
//! | [`GaussNewton`] | yes | from the nearest link distance |
//! | [`NelderMead`] | yes | link count, distance, scale, fit |
//! | [`NadarayaWatson`] | yes | centralized formula |
//! | [`Mle`] | yes | distance, scale, likelihood |
//! | [`MultiFloor`] | no | centralized formula |
//! | [`NearestNode`] | no | fixed at 1 |
//! | [`AnchorLocator`] | no | fixed at 100 |

mod anchor;
mod common;
mod gauss_newton;
mod mle;
mod multi_floor;
mod nadaraya_watson;
mod nearest_node;
mod nelder_mead;

use chrono::{DateTime, Utc};

pub use anchor::AnchorLocator;
pub use gauss_newton::GaussNewton;
pub use mle::Mle;
pub use multi_floor::MultiFloor;
pub use nadaraya_watson::NadarayaWatson;
pub use nearest_node::NearestNode;
pub use nelder_mead::NelderMead;

use crate::config::EngineConfig;
use crate::core::{Building, Point3D};
use crate::model::{LinkReading, ScenarioKey, ScenarioState};
use crate::weighting::{Kernel, Weighting};

/// Inputs shared by every scenario of a device in one pipeline tick.
#[derive(Clone, Copy, Debug)]
pub struct LocateContext<'a> {
    /// Device being located, for log context
    pub device_id: &'a str,
    /// Consistent copy of the device's links
    pub links: &'a [LinkReading],
    /// Building geometry
    pub building: &'a Building,
    /// Evaluation time for link currency
    pub now: DateTime<Utc>,
}

/// Locator capability.
pub trait Locate {
    /// Update the scenario from the context's live links.
    ///
    /// Returns true if the location moved enough to be worth reporting.
    fn locate(&self, scenario: &mut ScenarioState, ctx: &LocateContext<'_>) -> bool;
}

/// Locator kinds, in scenario creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocatorKind {
    /// Fixed operator location
    Anchor,
    /// Nelder-Mead simplex multilateration
    NelderMead,
    /// Gauss-Newton multilateration
    GaussNewton,
    /// Nadaraya-Watson kernel regression
    NadarayaWatson,
    /// Variance-weighted maximum likelihood
    Mle,
    /// Building-wide Nelder-Mead
    MultiFloor,
    /// Nearest-node fallback
    NearestNode,
}

impl LocatorKind {
    /// Get the locator name for logging
    pub fn name(&self) -> &'static str {
        match self {
            LocatorKind::Anchor => "anchor",
            LocatorKind::NelderMead => "nelder_mead",
            LocatorKind::GaussNewton => "gauss_newton",
            LocatorKind::NadarayaWatson => "nadaraya_watson",
            LocatorKind::Mle => "mle",
            LocatorKind::MultiFloor => "multi_floor",
            LocatorKind::NearestNode => "nearest_node",
        }
    }
}

/// The closed set of locator strategies.
#[derive(Clone, Debug, PartialEq)]
pub enum Locator {
    /// Fixed operator location
    Anchor(AnchorLocator),
    /// Nelder-Mead simplex multilateration on one floor
    NelderMead(NelderMead),
    /// Gauss-Newton multilateration on one floor
    GaussNewton(GaussNewton),
    /// Kernel regression on one floor
    NadarayaWatson(NadarayaWatson),
    /// Maximum-likelihood multilateration on one floor
    Mle(Mle),
    /// Building-wide Nelder-Mead
    MultiFloor(MultiFloor),
    /// Nearest-node fallback
    NearestNode(NearestNode),
}

impl Locator {
    /// Locator kind.
    pub fn kind(&self) -> LocatorKind {
        match self {
            Locator::Anchor(_) => LocatorKind::Anchor,
            Locator::NelderMead(_) => LocatorKind::NelderMead,
            Locator::GaussNewton(_) => LocatorKind::GaussNewton,
            Locator::NadarayaWatson(_) => LocatorKind::NadarayaWatson,
            Locator::Mle(_) => LocatorKind::Mle,
            Locator::MultiFloor(_) => LocatorKind::MultiFloor,
            Locator::NearestNode(_) => LocatorKind::NearestNode,
        }
    }

    /// Floor for floor-bound locators.
    pub fn floor_id(&self) -> Option<&str> {
        match self {
            Locator::NelderMead(l) => Some(&l.floor_id),
            Locator::GaussNewton(l) => Some(&l.floor_id),
            Locator::NadarayaWatson(l) => Some(&l.floor_id),
            Locator::Mle(l) => Some(&l.floor_id),
            _ => None,
        }
    }

    /// Scenario identity for this locator.
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey {
            kind: self.kind(),
            floor: self.floor_id().map(str::to_string),
        }
    }
}

impl Locate for Locator {
    fn locate(&self, scenario: &mut ScenarioState, ctx: &LocateContext<'_>) -> bool {
        match self {
            Locator::Anchor(l) => l.locate(scenario, ctx),
            Locator::NelderMead(l) => l.locate(scenario, ctx),
            Locator::GaussNewton(l) => l.locate(scenario, ctx),
            Locator::NadarayaWatson(l) => l.locate(scenario, ctx),
            Locator::Mle(l) => l.locate(scenario, ctx),
            Locator::MultiFloor(l) => l.locate(scenario, ctx),
            Locator::NearestNode(l) => l.locate(scenario, ctx),
        }
    }
}

fn selected_floors<'a>(building: &'a Building, ids: Option<&'a [String]>) -> Vec<&'a str> {
    match ids {
        Some(ids) => ids
            .iter()
            .filter(|id| building.floor(id).is_some())
            .map(String::as_str)
            .collect(),
        None => building.floors().iter().map(|f| f.id.as_str()).collect(),
    }
}

/// Locators for a device.
///
/// An anchored device gets only the anchor. Otherwise one scenario is
/// created per enabled floor-bound locator and floor, followed by the
/// building-wide locators. With nothing enabled, Nelder-Mead runs on
/// every floor.
pub fn build_locators(config: &EngineConfig, building: &Building, anchor: Option<Point3D>) -> Vec<Locator> {
    if let Some(location) = anchor {
        return vec![Locator::Anchor(AnchorLocator::new(location))];
    }

    let section = &config.locators;
    let mut locators = Vec::new();

    if !section.any_enabled() {
        log::warn!("No locators enabled, using default Nelder-Mead");
        let weighting = Weighting::from_config(&section.nelder_mead.weighting);
        for floor in building.floors() {
            locators.push(Locator::NelderMead(NelderMead::new(
                &floor.id,
                weighting,
                section.nelder_mead.estimate_scale,
            )));
        }
        return locators;
    }

    if section.nelder_mead.enabled {
        let weighting = Weighting::from_config(&section.nelder_mead.weighting);
        for floor in selected_floors(building, section.nelder_mead.floors.as_deref()) {
            locators.push(Locator::NelderMead(NelderMead::new(
                floor,
                weighting,
                section.nelder_mead.estimate_scale,
            )));
        }
    }

    if section.gauss_newton.enabled {
        for floor in selected_floors(building, section.gauss_newton.floors.as_deref()) {
            locators.push(Locator::GaussNewton(GaussNewton::new(floor)));
        }
    }

    if section.nadaraya_watson.enabled {
        let nw = &section.nadaraya_watson;
        let kernel = Kernel::from_name(&nw.kernel, &nw.kernel_props());
        for floor in selected_floors(building, nw.floors.as_deref()) {
            locators.push(Locator::NadarayaWatson(NadarayaWatson::new(
                floor,
                kernel,
                nw.iterations,
            )));
        }
    }

    if section.mle.enabled {
        let mle = &section.mle;
        let weighting = Weighting::from_config(&mle.weighting);
        for floor in selected_floors(building, mle.floors.as_deref()) {
            locators.push(Locator::Mle(Mle::new(floor, weighting, mle.default_variance)));
        }
    }

    if section.multi_floor.enabled {
        let weighting = Weighting::from_config(&section.multi_floor.weighting);
        locators.push(Locator::MultiFloor(MultiFloor::new(weighting)));
    }

    if section.nearest_node.enabled {
        locators.push(Locator::NearestNode(NearestNode::new(
            section.nearest_node.max_distance,
        )));
    }

    locators
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> EngineConfig {
        EngineConfig::from_yaml(yaml).unwrap()
    }

    const FLOORS: &str = r#"
floors:
  - id: ground
    bounds: [[0, 0, 0], [10, 10, 3]]
  - id: first
    bounds: [[0, 0, 3], [10, 10, 6]]
"#;

    #[test]
    fn test_anchor_only() {
        let cfg = config(FLOORS);
        let building = Building::from_config(&cfg);
        let locators = build_locators(&cfg, &building, Some(Point3D::new(1.0, 1.0, 1.0)));
        assert_eq!(locators.len(), 1);
        assert_eq!(locators[0].kind(), LocatorKind::Anchor);
    }

    #[test]
    fn test_default_nelder_mead_per_floor() {
        let cfg = config(FLOORS);
        let building = Building::from_config(&cfg);
        let locators = build_locators(&cfg, &building, None);
        let keys: Vec<String> = locators.iter().map(|l| l.key().to_string()).collect();
        assert_eq!(keys, vec!["nelder_mead@ground", "nelder_mead@first"]);
    }

    #[test]
    fn test_enabled_locators_and_floor_filter() {
        let yaml = format!(
            "{FLOORS}locators:\n  gauss_newton:\n    enabled: true\n    floors: [first, missing]\n  nadaraya_watson:\n    enabled: true\n  mle:\n    enabled: true\n    floors: [ground]\n  multi_floor:\n    enabled: true\n  nearest_node:\n    enabled: true\n"
        );
        let cfg = config(&yaml);
        let building = Building::from_config(&cfg);
        let keys: Vec<String> = build_locators(&cfg, &building, None)
            .iter()
            .map(|l| l.key().to_string())
            .collect();
        assert_eq!(
            keys,
            vec![
                "gauss_newton@first",
                "nadaraya_watson@ground",
                "nadaraya_watson@first",
                "mle@ground",
                "multi_floor",
                "nearest_node",
            ]
        );
    }
}
