//! Locator selection and tuning.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Rank weighting selection, e.g. `{ algorithm: exponential, props: { lambda: 3 } }`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeightingConfig {
    /// One of `equal`, `linear`, `exponential`, `gaussian`
    #[serde(default = "defaults::weighting_algorithm")]
    pub algorithm: String,

    /// Algorithm parameters (`lambda`, `sigma`)
    #[serde(default)]
    pub props: HashMap<String, f64>,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            algorithm: defaults::weighting_algorithm(),
            props: HashMap::new(),
        }
    }
}

/// Nelder-Mead locator settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NelderMeadSection {
    /// Create one scenario per floor
    #[serde(default)]
    pub enabled: bool,

    /// Floors to run on (all floors when absent)
    #[serde(default)]
    pub floors: Option<Vec<String>>,

    /// Estimate a global range scale as a fourth variable
    #[serde(default = "defaults::estimate_scale")]
    pub estimate_scale: bool,

    /// Rank weighting of links
    #[serde(default)]
    pub weighting: WeightingConfig,
}

impl Default for NelderMeadSection {
    fn default() -> Self {
        Self {
            enabled: false,
            floors: None,
            estimate_scale: defaults::estimate_scale(),
            weighting: WeightingConfig::default(),
        }
    }
}

/// Gauss-Newton locator settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct GaussNewtonSection {
    /// Create one scenario per floor
    #[serde(default)]
    pub enabled: bool,

    /// Floors to run on (all floors when absent)
    #[serde(default)]
    pub floors: Option<Vec<String>>,
}

/// Nadaraya-Watson locator settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NadarayaWatsonSection {
    /// Create one scenario per floor
    #[serde(default)]
    pub enabled: bool,

    /// Floors to run on (all floors when absent)
    #[serde(default)]
    pub floors: Option<Vec<String>>,

    /// One of `gaussian`, `epanechnikov`, `inverse_square`
    #[serde(default = "defaults::kernel")]
    pub kernel: String,

    /// Kernel bandwidth
    #[serde(default)]
    pub bandwidth: Option<f64>,

    /// Inverse-square epsilon
    #[serde(default)]
    pub epsilon: Option<f64>,

    /// Scale refit rounds
    #[serde(default = "defaults::nadaraya_iterations")]
    pub iterations: usize,
}

impl Default for NadarayaWatsonSection {
    fn default() -> Self {
        Self {
            enabled: false,
            floors: None,
            kernel: defaults::kernel(),
            bandwidth: None,
            epsilon: None,
            iterations: defaults::nadaraya_iterations(),
        }
    }
}

impl NadarayaWatsonSection {
    /// Kernel parameters as a props map.
    pub fn kernel_props(&self) -> HashMap<String, f64> {
        let mut props = HashMap::new();
        if let Some(bw) = self.bandwidth {
            props.insert("bandwidth".to_string(), bw);
        }
        if let Some(eps) = self.epsilon {
            props.insert("epsilon".to_string(), eps);
        }
        props
    }
}

/// Maximum-likelihood locator settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MleSection {
    /// Create one scenario per floor
    #[serde(default)]
    pub enabled: bool,

    /// Floors to run on (all floors when absent)
    #[serde(default)]
    pub floors: Option<Vec<String>>,

    /// Distance variance for links that report none (m²)
    #[serde(default = "defaults::mle_variance")]
    pub default_variance: f64,

    /// Rank weighting of links
    #[serde(default)]
    pub weighting: WeightingConfig,
}

impl Default for MleSection {
    fn default() -> Self {
        Self {
            enabled: false,
            floors: None,
            default_variance: defaults::mle_variance(),
            weighting: WeightingConfig::default(),
        }
    }
}

/// Multi-floor Nelder-Mead settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct MultiFloorSection {
    /// Create a single building-wide scenario
    #[serde(default)]
    pub enabled: bool,

    /// Rank weighting of links
    #[serde(default)]
    pub weighting: WeightingConfig,
}

/// Nearest-node fallback settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct NearestNodeSection {
    /// Create a nearest-node scenario
    #[serde(default)]
    pub enabled: bool,

    /// Ignore links farther than this (meters)
    #[serde(default)]
    pub max_distance: Option<f64>,
}

/// All locator settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct LocatorsSection {
    /// Nelder-Mead simplex multilateration
    #[serde(default)]
    pub nelder_mead: NelderMeadSection,

    /// Gauss-Newton multilateration
    #[serde(default)]
    pub gauss_newton: GaussNewtonSection,

    /// Kernel-weighted regression
    #[serde(default)]
    pub nadaraya_watson: NadarayaWatsonSection,

    /// Variance-weighted maximum likelihood
    #[serde(default)]
    pub mle: MleSection,

    /// Building-wide Nelder-Mead
    #[serde(default)]
    pub multi_floor: MultiFloorSection,

    /// Nearest-node fallback
    #[serde(default)]
    pub nearest_node: NearestNodeSection,
}

impl LocatorsSection {
    /// True if at least one locator is enabled.
    pub fn any_enabled(&self) -> bool {
        self.nelder_mead.enabled
            || self.gauss_newton.enabled
            || self.nadaraya_watson.enabled
            || self.mle.enabled
            || self.multi_floor.enabled
            || self.nearest_node.enabled
    }
}
