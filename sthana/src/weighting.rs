//! Rank weightings and distance kernels.
//!
//! Locators down-weight lower-quality links with these. Rank weightings
//! map a link's position in the distance-sorted list to a weight, kernels
//! map a residual or scaled distance to a weight.
//!
//! # Example
//!
//! ```
//! use sthana::weighting::{Kernel, Weighting};
//!
//! let w = Weighting::Exponential { lambda: 3.0 };
//! assert!(w.weight(0, 4) > w.weight(3, 4));
//!
//! let k = Kernel::InverseSquare { epsilon: 1e-6 };
//! assert!(k.evaluate(1.0) > k.evaluate(2.0));
//! ```

use std::collections::HashMap;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::WeightingConfig;

const DEFAULT_LAMBDA: f64 = 3.0;
const DEFAULT_SIGMA: f64 = 0.3;
const DEFAULT_GAUSSIAN_BANDWIDTH: f64 = 0.5;
const DEFAULT_EPANECHNIKOV_BANDWIDTH: f64 = 1.0;
const DEFAULT_EPSILON: f64 = 1e-6;

fn prop(props: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    props
        .get(key)
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(default)
}

/// Rank-based link weighting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Weighting {
    /// Every link counts the same: `1/total`
    Equal,

    /// Linear falloff: `(total - rank)/total`
    Linear,

    /// Power falloff: `((total - rank)/total)^lambda`
    Exponential {
        /// Falloff exponent (3 is cubic)
        lambda: f64,
    },

    /// Gaussian falloff over the normalized rank `rank/(total - 1)`
    Gaussian {
        /// Standard deviation in normalized rank units
        sigma: f64,
    },
}

impl Default for Weighting {
    fn default() -> Self {
        Weighting::Exponential {
            lambda: DEFAULT_LAMBDA,
        }
    }
}

impl Weighting {
    /// Resolve a weighting by name. Unknown names fall back to Gaussian.
    pub fn from_name(name: &str, props: &HashMap<String, f64>) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "equal" => Weighting::Equal,
            "linear" => Weighting::Linear,
            "exponential" => Weighting::Exponential {
                lambda: prop(props, "lambda", DEFAULT_LAMBDA),
            },
            "gaussian" => Weighting::Gaussian {
                sigma: prop(props, "sigma", DEFAULT_SIGMA),
            },
            other => {
                log::warn!("Unknown weighting '{}', using gaussian", other);
                Weighting::Gaussian {
                    sigma: prop(props, "sigma", DEFAULT_SIGMA),
                }
            }
        }
    }

    /// Resolve from a config section.
    pub fn from_config(config: &WeightingConfig) -> Self {
        Self::from_name(&config.algorithm, &config.props)
    }

    /// Weight of the link at `rank` (0 = nearest) out of `total` links.
    pub fn weight(&self, rank: usize, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        let i = rank as f64;

        match self {
            Weighting::Equal => 1.0 / n,
            Weighting::Linear => (n - i) / n,
            Weighting::Exponential { lambda } => ((n - i) / n).powf(*lambda),
            Weighting::Gaussian { sigma } => {
                let x = if total > 1 { i / (n - 1.0) } else { 0.0 };
                (-(x * x) / (2.0 * sigma * sigma)).exp() / (2.0 * PI * sigma).sqrt()
            }
        }
    }

    /// Get the weighting name for logging
    pub fn name(&self) -> &str {
        match self {
            Weighting::Equal => "equal",
            Weighting::Linear => "linear",
            Weighting::Exponential { .. } => "exponential",
            Weighting::Gaussian { .. } => "gaussian",
        }
    }
}

/// Distance kernel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Kernel {
    /// `exp(-u²/2) / (bw·√2π)` with `u = d/bw`
    Gaussian {
        /// Kernel bandwidth
        bandwidth: f64,
    },

    /// `0.75(1 - u²)/bw` inside the unit interval, zero outside
    Epanechnikov {
        /// Kernel bandwidth
        bandwidth: f64,
    },

    /// `1/(d² + ε)`
    InverseSquare {
        /// Floor that keeps zero distances finite
        epsilon: f64,
    },
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::InverseSquare {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl Kernel {
    /// Resolve a kernel by name. Unknown names fall back to Gaussian.
    pub fn from_name(name: &str, props: &HashMap<String, f64>) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "gaussian" => Kernel::Gaussian {
                bandwidth: prop(props, "bandwidth", DEFAULT_GAUSSIAN_BANDWIDTH),
            },
            "epanechnikov" => Kernel::Epanechnikov {
                bandwidth: prop(props, "bandwidth", DEFAULT_EPANECHNIKOV_BANDWIDTH),
            },
            "inverse_square" | "inversesquare" | "inverse-square" => Kernel::InverseSquare {
                epsilon: prop(props, "epsilon", DEFAULT_EPSILON),
            },
            other => {
                log::warn!("Unknown kernel '{}', using gaussian", other);
                Kernel::Gaussian {
                    bandwidth: prop(props, "bandwidth", DEFAULT_GAUSSIAN_BANDWIDTH),
                }
            }
        }
    }

    /// Kernel weight at `distance`.
    pub fn evaluate(&self, distance: f64) -> f64 {
        match self {
            Kernel::Gaussian { bandwidth } => {
                let u = distance / bandwidth;
                (-0.5 * u * u).exp() / (bandwidth * (2.0 * PI).sqrt())
            }
            Kernel::Epanechnikov { bandwidth } => {
                let u = distance / bandwidth;
                if u.abs() >= 1.0 {
                    0.0
                } else {
                    0.75 * (1.0 - u * u) / bandwidth
                }
            }
            Kernel::InverseSquare { epsilon } => 1.0 / (distance * distance + epsilon),
        }
    }

    /// Get the kernel name for logging
    pub fn name(&self) -> &str {
        match self {
            Kernel::Gaussian { .. } => "gaussian",
            Kernel::Epanechnikov { .. } => "epanechnikov",
            Kernel::InverseSquare { .. } => "inverse_square",
        }
    }
}
