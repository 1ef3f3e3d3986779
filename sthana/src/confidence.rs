//! Centralized confidence scoring.
//!
//! Combines node coverage, residual error and the correlation between
//! mapped and measured ranges into a single 0-100 score. A score of 0 is
//! reserved for "inapplicable"; once at least two links are used the score
//! never drops below [`MIN_CONFIDENCE`].

/// Lowest score the formula yields for an applicable estimate.
pub const MIN_CONFIDENCE: i32 = 5;

/// Highest score.
pub const MAX_CONFIDENCE: i32 = 100;

/// Residual error (meters) at which the error score bottoms out.
const ERROR_CEILING: f64 = 10.0;

const ERROR_WEIGHT: f64 = 0.5;
const CORRELATION_WEIGHT: f64 = 0.5;

/// Score an estimate.
///
/// # Arguments
/// * `error` - RMS range residual, `None` if unknown
/// * `correlation` - Pearson r of mapped vs measured distances
/// * `used` - live links used by the estimate
/// * `possible` - nodes able to hear the device on this floor
pub fn confidence(error: Option<f64>, correlation: Option<f64>, used: usize, possible: usize) -> i32 {
    if used < 2 {
        return 0;
    }

    let coverage = if possible == 0 {
        1.0
    } else {
        (used as f64 / possible as f64).min(1.0)
    };

    let error_score = match error {
        Some(e) if e.is_finite() => 1.0 - (e / ERROR_CEILING).clamp(0.0, 1.0),
        _ => 0.0,
    };

    let correlation_score = match correlation {
        Some(r) if r.is_finite() => r.clamp(0.0, 1.0),
        _ => 0.0,
    };

    let score = coverage * 50.0
        + (ERROR_WEIGHT * error_score + CORRELATION_WEIGHT * correlation_score) * 50.0;

    (score.round() as i32).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}
