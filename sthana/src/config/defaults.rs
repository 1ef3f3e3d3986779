//! Default value functions for serde deserialization.

pub fn timeout() -> f64 {
    30.0
}

pub fn enabled() -> bool {
    true
}

pub fn stationary() -> bool {
    true
}

pub fn weighting_algorithm() -> String {
    "exponential".to_string()
}

pub fn kernel() -> String {
    "inverse_square".to_string()
}

pub fn nadaraya_iterations() -> usize {
    2
}

pub fn estimate_scale() -> bool {
    true
}

pub fn mle_variance() -> f64 {
    1.0
}

pub fn interval_secs() -> u64 {
    60
}

pub fn max_snapshots() -> usize {
    60
}

pub fn keep_snapshot_mins() -> f64 {
    5.0
}

pub fn absorption_min() -> f64 {
    2.0
}

pub fn absorption_max() -> f64 {
    4.0
}

pub fn tx_ref_rssi_min() -> f64 {
    -70.0
}

pub fn tx_ref_rssi_max() -> f64 {
    -50.0
}

pub fn rx_adj_rssi_min() -> f64 {
    -20.0
}

pub fn rx_adj_rssi_max() -> f64 {
    20.0
}

pub fn process_noise() -> f64 {
    0.01
}

pub fn measurement_noise() -> f64 {
    0.1
}

pub fn max_velocity() -> f64 {
    0.5
}

pub fn poll_interval_ms() -> u64 {
    500
}

pub fn idle_recheck() -> bool {
    true
}
