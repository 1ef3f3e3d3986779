//! Constant-velocity Kalman smoothing of reported positions.
//!
//! State is `[x, y, z, vx, vy, vz]`. Each accepted estimate is blended
//! with the prediction from the previous state; implausible jumps (faster
//! than `max_velocity`) get inflated measurement noise and the velocity
//! estimate is clamped after both predict and update.

use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Matrix3x6, Matrix6, Vector3, Vector6};

use crate::config::FilteringSection;
use crate::core::Point3D;

/// Elapsed time assumed when the previous update time is unknown (s).
const DEFAULT_DT: f64 = 0.1;

/// Smallest elapsed time used for prediction (s).
const MIN_DT: f64 = 1e-3;

/// Per-device Kalman smoother.
#[derive(Clone, Debug)]
pub struct KalmanFilter {
    config: FilteringSection,
    state: Option<FilterState>,
    location: Point3D,
}

#[derive(Clone, Debug)]
struct FilterState {
    x: Vector6<f64>,
    p: Matrix6<f64>,
    last_update: Option<DateTime<Utc>>,
}

impl KalmanFilter {
    /// Create an uninitialised filter.
    pub fn new(config: FilteringSection) -> Self {
        Self {
            config,
            state: None,
            location: Point3D::ORIGIN,
        }
    }

    /// True once the filter has seen a measurement.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Latest filtered location.
    pub fn location(&self) -> Point3D {
        self.location
    }

    /// Estimated velocity (m/s).
    pub fn velocity(&self) -> Point3D {
        match &self.state {
            Some(s) => Point3D::new(s.x[3], s.x[4], s.x[5]),
            None => Point3D::ORIGIN,
        }
    }

    /// Blend a new estimate into the filter using the current time.
    pub fn update(&mut self, measured: Point3D, confidence: i32) -> Point3D {
        self.update_at(measured, confidence, Utc::now())
    }

    /// Blend a new estimate into the filter at `now`.
    ///
    /// Higher confidence lowers the process noise so the filter follows the
    /// measurement more closely. The first call initialises the filter to
    /// the measurement unchanged.
    pub fn update_at(&mut self, measured: Point3D, confidence: i32, now: DateTime<Utc>) -> Point3D {
        let Some(state) = self.state.as_mut() else {
            self.reset_at(measured, now);
            return measured;
        };

        let dt = elapsed(state.last_update, now);
        state.last_update = Some(now);

        let mut r = self.config.measurement_noise;
        let jump = self.location.distance_to(&measured);
        let max_jump = self.config.max_velocity * dt;
        if jump > max_jump && max_jump > 0.0 {
            let excess = jump / max_jump;
            r *= excess * excess;
        }

        let q = self.config.process_noise * (100.0 / f64::from(confidence.max(1)));
        let f = transition(dt);

        // Predict
        state.x = f * state.x;
        state.p = f * state.p * f.transpose() + process_noise(dt, q);
        clamp_velocity(&mut state.x, self.config.max_velocity);

        // Update
        let h = observation();
        let z = measured.to_vector();
        let innovation: Vector3<f64> = z - h * state.x;
        let s: Matrix3<f64> = h * state.p * h.transpose() + Matrix3::identity() * r;
        let Some(s_inv) = s.try_inverse() else {
            log::warn!("Kalman innovation covariance is singular, resetting");
            self.reset_at(measured, now);
            return measured;
        };
        let k = state.p * h.transpose() * s_inv;
        state.x += k * innovation;
        state.p = (Matrix6::identity() - k * h) * state.p;
        clamp_velocity(&mut state.x, self.config.max_velocity);

        self.location = Point3D::new(state.x[0], state.x[1], state.x[2]);
        self.location
    }

    /// Re-initialise the filter at a location.
    pub fn reset(&mut self, location: Point3D) {
        self.reset_at(location, Utc::now());
    }

    /// Re-initialise the filter at a location and time.
    pub fn reset_at(&mut self, location: Point3D, now: DateTime<Utc>) {
        let mut x = Vector6::zeros();
        x[0] = location.x;
        x[1] = location.y;
        x[2] = location.z;
        self.state = Some(FilterState {
            x,
            p: Matrix6::identity(),
            last_update: Some(now),
        });
        self.location = location;
    }

    /// Predicted location and position covariance at `now`, without
    /// mutating the filter.
    pub fn prediction(&self, now: DateTime<Utc>) -> (Point3D, Matrix3<f64>) {
        let Some(state) = &self.state else {
            return (self.location, Matrix3::identity());
        };

        let dt = elapsed(state.last_update, now);
        let f = transition(dt);
        let x = f * state.x;
        let p = f * state.p * f.transpose() + process_noise(dt, self.config.process_noise);

        (
            Point3D::new(x[0], x[1], x[2]),
            p.fixed_view::<3, 3>(0, 0).into_owned(),
        )
    }
}

fn elapsed(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last {
        Some(t) => ((now - t).num_microseconds().unwrap_or(0) as f64 / 1e6).max(MIN_DT),
        None => DEFAULT_DT,
    }
}

fn transition(dt: f64) -> Matrix6<f64> {
    let mut f = Matrix6::identity();
    f[(0, 3)] = dt;
    f[(1, 4)] = dt;
    f[(2, 5)] = dt;
    f
}

fn process_noise(dt: f64, q: f64) -> Matrix6<f64> {
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    let dt4 = dt3 * dt;

    let mut qm = Matrix6::zeros();
    for i in 0..3 {
        qm[(i, i)] = q * dt4 / 4.0;
        qm[(i, i + 3)] = q * dt3 / 2.0;
        qm[(i + 3, i)] = q * dt3 / 2.0;
        qm[(i + 3, i + 3)] = q * dt2;
    }
    qm
}

fn observation() -> Matrix3x6<f64> {
    let mut h = Matrix3x6::zeros();
    h[(0, 0)] = 1.0;
    h[(1, 1)] = 1.0;
    h[(2, 2)] = 1.0;
    h
}

fn clamp_velocity(x: &mut Vector6<f64>, max_velocity: f64) {
    let speed = (x[3] * x[3] + x[4] * x[4] + x[5] * x[5]).sqrt();
    if speed > max_velocity && speed > 0.0 {
        let scale = max_velocity / speed;
        x[3] *= scale;
        x[4] *= scale;
        x[5] *= scale;
    }
}
