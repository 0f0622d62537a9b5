//! # State estimator
//!
//! Wheel odometry for the omni drive. Each tick the raw encoder counts are
//! converted to wheel angles, the per-wheel deltas since the previous tick
//! are mapped onto the two rotated omni axes and a yaw increment, and the
//! result is integrated into the global pose. The mast height is integrated
//! from its own drum rotation.
//!
//! The estimator is deterministic given its inputs and the previous state,
//! and touches nothing outside the `CoreState` passed to it, so it can be
//! unit tested without any of the surrounding control machinery.
//!
//! Wheel pairing convention: the two `x_r_wheels` drive the +x_r omni axis
//! and the two `y_r_wheels` drive +y_r. The omni axes are rotated from the
//! global frame by the configured mount angle (45 degrees on the reference
//! geometry) plus the current yaw.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Rotation2, Vector2};
use serde::Deserialize;

// Internal
use crate::data_store::CoreState;
use util::maths::wrap_2pi;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the state estimator.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    // ---- GEOMETRY ----
    /// Radius of the drive wheels.
    ///
    /// Units: meters
    pub wheel_radius_xy_m: f64,

    /// Effective radius of the mast drum, converting drum rotation to mast
    /// travel.
    ///
    /// Units: meters
    pub drum_radius_z_m: f64,

    /// Half-distance between opposing wheel pairs, the differential-drive
    /// moment arm.
    ///
    /// Units: meters
    pub track_width_m: f64,

    /// Rotation of the omni axes relative to the global frame.
    ///
    /// Units: radians
    pub mount_angle_rad: f64,

    // ---- ENCODERS ----
    /// Gearbox ratio between drive motor and wheel.
    pub gearbox_xy: f64,

    /// Gearbox ratio between mast motor and drum.
    pub gearbox_z: f64,

    /// Encoder counts per motor revolution.
    pub counts_per_rev: f64,

    /// Encoder polarity per channel, +1 or -1.
    pub encoder_polarity: Vec<f64>,

    // ---- WHEEL ASSIGNMENT ----
    /// Encoder channels of the wheel pair driving +x_r.
    pub x_r_wheels: [usize; 2],

    /// Encoder channels of the wheel pair driving +y_r.
    pub y_r_wheels: [usize; 2],

    /// Encoder channel of the mast drum.
    pub mast_wheel: usize,
}

/// The state estimator.
pub struct StateEstimator {
    params: Params,

    /// Wheel angles at the previous tick, radians.
    prev_angles_rad: Vec<f64>,

    /// Per-wheel angle deltas, sized at init so the tick never allocates.
    deltas_rad: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised during estimation.
#[derive(Debug, thiserror::Error)]
pub enum OdomError {
    #[error("Expected {expected} encoder counts, got {found}")]
    WrongNumberOfCounts { expected: usize, found: usize },

    #[error("Wheel assignment references channel {0}, which has no polarity entry")]
    BadWheelAssignment(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl StateEstimator {
    /// Build the estimator, validating the wheel assignment against the
    /// polarity table.
    pub fn new(params: Params) -> Result<Self, OdomError> {
        let num_wheels = params.encoder_polarity.len();

        for &ch in params
            .x_r_wheels
            .iter()
            .chain(params.y_r_wheels.iter())
            .chain(std::iter::once(&params.mast_wheel))
        {
            if ch >= num_wheels {
                return Err(OdomError::BadWheelAssignment(ch));
            }
        }

        Ok(Self {
            prev_angles_rad: vec![0.0; num_wheels],
            deltas_rad: vec![0.0; num_wheels],
            params,
        })
    }

    pub fn num_wheels(&self) -> usize {
        self.prev_angles_rad.len()
    }

    /// Forget the previous wheel angles. Called when the encoders are zeroed
    /// on arming so the first tick of a run sees zero deltas.
    pub fn reset(&mut self) {
        for a in self.prev_angles_rad.iter_mut() {
            *a = 0.0;
        }
    }

    /// Convert a raw encoder count to a wheel angle in radians.
    pub fn counts_to_angle(&self, channel: usize, counts: i64) -> f64 {
        let gearbox = if channel == self.params.mast_wheel {
            self.params.gearbox_z
        } else {
            self.params.gearbox_xy
        };

        (counts as f64) * 2.0 * std::f64::consts::PI
            / (self.params.encoder_polarity[channel] * gearbox * self.params.counts_per_rev)
    }

    /// Update the pose fields of `core` from an encoder snapshot.
    pub fn estimate(&mut self, counts: &[i64], core: &mut CoreState) -> Result<(), OdomError> {
        if counts.len() != self.prev_angles_rad.len() {
            return Err(OdomError::WrongNumberOfCounts {
                expected: self.prev_angles_rad.len(),
                found: counts.len(),
            });
        }

        // Wheel angles and deltas since the previous tick
        for (ch, &c) in counts.iter().enumerate() {
            let angle = self.counts_to_angle(ch, c);
            self.deltas_rad[ch] = angle - self.prev_angles_rad[ch];
            self.prev_angles_rad[ch] = angle;
            core.wheel_angles_rad[ch] = angle;
        }

        let p = &self.params;
        let deltas = &self.deltas_rad;

        let d_x0 = deltas[p.x_r_wheels[0]];
        let d_x1 = deltas[p.x_r_wheels[1]];
        let d_y0 = deltas[p.y_r_wheels[0]];
        let d_y1 = deltas[p.y_r_wheels[1]];

        // Displacement along the omni axes, half-sum of each opposing pair
        let d_omni = Vector2::new(
            0.5 * p.wheel_radius_xy_m * (d_x0 + d_x1),
            0.5 * p.wheel_radius_xy_m * (d_y0 + d_y1),
        );

        // Yaw from the differential terms of both pairs
        core.theta_rad += (2.0 * p.wheel_radius_xy_m / (4.0 * p.track_width_m))
            * ((d_x1 - d_x0) + (d_y0 - d_y1));

        core.x_r_m += d_omni[0];
        core.y_r_m += d_omni[1];

        // Rotate the omni-frame displacement into the global frame
        let d_global = Rotation2::new(p.mount_angle_rad + core.theta_rad) * d_omni;
        core.x_m += d_global[0];
        core.y_m += d_global[1];

        // Mast height from its own drum
        core.z_m += p.drum_radius_z_m * deltas[p.mast_wheel];

        // Correct for full rotations
        core.theta_rad = wrap_2pi(core.theta_rad);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const TAU: f64 = std::f64::consts::TAU;

    /// Reference geometry: four drive wheels + mast drum, omni axes at 45
    /// degrees, unity gearing so counts map straight to angle.
    fn test_params() -> Params {
        Params {
            wheel_radius_xy_m: 0.05,
            drum_radius_z_m: 0.01,
            track_width_m: 0.15,
            mount_angle_rad: std::f64::consts::FRAC_PI_4,
            gearbox_xy: 1.0,
            gearbox_z: 1.0,
            counts_per_rev: 1000.0,
            encoder_polarity: vec![1.0, 1.0, 1.0, 1.0, 1.0],
            x_r_wheels: [0, 3],
            y_r_wheels: [1, 2],
            mast_wheel: 4,
        }
    }

    fn fresh_state() -> CoreState {
        CoreState::new(5, 3)
    }

    #[test]
    fn test_counts_to_angle() {
        let est = StateEstimator::new(test_params()).unwrap();
        // One full motor revolution
        assert!((est.counts_to_angle(0, 1000) - TAU).abs() < 1e-12);
        assert!((est.counts_to_angle(0, -500) + TAU / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_counts_to_angle_respects_polarity_and_gearing() {
        let mut params = test_params();
        params.encoder_polarity[1] = -1.0;
        params.gearbox_xy = 2.0;
        let est = StateEstimator::new(params).unwrap();

        assert!((est.counts_to_angle(1, 1000) + TAU / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_bad_wheel_assignment_rejected() {
        let mut params = test_params();
        params.mast_wheel = 7;
        assert!(matches!(
            StateEstimator::new(params),
            Err(OdomError::BadWheelAssignment(7))
        ));
    }

    #[test]
    fn test_pure_translation() {
        let mut est = StateEstimator::new(test_params()).unwrap();
        let mut core = fresh_state();

        // Both x_r wheels forward one revolution, no yaw contribution
        est.estimate(&[1000, 0, 0, 1000, 0], &mut core).unwrap();

        let expected_xr = 0.05 * TAU;
        assert!((core.x_r_m - expected_xr).abs() < 1e-12);
        assert!(core.y_r_m.abs() < 1e-12);
        assert!(core.theta_rad.abs() < 1e-12);

        // Global displacement is the omni displacement rotated by the mount
        // angle
        let a = std::f64::consts::FRAC_PI_4;
        assert!((core.x_m - expected_xr * a.cos()).abs() < 1e-12);
        assert!((core.y_m - expected_xr * a.sin()).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_returns_to_start() {
        let mut est = StateEstimator::new(test_params()).unwrap();
        let mut core = fresh_state();

        // A mixed sequence of translations and rotations. Each entry is a
        // per-wheel count delta.
        let deltas: Vec<[i64; 5]> = vec![
            [500, 0, 0, 500, 0],      // +x_r
            [-200, -200, 200, 200, 0], // pure yaw
            [0, 300, 300, 0, 0],      // +y_r
            [100, -100, 100, -100, 0], // pure yaw, other sense
            [0, 0, 0, 0, 400],        // mast up
        ];

        // Forward replay
        let mut counts = [0i64; 5];
        for d in deltas.iter() {
            for (c, dd) in counts.iter_mut().zip(d.iter()) {
                *c += dd;
            }
            est.estimate(&counts, &mut core).unwrap();
        }

        // Reverse replay with negated deltas
        for d in deltas.iter().rev() {
            for (c, dd) in counts.iter_mut().zip(d.iter()) {
                *c -= dd;
            }
            est.estimate(&counts, &mut core).unwrap();
        }

        assert!(core.x_m.abs() < 1e-9, "x_m = {}", core.x_m);
        assert!(core.y_m.abs() < 1e-9, "y_m = {}", core.y_m);
        assert!(core.x_r_m.abs() < 1e-9);
        assert!(core.y_r_m.abs() < 1e-9);
        assert!(core.z_m.abs() < 1e-9);
        assert!(core.theta_rad.abs() < 1e-9);
    }

    #[test]
    fn test_yaw_wrap() {
        let mut est = StateEstimator::new(test_params()).unwrap();
        let mut core = fresh_state();

        let p = test_params();
        // Yaw per tick for a symmetric differential twist of d radians on
        // every wheel: (2r / 4w) * 4d
        let yaw_per_rad = 2.0 * p.wheel_radius_xy_m / (4.0 * p.track_width_m) * 4.0;

        // Counts per tick chosen to give a chunky yaw increment
        let d_counts = 300i64;
        let d_angle = (d_counts as f64) / 1000.0 * TAU;
        let yaw_per_tick = yaw_per_rad * d_angle;

        // Spin far enough to exceed a full turn
        let n_ticks = (TAU / yaw_per_tick) as usize + 10;
        let mut counts = [0i64; 5];
        for _ in 0..n_ticks {
            counts[0] -= d_counts;
            counts[3] += d_counts;
            counts[1] += d_counts;
            counts[2] -= d_counts;
            est.estimate(&counts, &mut core).unwrap();
        }

        let true_sum = yaw_per_tick * n_ticks as f64;
        assert!(true_sum > TAU);
        assert!(core.theta_rad > -TAU && core.theta_rad < TAU);
        // Wrapped value differs from the true sum by a whole number of turns
        let diff = (true_sum - core.theta_rad) / TAU;
        assert!((diff - diff.round()).abs() < 1e-9);
    }
}
