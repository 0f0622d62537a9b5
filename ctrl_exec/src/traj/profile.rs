//! Trapezoidal velocity profile
//!
//! A segment of duration `dur` covering distance `d` at acceleration `a` is
//! profiled as a symmetric trapezoid: ramp up for `t_a`, plateau, ramp down
//! for `t_a`. Requiring the area under the profile to equal `d` gives
//! `a * t_a * (dur - t_a) = d`, whose smaller root is
//! `t_a = (dur - sqrt(dur^2 - 4 d / a)) / 2`.
//!
//! When the discriminant is not positive the distance cannot be covered at
//! that acceleration within the segment. The profile then degrades to a
//! triangle (`t_a = dur / 2`): the velocity stays finite and continuous and
//! the setpoint simply advances less far than the waypoint asked, leaving
//! the shortfall to show up as steady tracking error rather than as a NaN in
//! the control law. Feasibility is checked when the table is loaded so the
//! degradation is warned about once, not every tick.

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Acceleration/deceleration time for one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelTime {
    /// Ramp duration, seconds.
    pub t_a_s: f64,

    /// True if the distance was infeasible and the ramp was clamped to half
    /// the segment.
    pub clamped: bool,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Solve for the ramp time of a symmetric trapezoid.
///
/// `distance` is a magnitude; `duration_s` and `accel` must be positive.
pub fn accel_time(duration_s: f64, distance: f64, accel: f64) -> AccelTime {
    if distance <= 0.0 {
        return AccelTime {
            t_a_s: 0.0,
            clamped: false,
        };
    }

    let disc = duration_s * duration_s - 4.0 * distance / accel;

    if disc <= 0.0 {
        AccelTime {
            t_a_s: duration_s / 2.0,
            clamped: true,
        }
    } else {
        AccelTime {
            t_a_s: (duration_s - disc.sqrt()) / 2.0,
            clamped: false,
        }
    }
}

/// True if `distance` can be covered within `duration_s` at `accel`.
pub fn is_feasible(duration_s: f64, distance: f64, accel: f64) -> bool {
    !accel_time(duration_s, distance, accel).clamped
}

/// Evaluate the profiled velocity at `t_s` seconds into the segment.
///
/// `displacement` is signed; the returned velocity carries its sign. Outside
/// `[0, duration_s]` the velocity is zero.
pub fn velocity(t_s: f64, duration_s: f64, displacement: f64, accel: f64) -> f64 {
    let sign = if displacement >= 0.0 { 1.0 } else { -1.0 };
    let distance = displacement.abs();

    if t_s < 0.0 || t_s > duration_s {
        return 0.0;
    }

    let t_a_s = accel_time(duration_s, distance, accel).t_a_s;

    if t_s <= t_a_s {
        // Accelerating, trapezoid left
        sign * accel * t_s
    } else if t_s >= duration_s - t_a_s {
        // Decelerating, trapezoid right
        sign * accel * (duration_s - t_s)
    } else {
        // Constant velocity, trapezoid plateau
        sign * accel * t_a_s
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
