//! Trajectory planner parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Acceleration limits for one planner axis.
///
/// Axes with symmetric actuation use the same magnitude in both directions;
/// the mast uses a lower magnitude driving down, where gravity assists and
/// the profile would otherwise outrun the brake.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AxisParams {
    /// Acceleration magnitude for positive displacements.
    ///
    /// Units: wheel rad/s^2
    pub accel_pos_rads2: f64,

    /// Acceleration magnitude for negative displacements.
    ///
    /// Units: wheel rad/s^2
    pub accel_neg_rads2: f64,
}

/// Parameters for the trajectory planner.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Per-axis acceleration limits, in table column order.
    pub axes: Vec<AxisParams>,

    /// Mast travel above this is rejected at trajectory load time.
    ///
    /// Units: meters
    pub mast_travel_limit_m: f64,
}
