//! Position control module
//!
//! The core of the control executable: one `proc()` call per control tick
//! takes a snapshot of the sensor inputs and produces the per-motor duty
//! commands. While armed the tick runs the trajectory planner, integrates the
//! planner velocities into per-wheel setpoint angles, updates the pose
//! estimate from the encoders, and marches the PID bank against the setpoint
//! error. While disarmed the tick is a no-op that commands zero duty.
//!
//! The module performs no hardware access itself, the executable owns all
//! device handles and feeds the tick through [`TickInput`].

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

use crate::odom::OdomError;
use crate::traj::TrajPlannerError;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during PosCtrl initialisation.
#[derive(Debug, thiserror::Error)]
pub enum PosCtrlInitError {
    #[error("Cannot load parameters: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("Invalid state estimator setup: {0}")]
    OdomError(#[from] OdomError),

    #[error(
        "Motor tables disagree: {num_polarities} polarities, {num_gain_sets} gain sets, \
         {num_axis_maps} axis mappings, {num_encoders} encoder polarities"
    )]
    MotorTableMismatch {
        num_polarities: usize,
        num_gain_sets: usize,
        num_axis_maps: usize,
        num_encoders: usize,
    },

    #[error("Wheel {wheel} maps to planner axis {axis}, but only {num_axes} axes are configured")]
    BadAxisMap {
        wheel: usize,
        axis: usize,
        num_axes: usize,
    },

    #[error("Sample rate {0} Hz is not a positive frequency")]
    BadSampleRate(f64),
}

/// Possible errors that can occur during PosCtrl cyclic processing.
#[derive(Debug, thiserror::Error)]
pub enum PosCtrlError {
    #[error("proc() was called before init()")]
    NotInitialised,

    #[error("Trajectory planner error: {0}")]
    PlannerError(#[from] TrajPlannerError),

    #[error("State estimation error: {0}")]
    OdomError(#[from] OdomError),
}
