//! # Trajectory planner module
//!
//! The planner owns the waypoint table loaded at startup and, given the
//! elapsed run time, produces a desired velocity per independent axis using
//! a symmetric trapezoidal profile over the active segment. It also tracks
//! which segment is active and signals run completion when the final
//! waypoint time is reached.
//!
//! The planner does no path planning: waypoints arrive pre-computed, and the
//! only interpolation performed is the velocity profile between neighbouring
//! rows of the table.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod file;
pub mod params;
pub mod profile;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use file::*;
pub use params::{AxisParams, Params};
pub use state::*;
