//! Parameters for the position control module

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// Internal
use crate::pid::PidGains;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the position control module.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Params {
    /// Frequency of the control tick.
    ///
    /// Units: hertz
    pub sample_rate_hz: f64,

    /// Nominal battery voltage the PID gains were tuned at. The effective
    /// gains are rescaled every tick against the measured voltage.
    ///
    /// Units: volts
    pub v_nominal_volts: f64,

    /// How long an output may sit above the saturation threshold before the
    /// condition is reported.
    ///
    /// Units: seconds
    pub saturation_timeout_s: f64,

    /// Disarm when an output has been saturated past the timeout. Off by
    /// default, in which case the condition is logged and reported but the
    /// run continues.
    #[serde(default)]
    pub disarm_on_saturation: bool,

    /// Duty sign per motor, +1 or -1, correcting for mirrored mounting.
    pub motor_polarity: Vec<f64>,

    /// Planner axis driven by each motor.
    pub wheel_axis_map: Vec<usize>,

    /// PID tuning per motor.
    pub pid_gains: Vec<PidGains>,
}
