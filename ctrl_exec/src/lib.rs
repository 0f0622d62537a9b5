//! # Control library.
//!
//! This library exposes the motion-control core of the Strider rover: an
//! omni-drive platform with a telescoping vertical mast. The `ctrl_exec`
//! binary drives these modules at a fixed rate; they are kept free of any
//! direct hardware access so that they can be unit tested in isolation.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Battery monitor - slow background sampling of the supply voltage
pub mod batt;

/// Command/e-stop reader - polls the operator radio and gates arming
pub mod cmd;

/// Shared state - the snapshot boundary between the control tick and the background threads
pub mod data_store;

/// Diagnostics logger - periodic fixed-width state/setpoint table
pub mod diag;

/// Hardware interface - narrow traits over encoders, motors, IMU, radio and battery ADC
pub mod hw;

/// State estimator - wheel odometry and pose integration
pub mod odom;

/// PID bank - per-motor discrete PID filters with battery-sag compensation
pub mod pid;

/// Position controller - the fixed-rate control tick
pub mod pos_ctrl;

/// Trajectory planner - trapezoidal velocity profiles over the waypoint table
pub mod traj;
