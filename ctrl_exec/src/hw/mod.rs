//! # Hardware interface
//!
//! Narrow traits over the hardware the control core talks to: quadrature
//! encoders, motor drivers, the IMU, the operator radio and the battery ADC.
//! Real drivers live outside this crate; the `sim` feature provides a
//! simulated board used by the tests and by development builds.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

#[cfg(feature = "sim")]
pub mod sim;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors raised by a hardware backend.
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("Channel {channel} is out of range, {num_channels} channels available")]
    ChannelOutOfRange { channel: usize, num_channels: usize },

    #[error("The device did not respond: {0}")]
    NotResponding(String),

    #[error("Device read failed: {0}")]
    ReadError(String),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Quadrature encoder bank.
pub trait Encoders: Send {
    /// Read the signed count of the given encoder channel.
    fn read(&mut self, channel: usize) -> Result<i64, HwError>;

    /// Overwrite the count of the given channel, used to reset the reference
    /// zero point when arming.
    fn write(&mut self, channel: usize, counts: i64) -> Result<(), HwError>;
}

/// Motor driver bank. Duty cycles are fractions in `[-1, 1]`.
pub trait Motors: Send {
    /// Set the duty cycle of the given motor channel.
    fn set(&mut self, channel: usize, duty: f64) -> Result<(), HwError>;

    /// Put all motor drivers into or out of standby.
    fn standby(&mut self, enabled: bool) -> Result<(), HwError>;

    /// Let the given motor channel spin freely (no braking).
    fn free_spin(&mut self, channel: usize) -> Result<(), HwError>;
}

/// Inertial measurement unit. Raw vector capture only, the control law does
/// not consume these readings.
pub trait Imu: Send {
    /// Read the accelerometer vector in m/s^2.
    fn read_accel(&mut self) -> Result<[f64; 3], HwError>;

    /// Read the gyroscope vector in rad/s.
    fn read_gyro(&mut self) -> Result<[f64; 3], HwError>;
}

/// Operator radio receiver.
pub trait Radio: Send {
    /// True if a new frame has arrived since the last channel read.
    fn is_new_data(&mut self) -> bool;

    /// Raw value of the given channel, in receiver units.
    fn ch_raw(&mut self, channel: usize) -> Result<f64, HwError>;

    /// True if the link to the transmitter is alive.
    fn is_connection_active(&mut self) -> bool;
}

/// Battery voltage ADC.
pub trait BattAdc: Send {
    /// Read the battery voltage in volts.
    fn read_volts(&mut self) -> Result<f64, HwError>;
}
