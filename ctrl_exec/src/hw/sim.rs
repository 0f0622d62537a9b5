//! # Simulated hardware board
//!
//! A single shared board state behind an `Arc<Mutex<_>>`, with cheap cloned
//! handles implementing each of the hardware traits. The tests drive the
//! board directly (setting encoder counts, radio channels and battery
//! voltage); development builds of the exec use it as a stand-in for the
//! real electronics.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use super::{BattAdc, Encoders, HwError, Imu, Motors, Radio};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The full state of the simulated board.
pub struct SimInner {
    pub encoder_counts: Vec<i64>,
    pub duties: Vec<f64>,
    pub standby: bool,
    pub free_spinning: Vec<bool>,

    pub accel_msq: [f64; 3],
    pub gyro_rads: [f64; 3],

    pub radio_channels: Vec<f64>,
    pub radio_new_data: bool,
    pub radio_link_active: bool,

    pub batt_volts: f64,
}

/// A cloneable handle onto the simulated board. Implements all of the
/// hardware traits, so one board can be split between the control loop and
/// the background threads just like the real peripherals are.
#[derive(Clone)]
pub struct SimBoard {
    inner: Arc<Mutex<SimInner>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimBoard {
    /// Create a new board with the given number of motor/encoder channels
    /// and radio channels.
    pub fn new(num_motors: usize, num_radio_channels: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                encoder_counts: vec![0; num_motors],
                duties: vec![0.0; num_motors],
                standby: true,
                free_spinning: vec![false; num_motors],
                accel_msq: [0.0; 3],
                gyro_rads: [0.0; 3],
                radio_channels: vec![0.0; num_radio_channels],
                radio_new_data: false,
                radio_link_active: false,
                batt_volts: 0.0,
            })),
        }
    }

    /// Run a closure against the board state. Used by the tests to inject
    /// sensor values and inspect actuator commands.
    pub fn with_inner<T>(&self, f: impl FnOnce(&mut SimInner) -> T) -> T {
        let mut inner = self.inner.lock().expect("SimBoard mutex poisoned");
        f(&mut inner)
    }

    /// Advance a crude motor model: each wheel turns at a rate proportional
    /// to its commanded duty. Enough to close the loop in tests, not a
    /// dynamics model.
    pub fn step_motors(&self, dt_s: f64, counts_per_duty_sec: f64) {
        self.with_inner(|inner| {
            if inner.standby {
                return;
            }
            for (counts, duty) in inner.encoder_counts.iter_mut().zip(inner.duties.iter()) {
                *counts += (duty * counts_per_duty_sec * dt_s) as i64;
            }
        })
    }

    fn check_channel(channel: usize, num_channels: usize) -> Result<(), HwError> {
        if channel >= num_channels {
            Err(HwError::ChannelOutOfRange {
                channel,
                num_channels,
            })
        } else {
            Ok(())
        }
    }
}

impl Encoders for SimBoard {
    fn read(&mut self, channel: usize) -> Result<i64, HwError> {
        self.with_inner(|inner| {
            Self::check_channel(channel, inner.encoder_counts.len())?;
            Ok(inner.encoder_counts[channel])
        })
    }

    fn write(&mut self, channel: usize, counts: i64) -> Result<(), HwError> {
        self.with_inner(|inner| {
            Self::check_channel(channel, inner.encoder_counts.len())?;
            inner.encoder_counts[channel] = counts;
            Ok(())
        })
    }
}

impl Motors for SimBoard {
    fn set(&mut self, channel: usize, duty: f64) -> Result<(), HwError> {
        self.with_inner(|inner| {
            Self::check_channel(channel, inner.duties.len())?;
            inner.duties[channel] = duty;
            inner.free_spinning[channel] = false;
            Ok(())
        })
    }

    fn standby(&mut self, enabled: bool) -> Result<(), HwError> {
        self.with_inner(|inner| {
            inner.standby = enabled;
            Ok(())
        })
    }

    fn free_spin(&mut self, channel: usize) -> Result<(), HwError> {
        self.with_inner(|inner| {
            Self::check_channel(channel, inner.duties.len())?;
            inner.duties[channel] = 0.0;
            inner.free_spinning[channel] = true;
            Ok(())
        })
    }
}

impl Imu for SimBoard {
    fn read_accel(&mut self) -> Result<[f64; 3], HwError> {
        self.with_inner(|inner| Ok(inner.accel_msq))
    }

    fn read_gyro(&mut self) -> Result<[f64; 3], HwError> {
        self.with_inner(|inner| Ok(inner.gyro_rads))
    }
}

impl Radio for SimBoard {
    fn is_new_data(&mut self) -> bool {
        self.with_inner(|inner| {
            let new = inner.radio_new_data;
            inner.radio_new_data = false;
            new
        })
    }

    fn ch_raw(&mut self, channel: usize) -> Result<f64, HwError> {
        self.with_inner(|inner| {
            Self::check_channel(channel, inner.radio_channels.len())?;
            Ok(inner.radio_channels[channel])
        })
    }

    fn is_connection_active(&mut self) -> bool {
        self.with_inner(|inner| inner.radio_link_active)
    }
}

impl BattAdc for SimBoard {
    fn read_volts(&mut self) -> Result<f64, HwError> {
        self.with_inner(|inner| Ok(inner.batt_volts))
    }
}
