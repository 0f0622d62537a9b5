//! # Command/e-stop reader
//!
//! Background task polling the operator radio at its own fixed rate. It is
//! the only path by which the controller can arm: a valid start gesture on
//! the e-stop channel raises an arm request and zeroes the trajectory clock,
//! and the control loop performs the actual arming at its next tick. The
//! disarm direction is taken here directly, dropping the e-stop channel (or
//! losing the link) while armed disarms immediately and requests process
//! shutdown.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info, warn};
use serde::Deserialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Internal
use crate::data_store::{ArmState, DataStore};
use crate::hw::{HwError, Radio};
use util::session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the command reader.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Radio poll frequency.
    ///
    /// Units: hertz
    pub poll_rate_hz: f64,

    /// Operator stick channels, normalised and range-checked each poll.
    pub stick_channels: Vec<usize>,

    /// Channel carrying the e-stop switch.
    pub estop_channel: usize,

    /// Raw value at stick centre.
    pub center_offset: f64,

    /// Raw units per unit of normalised stick deflection.
    pub norm_factor: f64,

    /// Plausible raw range of the e-stop channel, readings outside are
    /// clamped.
    pub estop_raw_min: f64,
    pub estop_raw_max: f64,

    /// E-stop channel values at or above this mean "run", below mean "stop".
    pub arm_threshold: f64,
}

/// Command reader state.
pub struct CmdReader {
    params: Params,

    /// Set once the start gesture has been seen, the trajectory clock is
    /// only ever zeroed once per run.
    started: bool,

    /// Most recent e-stop channel value, clamped. Holds its last value
    /// between radio frames, and is forced to zero on link loss.
    estop_raw: f64,

    /// Normalised stick values, kept for diagnostics.
    sticks: Vec<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CmdReader {
    pub fn new(params: Params) -> Self {
        let num_sticks = params.stick_channels.len();
        Self {
            params,
            started: false,
            estop_raw: 0.0,
            sticks: vec![0.0; num_sticks],
        }
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.params.poll_rate_hz)
    }

    /// Latest normalised stick values.
    pub fn sticks(&self) -> &[f64] {
        &self.sticks
    }

    /// One poll of the radio.
    ///
    /// `now_s` is the session-elapsed time used as the trajectory clock
    /// origin if the start gesture is seen this poll.
    pub fn poll_once<R: Radio>(
        &mut self,
        radio: &mut R,
        ds: &DataStore,
        now_s: f64,
    ) -> Result<(), HwError> {
        if radio.is_new_data() {
            // Sticks are not consumed by the control law, but are range
            // checked so a failing receiver shows up in the log
            for (i, &ch) in self.params.stick_channels.iter().enumerate() {
                let norm =
                    (radio.ch_raw(ch)? - self.params.center_offset) / self.params.norm_factor;
                self.sticks[i] = clamp_warn("stick", ch, norm, -1.0, 1.0);
            }

            self.estop_raw = clamp_warn(
                "e-stop",
                self.params.estop_channel,
                radio.ch_raw(self.params.estop_channel)?,
                self.params.estop_raw_min,
                self.params.estop_raw_max,
            );

            // Start gesture: e-stop channel high, seen for the first time
            if !self.started && self.estop_raw >= self.params.arm_threshold {
                self.started = true;
                ds.set_clock_origin_s(now_s);
                ds.raise_arm_request();
                info!("Start gesture received, arming requested");
            }
        } else if !radio.is_connection_active() {
            // Lost link is an implicit stop
            self.estop_raw = 0.0;
        }

        // Fail-safe: the disarm direction does not wait for the control loop
        if self.estop_raw < self.params.arm_threshold && ds.arm_state() == ArmState::Armed {
            ds.set_arm_state(ArmState::Disarmed);
            error!("Emergency stop engaged");
            ds.request_exit();
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Command reader thread main. Polls until the data store signals exit.
pub fn cmd_reader_thread<R: Radio>(mut reader: CmdReader, mut radio: R, ds: Arc<DataStore>) {
    let period = reader.poll_period();

    while !ds.is_exiting() {
        // Sleep first, giving the receiver time to bind after startup
        thread::sleep(period);

        if let Err(e) = reader.poll_once(&mut radio, &ds, session::get_elapsed_seconds()) {
            warn!("Command reader poll failed: {}", e);
        }
    }

    info!("Command reader thread exiting");
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Clamp a channel value into `[min, max]`, warning if it was outside.
fn clamp_warn(name: &str, channel: usize, value: f64, min: f64, max: f64) -> f64 {
    if value < min || value > max {
        warn!(
            "Radio {} channel {} value {:.1} outside [{:.1}, {:.1}], clamped",
            name, channel, value, min, max
        );
    }
    util::maths::clamp(&value, &min, &max)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(all(test, feature = "sim"))]
mod test {
    use super::*;
    use crate::data_store::RunState;
    use crate::hw::sim::SimBoard;

    const ESTOP_CH: usize = 5;

    fn test_params() -> Params {
        Params {
            poll_rate_hz: 20.0,
            stick_channels: vec![1, 3, 4],
            estop_channel: ESTOP_CH,
            center_offset: 1500.0,
            norm_factor: 450.0,
            estop_raw_min: 900.0,
            estop_raw_max: 2100.0,
            arm_threshold: 1100.0,
        }
    }

    fn board_with_estop(raw: f64) -> SimBoard {
        let board = SimBoard::new(5, 8);
        board.with_inner(|inner| {
            inner.radio_channels = vec![1500.0; 8];
            inner.radio_channels[ESTOP_CH] = raw;
            inner.radio_new_data = true;
            inner.radio_link_active = true;
        });
        board
    }

    #[test]
    fn test_start_gesture_arms_once() {
        let mut reader = CmdReader::new(test_params());
        let mut board = board_with_estop(1500.0);
        let ds = DataStore::new(5, 3);

        reader.poll_once(&mut board, &ds, 4.2).unwrap();
        assert!(ds.take_arm_request());
        assert_eq!(ds.clock_origin_s(), 4.2);

        // A second frame with the switch still high must not re-arm or move
        // the clock origin
        board.with_inner(|inner| inner.radio_new_data = true);
        reader.poll_once(&mut board, &ds, 9.9).unwrap();
        assert!(!ds.take_arm_request());
        assert_eq!(ds.clock_origin_s(), 4.2);
    }

    #[test]
    fn test_estop_disarms_within_one_poll() {
        let mut reader = CmdReader::new(test_params());
        let mut board = board_with_estop(1000.0);
        let ds = DataStore::new(5, 3);
        ds.set_arm_state(ArmState::Armed);
        ds.set_run_state(RunState::Running);

        reader.poll_once(&mut board, &ds, 1.0).unwrap();

        assert_eq!(ds.arm_state(), ArmState::Disarmed);
        assert!(ds.is_exiting());
    }

    #[test]
    fn test_lost_link_is_a_stop() {
        let mut reader = CmdReader::new(test_params());
        let mut board = board_with_estop(1500.0);
        let ds = DataStore::new(5, 3);

        // First poll sees the start gesture
        reader.poll_once(&mut board, &ds, 0.0).unwrap();
        ds.set_arm_state(ArmState::Armed);

        // Link drops, no new data
        board.with_inner(|inner| {
            inner.radio_new_data = false;
            inner.radio_link_active = false;
        });
        reader.poll_once(&mut board, &ds, 0.1).unwrap();

        assert_eq!(ds.arm_state(), ArmState::Disarmed);
        assert!(ds.is_exiting());
    }

    #[test]
    fn test_out_of_range_estop_clamped_not_fatal() {
        let mut reader = CmdReader::new(test_params());
        let mut board = board_with_estop(2500.0);
        let ds = DataStore::new(5, 3);

        // 2500 clamps to 2100, still a valid start gesture
        reader.poll_once(&mut board, &ds, 0.0).unwrap();
        assert!(ds.take_arm_request());
    }

    #[test]
    fn test_stale_frame_keeps_last_value_while_link_up() {
        let mut reader = CmdReader::new(test_params());
        let mut board = board_with_estop(1500.0);
        let ds = DataStore::new(5, 3);

        reader.poll_once(&mut board, &ds, 0.0).unwrap();
        ds.set_arm_state(ArmState::Armed);

        // No new frame but the link is alive: the held switch value keeps
        // the run going
        board.with_inner(|inner| inner.radio_new_data = false);
        reader.poll_once(&mut board, &ds, 0.1).unwrap();

        assert_eq!(ds.arm_state(), ArmState::Armed);
        assert!(!ds.is_exiting());
    }
}
