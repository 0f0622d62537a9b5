//! # Data Store
//!
//! The shared-state boundary between the control tick and the background
//! threads. All of the bulk state (`CoreState` + `Setpoint`) sits behind a
//! single mutex and is locked once per tick by its writer; readers take
//! cloned snapshots, so they may observe a state that is one tick stale but
//! never a torn one.
//!
//! The arming flag is the sole synchronisation point between the command
//! reader and the control loop and is therefore a `SeqCst` atomic, as is the
//! process run state which every loop polls for cooperative shutdown.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
    Mutex, MutexGuard,
};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// ARMED or DISARMED, indicating whether the controller may emit non-zero
/// actuator commands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArmState {
    Disarmed,
    Armed,
}

/// Process-wide run state, the cooperative shutdown flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Startup, ticks not yet being delivered.
    Init,
    /// The control loop is ticking.
    Running,
    /// Shutdown requested, all loops exit at their next iteration.
    Exiting,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The system state written by the position controller (and, for the voltage
/// field only, by the battery monitor).
#[derive(Clone, Debug)]
pub struct CoreState {
    /// Wheel rotations relative to the body, radians at the wheel.
    pub wheel_angles_rad: Vec<f64>,

    /// Controller output per motor, duty fraction in [-1, 1].
    pub duties: Vec<f64>,

    /// Battery voltage. Written only by the battery monitor.
    pub batt_volts: f64,

    /// Global position, metres.
    pub x_m: f64,
    pub y_m: f64,

    /// Position along the rotated omni axes, metres.
    pub x_r_m: f64,
    pub y_r_m: f64,

    /// Mast height, metres.
    pub z_m: f64,

    /// Body yaw, radians, wrapped to (-2pi, 2pi).
    pub theta_rad: f64,

    /// Row of the trajectory table currently being pursued.
    pub step: usize,

    /// Start time of the current trajectory segment, seconds.
    pub t_1_s: f64,

    /// End time of the current trajectory segment, seconds.
    pub t_2_s: f64,

    /// Time of the most recent control tick, seconds since the clock origin.
    pub t_curr_s: f64,

    /// Desired velocity per planner axis, wheel rad/s.
    pub axis_vels_rads: Vec<f64>,

    /// Raw IMU capture, for diagnostics only.
    pub accel_msq: [f64; 3],
    pub gyro_rads: [f64; 3],
}

/// Feedback controller setpoint: the per-wheel target angles the PID bank
/// tracks, integrated from the planner's axis velocities.
#[derive(Clone, Debug)]
pub struct Setpoint {
    /// Target wheel angle per motor, radians at the wheel.
    pub wheel_angles_rad: Vec<f64>,
}

/// Everything behind the snapshot boundary.
#[derive(Clone, Debug)]
pub struct SharedState {
    pub core: CoreState,
    pub setpoint: Setpoint,
}

/// Global data store for the executable. Shared between threads as an
/// `Arc<DataStore>`.
pub struct DataStore {
    shared: Mutex<SharedState>,

    arm: AtomicU8,
    run: AtomicU8,

    /// Raised by the command reader when a valid start gesture is seen,
    /// consumed by the control loop which performs the actual arming.
    arm_request: AtomicBool,

    /// Origin of the trajectory clock, session-elapsed seconds as f64 bits.
    clock_origin: AtomicU64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl CoreState {
    /// Zero every field in place, keeping the buffers. Used when arming so
    /// the tick path never reallocates.
    pub fn zero(&mut self) {
        for v in self.wheel_angles_rad.iter_mut() {
            *v = 0.0;
        }
        for v in self.duties.iter_mut() {
            *v = 0.0;
        }
        for v in self.axis_vels_rads.iter_mut() {
            *v = 0.0;
        }
        self.batt_volts = 0.0;
        self.x_m = 0.0;
        self.y_m = 0.0;
        self.x_r_m = 0.0;
        self.y_r_m = 0.0;
        self.z_m = 0.0;
        self.theta_rad = 0.0;
        self.step = 0;
        self.t_1_s = 0.0;
        self.t_2_s = 0.0;
        self.t_curr_s = 0.0;
        self.accel_msq = [0.0; 3];
        self.gyro_rads = [0.0; 3];
    }

    /// Field-wise copy from another state of the same shape, without
    /// reallocating the buffers.
    pub fn copy_from(&mut self, other: &CoreState) {
        self.wheel_angles_rad.copy_from_slice(&other.wheel_angles_rad);
        self.duties.copy_from_slice(&other.duties);
        self.axis_vels_rads.copy_from_slice(&other.axis_vels_rads);
        self.batt_volts = other.batt_volts;
        self.x_m = other.x_m;
        self.y_m = other.y_m;
        self.x_r_m = other.x_r_m;
        self.y_r_m = other.y_r_m;
        self.z_m = other.z_m;
        self.theta_rad = other.theta_rad;
        self.step = other.step;
        self.t_1_s = other.t_1_s;
        self.t_2_s = other.t_2_s;
        self.t_curr_s = other.t_curr_s;
        self.accel_msq = other.accel_msq;
        self.gyro_rads = other.gyro_rads;
    }

    pub fn new(num_motors: usize, num_axes: usize) -> Self {
        Self {
            wheel_angles_rad: vec![0.0; num_motors],
            duties: vec![0.0; num_motors],
            batt_volts: 0.0,
            x_m: 0.0,
            y_m: 0.0,
            x_r_m: 0.0,
            y_r_m: 0.0,
            z_m: 0.0,
            theta_rad: 0.0,
            step: 0,
            t_1_s: 0.0,
            t_2_s: 0.0,
            t_curr_s: 0.0,
            axis_vels_rads: vec![0.0; num_axes],
            accel_msq: [0.0; 3],
            gyro_rads: [0.0; 3],
        }
    }
}

impl Setpoint {
    pub fn new(num_motors: usize) -> Self {
        Self {
            wheel_angles_rad: vec![0.0; num_motors],
        }
    }

    pub fn zero(&mut self) {
        for v in self.wheel_angles_rad.iter_mut() {
            *v = 0.0;
        }
    }
}

impl SharedState {
    /// Field-wise copy without reallocating. Both states must have the same
    /// motor and axis counts.
    pub fn copy_from(&mut self, other: &SharedState) {
        self.core.copy_from(&other.core);
        self.setpoint
            .wheel_angles_rad
            .copy_from_slice(&other.setpoint.wheel_angles_rad);
    }
}

impl DataStore {
    pub fn new(num_motors: usize, num_axes: usize) -> Self {
        Self {
            shared: Mutex::new(SharedState {
                core: CoreState::new(num_motors, num_axes),
                setpoint: Setpoint::new(num_motors),
            }),
            arm: AtomicU8::new(ArmState::Disarmed as u8),
            run: AtomicU8::new(RunState::Init as u8),
            arm_request: AtomicBool::new(false),
            clock_origin: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Lock the bulk state for mutation. Only the control loop and the
    /// battery monitor take this lock to write; hold it for one tick's worth
    /// of updates at most.
    pub fn lock_shared(&self) -> MutexGuard<SharedState> {
        self.shared
            .lock()
            .unwrap_or_else(|_| util::raise_error!("DataStore mutex poisoned"))
    }

    /// Take a snapshot of the bulk state, for readers.
    pub fn snapshot(&self) -> SharedState {
        self.lock_shared().clone()
    }

    /// Publish the control loop's tick products.
    ///
    /// The voltage field is owned by the battery monitor, so the store's
    /// current value is kept rather than overwritten with whatever the tick
    /// snapshotted at its start. Copies field-wise into the existing buffers.
    pub fn publish(&self, shared: &SharedState) {
        let mut guard = self.lock_shared();
        let batt_volts = guard.core.batt_volts;
        guard.copy_from(shared);
        guard.core.batt_volts = batt_volts;
    }

    /// Write the battery voltage field only.
    pub fn set_batt_volts(&self, volts: f64) {
        self.lock_shared().core.batt_volts = volts;
    }

    pub fn batt_volts(&self) -> f64 {
        self.lock_shared().core.batt_volts
    }

    pub fn arm_state(&self) -> ArmState {
        match self.arm.load(Ordering::SeqCst) {
            x if x == ArmState::Armed as u8 => ArmState::Armed,
            _ => ArmState::Disarmed,
        }
    }

    pub fn set_arm_state(&self, state: ArmState) {
        self.arm.store(state as u8, Ordering::SeqCst);
    }

    pub fn run_state(&self) -> RunState {
        match self.run.load(Ordering::SeqCst) {
            x if x == RunState::Running as u8 => RunState::Running,
            x if x == RunState::Exiting as u8 => RunState::Exiting,
            _ => RunState::Init,
        }
    }

    pub fn set_run_state(&self, state: RunState) {
        self.run.store(state as u8, Ordering::SeqCst);
    }

    /// Request process shutdown. Idempotent.
    pub fn request_exit(&self) {
        self.set_run_state(RunState::Exiting);
    }

    pub fn is_exiting(&self) -> bool {
        self.run_state() == RunState::Exiting
    }

    /// Raise the arm request. The control loop consumes it at its next tick.
    pub fn raise_arm_request(&self) {
        self.arm_request.store(true, Ordering::SeqCst);
    }

    /// Consume a pending arm request, if any.
    pub fn take_arm_request(&self) -> bool {
        self.arm_request.swap(false, Ordering::SeqCst)
    }

    /// Origin of the trajectory clock, session-elapsed seconds.
    pub fn clock_origin_s(&self) -> f64 {
        f64::from_bits(self.clock_origin.load(Ordering::SeqCst))
    }

    pub fn set_clock_origin_s(&self, origin_s: f64) {
        self.clock_origin.store(origin_s.to_bits(), Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_arm_round_trip() {
        let ds = DataStore::new(5, 3);
        assert_eq!(ds.arm_state(), ArmState::Disarmed);
        ds.set_arm_state(ArmState::Armed);
        assert_eq!(ds.arm_state(), ArmState::Armed);
    }

    #[test]
    fn test_arm_request_consumed_once() {
        let ds = DataStore::new(5, 3);
        assert!(!ds.take_arm_request());
        ds.raise_arm_request();
        assert!(ds.take_arm_request());
        assert!(!ds.take_arm_request());
    }

    #[test]
    fn test_publish_keeps_monitor_voltage() {
        let ds = DataStore::new(5, 3);
        ds.set_batt_volts(12.5);

        // The tick snapshots the state, then the monitor writes a fresh
        // reading before the tick publishes
        let mut tick = ds.snapshot();
        tick.core.x_m = 0.75;
        ds.set_batt_volts(11.0);

        ds.publish(&tick);

        let snap = ds.snapshot();
        assert_eq!(snap.core.batt_volts, 11.0);
        assert_eq!(snap.core.x_m, 0.75);
    }

    #[test]
    fn test_voltage_writes_only_voltage() {
        let ds = DataStore::new(5, 3);
        {
            let mut shared = ds.lock_shared();
            shared.core.x_m = 1.25;
        }
        ds.set_batt_volts(11.7);

        let snap = ds.snapshot();
        assert_eq!(snap.core.batt_volts, 11.7);
        assert_eq!(snap.core.x_m, 1.25);
    }
}
