//! Implementations for the PosCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};

// Internal
use super::{Params, PosCtrlError, PosCtrlInitError};
use crate::data_store::{CoreState, Setpoint, SharedState};
use crate::odom::{self, StateEstimator};
use crate::pid::PidBank;
use crate::traj::{self, Conversion, TrajPlanner, TrajTable};
use util::{module::State, params, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Position control module state.
pub struct PosCtrl {
    params: Params,

    /// Latest control-tick products, mirrored into the data store by the
    /// executable after each `proc()`.
    shared: SharedState,

    rt: Option<Runtime>,
}

/// Everything built during init.
struct Runtime {
    estimator: StateEstimator,
    planner: TrajPlanner,
    bank: PidBank,

    /// Conversion geometry handed to the trajectory file loader.
    conv: Conversion,

    /// Control tick period, seconds.
    dt_s: f64,

    /// Ticks of continuous saturation before the condition is reported.
    sat_limit_ticks: u64,

    /// Set once the saturation warning has been issued, cleared when the
    /// condition lifts, so the log is not flooded every tick.
    sat_latched: bool,
}

/// Paths of the parameter files PosCtrl loads at init.
#[derive(Clone, Copy)]
pub struct InitData {
    pub params_path: &'static str,
    pub traj_params_path: &'static str,
    pub odom_params_path: &'static str,
}

/// Input data to position control, captured by the executable at the top of
/// the tick.
#[derive(Clone, Debug)]
pub struct TickInput {
    /// Tick time, seconds since the trajectory clock origin.
    pub t_rel_s: f64,

    /// Raw encoder counts per channel.
    pub encoder_counts: Vec<i64>,

    /// IMU capture, for diagnostics.
    pub accel_msq: [f64; 3],
    pub gyro_rads: [f64; 3],

    /// Most recent battery voltage reading.
    pub batt_volts: f64,

    /// True if the controller is currently armed.
    pub armed: bool,

    /// True if an arm request is pending this tick.
    pub arm_request: bool,
}

/// Output of one PosCtrl tick. The duty commands themselves are written
/// into `shared().core.duties` (polarity applied), so the tick path never
/// allocates; the executable reads them from there after `proc()`.
#[derive(Clone, Copy, Debug)]
pub struct OutputData {
    /// State transition the executable must act on, if any.
    pub event: Option<TickEvent>,
}

/// Status report for PosCtrl processing.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusReport {
    /// Motor whose output has been saturated past the timeout, if any.
    pub saturated_wheel: Option<usize>,

    /// True once the trajectory profile has completed.
    pub profile_complete: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// State transitions raised by a control tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickEvent {
    /// The controller has armed: encoders must be zeroed and the motor
    /// driver taken out of standby before the next tick.
    Armed,

    /// The final trajectory waypoint has been reached: disarm and shut down.
    TrajComplete,

    /// A motor output saturated past the timeout with disarm enabled.
    SaturationDisarm { wheel: usize },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PosCtrl {
    fn default() -> Self {
        Self {
            params: Params::default(),
            shared: SharedState {
                core: CoreState::new(0, 0),
                setpoint: Setpoint::new(0),
            },
            rt: None,
        }
    }
}

impl PosCtrl {
    pub fn num_motors(&self) -> usize {
        self.params.motor_polarity.len()
    }

    /// Control tick period. Valid after init.
    pub fn cycle_period_s(&self) -> f64 {
        1.0 / self.params.sample_rate_hz
    }

    /// The latest tick's state, for publishing to the data store.
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Conversion geometry for the trajectory file loader. Valid after init.
    pub fn file_conversion(&self) -> Option<Conversion> {
        self.rt.as_ref().map(|rt| rt.conv)
    }

    /// Load the waypoint table for this run.
    pub fn load_traj_table(&mut self, table: TrajTable) -> Result<(), PosCtrlError> {
        let rt = self.rt.as_mut().ok_or(PosCtrlError::NotInitialised)?;
        rt.planner.load_table(table)?;
        Ok(())
    }

    /// Build the runtime from loaded parameter structs. Split out of `init`
    /// so tests can inject parameters directly.
    fn build(
        &mut self,
        params: Params,
        odom_params: odom::Params,
        traj_params: traj::Params,
    ) -> Result<(), PosCtrlInitError> {
        let num_motors = params.motor_polarity.len();
        let num_axes = traj_params.axes.len();

        if params.pid_gains.len() != num_motors
            || params.wheel_axis_map.len() != num_motors
            || odom_params.encoder_polarity.len() != num_motors
        {
            return Err(PosCtrlInitError::MotorTableMismatch {
                num_polarities: num_motors,
                num_gain_sets: params.pid_gains.len(),
                num_axis_maps: params.wheel_axis_map.len(),
                num_encoders: odom_params.encoder_polarity.len(),
            });
        }

        for (wheel, &axis) in params.wheel_axis_map.iter().enumerate() {
            if axis >= num_axes {
                return Err(PosCtrlInitError::BadAxisMap {
                    wheel,
                    axis,
                    num_axes,
                });
            }
        }

        if !(params.sample_rate_hz > 0.0) {
            return Err(PosCtrlInitError::BadSampleRate(params.sample_rate_hz));
        }

        let dt_s = 1.0 / params.sample_rate_hz;

        let conv = Conversion {
            mount_angle_rad: odom_params.mount_angle_rad,
            wheel_radius_xy_m: odom_params.wheel_radius_xy_m,
            drum_radius_z_m: odom_params.drum_radius_z_m,
            mast_travel_limit_m: traj_params.mast_travel_limit_m,
        };

        let sat_limit_ticks =
            ((params.saturation_timeout_s * params.sample_rate_hz).ceil() as u64).max(1);

        self.rt = Some(Runtime {
            estimator: StateEstimator::new(odom_params)?,
            planner: TrajPlanner::new(traj_params),
            bank: PidBank::new(&params.pid_gains, dt_s),
            conv,
            dt_s,
            sat_limit_ticks,
            sat_latched: false,
        });

        self.shared = SharedState {
            core: CoreState::new(num_motors, num_axes),
            setpoint: Setpoint::new(num_motors),
        };

        self.params = params;

        Ok(())
    }
}

impl Runtime {
    /// Reset for a fresh run: filter memory, odometry history and the pose
    /// all return to zero in place, the planner rewinds to segment zero.
    fn arm(&mut self, shared: &mut SharedState) -> Result<(), PosCtrlError> {
        self.planner.reset_run()?;
        self.bank.reset_all();
        self.estimator.reset();
        self.sat_latched = false;

        let batt_volts = shared.core.batt_volts;
        shared.core.zero();
        shared.core.batt_volts = batt_volts;
        shared.setpoint.zero();

        Ok(())
    }
}

impl State for PosCtrl {
    type InitData = InitData;
    type InitError = PosCtrlInitError;

    type InputData = TickInput;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = PosCtrlError;

    /// Initialise the PosCtrl module.
    ///
    /// Expected init data is the set of parameter file paths.
    fn init(
        &mut self,
        init_data: Self::InitData,
        _session: &Session,
    ) -> Result<(), Self::InitError> {
        let ctrl_params: Params = params::load(init_data.params_path)?;
        let odom_params: odom::Params = params::load(init_data.odom_params_path)?;
        let traj_params: traj::Params = params::load(init_data.traj_params_path)?;

        self.build(ctrl_params, odom_params, traj_params)
    }

    /// Perform one control tick.
    fn proc(
        &mut self,
        input: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let rt = self.rt.as_mut().ok_or(PosCtrlError::NotInitialised)?;
        let num_motors = self.params.motor_polarity.len();
        let mut report = StatusReport::default();

        self.shared.core.t_curr_s = input.t_rel_s;
        self.shared.core.batt_volts = input.batt_volts;
        self.shared.core.accel_msq = input.accel_msq;
        self.shared.core.gyro_rads = input.gyro_rads;

        if !input.armed {
            // A pending arm request is the only thing a disarmed tick acts
            // on. Arming takes effect from the next tick, this one commands
            // zero duty.
            let event = if input.arm_request {
                rt.arm(&mut self.shared)?;
                info!("Position controller armed");
                Some(TickEvent::Armed)
            } else {
                for d in self.shared.core.duties.iter_mut() {
                    *d = 0.0;
                }
                None
            };

            return Ok((OutputData { event }, report));
        }

        // Run the planner for this tick
        let adv = rt.planner.advance(input.t_rel_s)?;

        self.shared.core.step = adv.step;
        self.shared.core.t_1_s = adv.t_1_s;
        self.shared.core.t_2_s = adv.t_2_s;
        self.shared
            .core
            .axis_vels_rads
            .copy_from_slice(rt.planner.axis_vels_rads());

        if adv.complete {
            report.profile_complete = true;
            for d in self.shared.core.duties.iter_mut() {
                *d = 0.0;
            }
            return Ok((
                OutputData {
                    event: Some(TickEvent::TrajComplete),
                },
                report,
            ));
        }

        // Integrate the planner velocities into the per-wheel setpoints
        for (wheel, sp) in self
            .shared
            .setpoint
            .wheel_angles_rad
            .iter_mut()
            .enumerate()
        {
            *sp += self.shared.core.axis_vels_rads[self.params.wheel_axis_map[wheel]] * rt.dt_s;
        }

        // Update the pose estimate
        rt.estimator
            .estimate(&input.encoder_counts, &mut self.shared.core)?;

        // March the PID bank against the setpoint error, compensating the
        // gains for battery sag
        rt.bank
            .rescale_gains(self.params.v_nominal_volts, input.batt_volts);

        for wheel in 0..num_motors {
            let duty = rt.bank.march(
                wheel,
                self.shared.setpoint.wheel_angles_rad[wheel],
                self.shared.core.wheel_angles_rad[wheel],
            );
            self.shared.core.duties[wheel] = duty * self.params.motor_polarity[wheel];
        }

        // Persistent saturation indicates a stalled or failed drive
        let mut event = None;
        if let Some(wheel) = rt.bank.first_saturated(rt.sat_limit_ticks) {
            report.saturated_wheel = Some(wheel);

            if self.params.disarm_on_saturation {
                warn!("Motor {} saturated past the timeout, disarming", wheel);
                for d in self.shared.core.duties.iter_mut() {
                    *d = 0.0;
                }
                event = Some(TickEvent::SaturationDisarm { wheel });
            } else if !rt.sat_latched {
                warn!("Motor {} saturated past the timeout", wheel);
                rt.sat_latched = true;
            }
        } else {
            rt.sat_latched = false;
        }

        Ok((OutputData { event }, report))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
