//! Main control executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules and hardware
//!     - Load the trajectory table
//!     - Start the background threads:
//!         - Battery monitor
//!         - Command/e-stop reader
//!         - Diagnostics logger
//!     - Main loop, at the fixed control rate:
//!         - Sensor acquisition (encoders, IMU)
//!         - Position control processing
//!         - Motor command output
//!         - State publication to the data store
//!
//! The control loop is the designated writer of the shared state, the
//! background threads communicate with it only through the data store.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use ctrl_lib::{
    batt::{self, BattMonitor},
    cmd::{self, CmdReader},
    data_store::{ArmState, DataStore, RunState},
    diag::{self, DiagLogger},
    hw::{Encoders, Imu, Motors},
    pos_ctrl::{InitData, PosCtrl, TickEvent, TickInput},
    traj,
};

#[cfg(feature = "sim")]
use ctrl_lib::hw::sim::SimBoard;

#[cfg(not(feature = "sim"))]
compile_error!("ctrl_exec currently requires the `sim` hardware backend");

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, error, info, warn};
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Trajectory file consumed at startup, relative to the software root.
const TRAJ_FILE: &str = "trajec.txt";

/// Number of channels exposed by the radio receiver.
const NUM_RADIO_CHANNELS: usize = 8;

/// Bound on how long the main thread waits for each background thread at
/// shutdown.
const THREAD_JOIN_TIMEOUT: Duration = Duration::from_millis(1500);

/// Crude sim motor model: encoder counts per second at full duty.
#[cfg(feature = "sim")]
const SIM_COUNTS_PER_DUTY_SEC: f64 = 2000.0;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Printed if some invalid argument was given.
fn print_usage() {
    eprintln!();
    eprintln!("-f {{filename}}     print results to filename");
    eprintln!("-s                print results to terminal");
    eprintln!("-h                print this help message");
    eprintln!();
}

/// Parse the CLI arguments into the diagnostics sink choice.
///
/// `Some(path)` directs diagnostics to a file, `None` to the terminal.
fn parse_args() -> Result<Option<String>, Report> {
    let args: Vec<String> = env::args().collect();
    let mut diag_file = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-f" => match iter.next() {
                Some(path) => diag_file = Some(path.clone()),
                None => {
                    print_usage();
                    return Err(eyre!("-f requires a filename"));
                }
            },
            "-s" => diag_file = None,
            "-h" => {
                print_usage();
                std::process::exit(1);
            }
            other => {
                print_usage();
                return Err(eyre!("Unrecognised argument {:?}", other));
            }
        }
    }

    Ok(diag_file)
}

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    let diag_file = parse_args()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("ctrl_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("Strider Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    if diag_file.is_none() {
        warn!("Not saving diagnostics output to file");
    }

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut pos_ctrl = PosCtrl::default();
    pos_ctrl
        .init(
            InitData {
                params_path: "pos_ctrl.toml",
                traj_params_path: "traj_planner.toml",
                odom_params_path: "odom.toml",
            },
            &session,
        )
        .wrap_err("Failed to initialise PosCtrl")?;
    info!("PosCtrl init complete");

    let cmd_params: cmd::Params =
        util::params::load("cmd_reader.toml").wrap_err("Could not load command reader params")?;
    let batt_params: batt::Params =
        util::params::load("batt_mon.toml").wrap_err("Could not load battery monitor params")?;

    info!("Module initialisation complete\n");

    let num_motors = pos_ctrl.num_motors();
    let cycle_period_s = pos_ctrl.cycle_period_s();

    // ---- INITIALISE HARDWARE ----

    let board = SimBoard::new(num_motors, NUM_RADIO_CHANNELS);

    // Seed the simulated electronics with a healthy pack and a bound
    // transmitter holding the start gesture, so a sim run arms and drives
    // the trajectory without an operator
    board.with_inner(|inner| {
        inner.batt_volts = 12.4;
        inner.radio_link_active = true;
        inner.radio_channels = vec![1500.0; NUM_RADIO_CHANNELS];
        inner.radio_new_data = true;
    });

    let mut encoders = board.clone();
    let mut motors = board.clone();
    let mut imu = board.clone();

    // Start with the motor drivers in standby
    motors
        .standby(true)
        .wrap_err("Failed to put the motors in standby")?;

    info!("Hardware initialisation complete");

    // ---- LOAD TRAJECTORY ----

    let traj_path = host::get_strider_sw_root()
        .map_err(|_| eyre!("The software root environment variable is not set"))?
        .join(TRAJ_FILE);

    let conv = pos_ctrl
        .file_conversion()
        .ok_or_else(|| eyre!("PosCtrl did not produce a file conversion"))?;

    let table =
        traj::file::load(&traj_path, &conv).wrap_err("Failed to load the trajectory file")?;
    pos_ctrl
        .load_traj_table(table)
        .wrap_err("Failed to load the trajectory table")?;

    info!("Trajectory loaded from {:?}", traj_path);

    // ---- INITIALISE DATASTORE ----

    let num_axes = pos_ctrl.shared().core.axis_vels_rads.len();
    let ds = Arc::new(DataStore::new(num_motors, num_axes));

    // ---- BACKGROUND THREADS ----

    // Battery monitor starts first, the control loop gates on its first
    // reading
    let batt_thread = {
        let monitor = BattMonitor::new(batt_params);
        let adc = board.clone();
        let ds = ds.clone();
        thread::spawn(move || batt::batt_monitor_thread(monitor, adc, ds))
    };

    while ds.batt_volts() < 1.0 && !ds.is_exiting() {
        thread::sleep(Duration::from_millis(10));
    }
    debug!("First battery reading: {:.2} V", ds.batt_volts());

    let cmd_thread = {
        let reader = CmdReader::new(cmd_params);
        let radio = board.clone();
        let ds = ds.clone();
        thread::spawn(move || cmd::cmd_reader_thread(reader, radio, ds))
    };

    let diag_thread = {
        let logger = match &diag_file {
            Some(path) => {
                DiagLogger::to_file(path).wrap_err("Failed to open the diagnostics file")?
            }
            None => DiagLogger::to_terminal(),
        };
        let ds = ds.clone();
        thread::spawn(move || diag::diag_thread(logger, ds))
    };

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    ds.set_run_state(RunState::Running);

    // The tick input is built once and refilled in place each cycle
    let mut input = TickInput {
        t_rel_s: 0.0,
        encoder_counts: vec![0i64; num_motors],
        accel_msq: [0.0; 3],
        gyro_rads: [0.0; 3],
        batt_volts: 0.0,
        armed: false,
        arm_request: false,
    };
    let mut run_error: Option<Report> = None;

    while !ds.is_exiting() {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- DATA INPUT ----

        let tick_result = read_sensors(&mut encoders, &mut imu, &mut input).and_then(|()| {
            input.t_rel_s = session::get_elapsed_seconds() - ds.clock_origin_s();
            input.batt_volts = ds.batt_volts();
            input.armed = ds.arm_state() == ArmState::Armed;
            input.arm_request = ds.take_arm_request();

            // ---- CONTROL ALGORITHM PROCESSING ----

            let (output, _report) = pos_ctrl.proc(&input)?;

            // ---- COMMAND OUTPUT ----

            for ch in 0..num_motors {
                motors.set(ch, pos_ctrl.shared().core.duties[ch])?;
            }

            if let Some(event) = output.event {
                apply_event(event, &ds, &mut encoders, &mut motors, num_motors)?;
            }

            Ok(())
        });

        if let Err(e) = tick_result {
            // All tick failures are safety faults: stop driving and shut
            // down
            error!("Control tick failed: {}", e);
            ds.set_arm_state(ArmState::Disarmed);
            motors.standby(true).ok();
            ds.request_exit();
            run_error = Some(Report::new(e).wrap_err("Control tick failed"));
            break;
        }

        // ---- STATE PUBLICATION ----

        // Field-wise copy that keeps the battery monitor's voltage: a fresh
        // reading may have landed since this tick snapshotted it
        ds.publish(pos_ctrl.shared());

        #[cfg(feature = "sim")]
        board.step_motors(cycle_period_s, SIM_COUNTS_PER_DUTY_SEC);

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match Duration::from_secs_f64(cycle_period_s).checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period_s
                );
            }
        }
    }

    // ---- SHUTDOWN ----

    ds.request_exit();

    join_bounded("diagnostics", diag_thread);
    join_bounded("battery monitor", batt_thread);
    join_bounded("command reader", cmd_thread);

    // Release the actuators whether or not the threads joined
    motors.standby(true).ok();
    for ch in 0..num_motors {
        motors.free_spin(ch).ok();
    }

    info!("End of execution");

    match run_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Read the sensor snapshot for one tick into the reusable input.
fn read_sensors<E: Encoders, I: Imu>(
    encoders: &mut E,
    imu: &mut I,
    input: &mut TickInput,
) -> Result<(), TickError> {
    for (ch, c) in input.encoder_counts.iter_mut().enumerate() {
        *c = encoders.read(ch)?;
    }
    input.accel_msq = imu.read_accel()?;
    input.gyro_rads = imu.read_gyro()?;
    Ok(())
}

/// Act on a state transition raised by the control tick.
fn apply_event<E: Encoders, M: Motors>(
    event: TickEvent,
    ds: &DataStore,
    encoders: &mut E,
    motors: &mut M,
    num_motors: usize,
) -> Result<(), TickError> {
    match event {
        TickEvent::Armed => {
            // Zero the encoder reference points so the run starts from the
            // origin, then enable the drivers
            for ch in 0..num_motors {
                encoders.write(ch, 0)?;
            }
            motors.standby(false)?;
            ds.set_arm_state(ArmState::Armed);
        }
        TickEvent::TrajComplete => {
            info!("Trajectory complete, disarming");
            ds.set_arm_state(ArmState::Disarmed);
            motors.standby(true)?;
            ds.request_exit();
        }
        TickEvent::SaturationDisarm { wheel } => {
            error!("Motor {} saturated, disarming", wheel);
            ds.set_arm_state(ArmState::Disarmed);
            motors.standby(true)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which abort a control tick.
#[derive(Debug, thiserror::Error)]
enum TickError {
    #[error("Hardware access failed: {0}")]
    Hw(#[from] ctrl_lib::hw::HwError),

    #[error("Position control failed: {0}")]
    PosCtrl(#[from] ctrl_lib::pos_ctrl::PosCtrlError),
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Best-effort join: wait up to the timeout, then give up and carry on with
/// shutdown rather than hanging on a stuck thread.
fn join_bounded<T>(name: &str, handle: thread::JoinHandle<T>) {
    let deadline = Instant::now() + THREAD_JOIN_TIMEOUT;

    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("The {} thread did not exit in time", name);
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }

    if handle.join().is_err() {
        warn!("The {} thread panicked", name);
    }
}
