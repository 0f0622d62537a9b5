//! # Diagnostics logger
//!
//! Background task serialising the current state and setpoint to a sink as a
//! fixed-width whitespace-column table. A header row is emitted once per
//! Armed transition; thereafter one row per print tick. When the sink is the
//! terminal each row overwrites the previous one with a carriage return,
//! when it is a file rows are appended so the whole run can be plotted
//! afterwards.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Internal
use crate::data_store::{ArmState, DataStore, SharedState};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Diagnostics print frequency.
///
/// Units: hertz
pub const PRINT_RATE_HZ: f64 = 10.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The diagnostics logger.
pub struct DiagLogger {
    writer: Box<dyn Write + Send>,

    /// Overwrite the previous row in place (terminal sink) rather than
    /// appending one row per line (file sink).
    overwrite_line: bool,

    /// Arm state at the previous update, for edge detection on the header.
    last_armed: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DiagLogger {
    /// Log to stdout, overwriting the row in place.
    pub fn to_terminal() -> Self {
        Self::from_writer(Box::new(io::stdout()), true)
    }

    /// Log to a file, one row per line.
    pub fn to_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::from_writer(Box::new(File::create(path)?), false))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>, overwrite_line: bool) -> Self {
        Self {
            writer,
            overwrite_line,
            last_armed: false,
        }
    }

    /// One print tick: emit the header on a Disarmed to Armed edge, then a
    /// state row for every tick spent armed.
    pub fn update(&mut self, armed: bool, shared: &SharedState) -> io::Result<()> {
        if armed && !self.last_armed {
            self.write_header(shared)?;
        }
        self.last_armed = armed;

        if armed {
            self.write_row(shared)?;
        }

        Ok(())
    }

    fn write_header(&mut self, shared: &SharedState) -> io::Result<()> {
        let w = &mut self.writer;

        write!(w, "    t    ")?;
        for i in 1..=shared.core.wheel_angles_rad.len() {
            write!(w, "  wh_{}   ", i)?;
            write!(w, "  wh_{}s  ", i)?;
        }
        for i in 1..=shared.core.axis_vels_rads.len() {
            write!(w, " v_ax{}_d ", i)?;
        }
        write!(w, "    x    ")?;
        write!(w, "    y    ")?;
        write!(w, "   x_r   ")?;
        write!(w, "   y_r   ")?;
        write!(w, "  theta  ")?;
        for i in 1..=shared.core.duties.len() {
            write!(w, "   d{}_u  ", i)?;
        }
        write!(w, "   a_x   ")?;
        write!(w, "   a_y   ")?;
        write!(w, "theta_dot")?;
        writeln!(w)?;
        w.flush()
    }

    fn write_row(&mut self, shared: &SharedState) -> io::Result<()> {
        let w = &mut self.writer;
        let core = &shared.core;

        if self.overwrite_line {
            write!(w, "\r")?;
        }

        write!(w, "{:7.3}  ", core.t_curr_s)?;
        for (angle, sp) in core
            .wheel_angles_rad
            .iter()
            .zip(shared.setpoint.wheel_angles_rad.iter())
        {
            write!(w, "{:7.3}  ", angle)?;
            write!(w, "{:7.3}  ", sp)?;
        }
        for v in core.axis_vels_rads.iter() {
            write!(w, "{:7.3}  ", v)?;
        }
        write!(w, "{:7.3}  ", core.x_m)?;
        write!(w, "{:7.3}  ", core.y_m)?;
        write!(w, "{:7.3}  ", core.x_r_m)?;
        write!(w, "{:7.3}  ", core.y_r_m)?;
        write!(w, "{:9.5}", core.theta_rad)?;
        for d in core.duties.iter() {
            write!(w, "{:7.3}  ", d)?;
        }
        write!(w, "{:9.5}", core.accel_msq[0])?;
        write!(w, "{:9.5}", core.accel_msq[1])?;
        write!(w, "{:9.5}", core.gyro_rads[2])?;

        if !self.overwrite_line {
            writeln!(w)?;
        }
        w.flush()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Diagnostics thread main. Prints until the data store signals exit.
///
/// Best effort: a sink write failure is logged once per occurrence and the
/// loop keeps running, diagnostics must never take the controller down.
pub fn diag_thread(mut logger: DiagLogger, ds: Arc<DataStore>) {
    let period = Duration::from_secs_f64(1.0 / PRINT_RATE_HZ);

    while !ds.is_exiting() {
        let armed = ds.arm_state() == ArmState::Armed;
        let snapshot = ds.snapshot();

        if let Err(e) = logger.update(armed, &snapshot) {
            warn!("Diagnostics write failed: {}", e);
        }

        thread::sleep(period);
    }

    info!("Diagnostics thread exiting");
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::data_store::{CoreState, Setpoint};
    use std::sync::Mutex;

    /// A writer the test can read back from behind the `Box<dyn Write>`.
    #[derive(Clone)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Vec::new())))
        }

        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn test_shared() -> SharedState {
        let mut shared = SharedState {
            core: CoreState::new(5, 3),
            setpoint: Setpoint::new(5),
        };
        shared.core.t_curr_s = 1.5;
        shared.core.x_m = 0.25;
        shared
    }

    #[test]
    fn test_header_once_per_arm_transition() {
        let buf = SharedBuf::new();
        let mut logger = DiagLogger::from_writer(Box::new(buf.clone()), false);
        let shared = test_shared();

        // Nothing while disarmed
        logger.update(false, &shared).unwrap();
        assert!(buf.contents().is_empty());

        // Arm: header plus one row, then rows only
        logger.update(true, &shared).unwrap();
        logger.update(true, &shared).unwrap();
        let out = buf.contents();
        assert_eq!(out.matches("wh_1s").count(), 1);
        assert_eq!(out.lines().count(), 3);

        // Disarm and re-arm: a fresh header
        logger.update(false, &shared).unwrap();
        logger.update(true, &shared).unwrap();
        assert_eq!(buf.contents().matches("wh_1s").count(), 2);
    }

    #[test]
    fn test_terminal_rows_overwrite_in_place() {
        let buf = SharedBuf::new();
        let mut logger = DiagLogger::from_writer(Box::new(buf.clone()), true);
        let shared = test_shared();

        logger.update(true, &shared).unwrap();
        logger.update(true, &shared).unwrap();

        let out = buf.contents();
        // Each row leads with a carriage return and no trailing newline
        assert_eq!(out.matches('\r').count(), 2);
        assert_eq!(out.matches('\n').count(), 1); // header only
    }

    #[test]
    fn test_row_is_fixed_width() {
        let buf = SharedBuf::new();
        let mut logger = DiagLogger::from_writer(Box::new(buf.clone()), false);

        let mut shared = test_shared();
        logger.update(true, &shared).unwrap();

        shared.core.x_m = -3.125;
        shared.core.duties[2] = -0.5;
        logger.update(true, &shared).unwrap();

        let out = buf.contents();
        let mut lines = out.lines();
        let header = lines.next().unwrap();
        let row_a = lines.next().unwrap();
        let row_b = lines.next().unwrap();
        assert_eq!(header.len(), row_a.len());
        assert_eq!(row_a.len(), row_b.len());
    }
}
