//! Trajectory file loading
//!
//! The file format is produced by the offline trajectory tooling: a header
//! line `rows <n>`, a column-header line, then one row per waypoint of
//! `t x y z` in seconds and metres. Rows are converted at this boundary into
//! the planner's wheel-radian axis targets: x/y are rotated into the omni
//! frame by the mount angle and divided by the drive wheel radius, z is
//! divided by the mast drum radius. Everything downstream of the loader
//! works in wheel radians.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::fs::read_to_string;
use std::path::Path;

// Internal
use super::state::{TrajTable, TrajPlannerError, Waypoint};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of planner axes a trajectory file describes: x_r, y_r, mast.
pub const FILE_NUM_AXES: usize = 3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Geometry needed to convert engineering units to wheel radians.
#[derive(Debug, Clone, Copy)]
pub struct Conversion {
    /// Rotation of the omni axes relative to the global frame, radians.
    pub mount_angle_rad: f64,

    /// Drive wheel radius, metres.
    pub wheel_radius_xy_m: f64,

    /// Mast drum radius, metres.
    pub drum_radius_z_m: f64,

    /// Mast travel above this is a fatal load error, metres.
    pub mast_travel_limit_m: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while loading a trajectory file.
#[derive(Debug, thiserror::Error)]
pub enum TrajFileError {
    #[error("Cannot read the trajectory file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Missing or malformed `rows <n>` header")]
    BadHeader,

    #[error("Header promised {expected} rows, file contains {found}")]
    RowCountMismatch { expected: usize, found: usize },

    #[error("Line {line}: expected 4 columns `t x y z`, found {found}")]
    WrongColumnCount { line: usize, found: usize },

    #[error("Line {line}: cannot parse value `{value}`")]
    BadValue { line: usize, value: String },

    #[error("Row {row}: mast target {z_m} m exceeds the {limit_m} m travel limit")]
    MastTravelExceeded { row: usize, z_m: f64, limit_m: f64 },

    #[error("Invalid trajectory table: {0}")]
    InvalidTable(#[from] TrajPlannerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load and convert a trajectory file.
pub fn load<P: AsRef<Path>>(path: P, conv: &Conversion) -> Result<TrajTable, TrajFileError> {
    let contents = read_to_string(path).map_err(TrajFileError::FileLoadError)?;
    parse(&contents, conv)
}

/// Parse trajectory file contents.
pub fn parse(contents: &str, conv: &Conversion) -> Result<TrajTable, TrajFileError> {
    let mut lines = contents
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    // Header: `rows <n>`. The leading word is not checked, matching the
    // original tooling which accepts any label there.
    let (_, header) = lines.next().ok_or(TrajFileError::BadHeader)?;
    let expected_rows: usize = header
        .split_whitespace()
        .nth(1)
        .and_then(|t| t.parse().ok())
        .ok_or(TrajFileError::BadHeader)?;

    // Column-header line, skipped
    lines.next().ok_or(TrajFileError::BadHeader)?;

    let (sin_a, cos_a) = conv.mount_angle_rad.sin_cos();

    let mut waypoints = Vec::with_capacity(expected_rows);

    for (line_idx, line) in lines {
        let line_no = line_idx + 1;

        let mut values = [0.0f64; 4];
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != values.len() {
            return Err(TrajFileError::WrongColumnCount {
                line: line_no,
                found: tokens.len(),
            });
        }
        for (v, t) in values.iter_mut().zip(tokens.iter()) {
            *v = t.parse().map_err(|_| TrajFileError::BadValue {
                line: line_no,
                value: t.to_string(),
            })?;
        }

        let [t_s, x_m, y_m, z_m] = values;

        if z_m > conv.mast_travel_limit_m {
            return Err(TrajFileError::MastTravelExceeded {
                row: waypoints.len(),
                z_m,
                limit_m: conv.mast_travel_limit_m,
            });
        }

        // Rotate into the omni frame and convert to wheel radians
        let x_r_rad = (x_m * cos_a + y_m * sin_a) / conv.wheel_radius_xy_m;
        let y_r_rad = (-x_m * sin_a + y_m * cos_a) / conv.wheel_radius_xy_m;
        let z_rad = z_m / conv.drum_radius_z_m;

        waypoints.push(Waypoint {
            time_s: t_s,
            axis_targets: vec![x_r_rad, y_r_rad, z_rad],
        });
    }

    if waypoints.len() != expected_rows {
        return Err(TrajFileError::RowCountMismatch {
            expected: expected_rows,
            found: waypoints.len(),
        });
    }

    Ok(TrajTable::new(waypoints, FILE_NUM_AXES)?)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
