//! Trajectory planner state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};

// Internal
use super::{profile, Params};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single row of the trajectory table.
#[derive(Debug, Clone)]
pub struct Waypoint {
    /// Time at which this waypoint shall be reached, seconds from the run
    /// start. Monotonically non-decreasing across the table.
    pub time_s: f64,

    /// Target position per planner axis, wheel radians.
    pub axis_targets: Vec<f64>,
}

/// The ordered waypoint table. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct TrajTable {
    waypoints: Vec<Waypoint>,
}

/// Output of one planner advance. The velocity per axis is read from
/// [`TrajPlanner::axis_vels_rads`], which returns the planner's own buffer
/// so advancing never allocates.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceOutput {
    /// The active segment index.
    pub step: usize,

    /// Active segment start/end times, seconds.
    pub t_1_s: f64,
    pub t_2_s: f64,

    /// True once the final waypoint time has been reached. The caller must
    /// disarm and request shutdown.
    pub complete: bool,
}

/// The trajectory planner.
pub struct TrajPlanner {
    params: Params,

    table: Option<TrajTable>,

    /// Active segment: pursuing `waypoints[step + 1]` from `waypoints[step]`.
    step: usize,

    /// Start time of the active segment, seconds.
    t_1_s: f64,

    /// End time of the active segment, seconds.
    t_2_s: f64,

    complete: bool,

    /// Scratch velocity buffer, sized at load so advance never allocates.
    vels_rads: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by the trajectory planner.
#[derive(Debug, thiserror::Error)]
pub enum TrajPlannerError {
    /// A table must hold at least a start and one destination.
    #[error("Trajectory table has {0} waypoints, at least 2 required")]
    TableTooShort(usize),

    #[error("Waypoint {row} has {found} axis targets, expected {expected}")]
    AxisCountMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Waypoint {row} time {time_s} s is before its predecessor")]
    TimeNotMonotonic { row: usize, time_s: f64 },

    /// Segment times have gone backwards at runtime. Time cannot run
    /// backwards, so this is a fatal safety fault rather than a condition to
    /// ride through with stale state.
    #[error("Segment start time {t_1_s} s is after end time {t_2_s} s")]
    TimeReversal { t_1_s: f64, t_2_s: f64 },

    #[error("No trajectory table has been loaded")]
    NoTable,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajTable {
    /// Build a table from waypoint rows, validating shape and time ordering.
    pub fn new(waypoints: Vec<Waypoint>, num_axes: usize) -> Result<Self, TrajPlannerError> {
        if waypoints.len() < 2 {
            return Err(TrajPlannerError::TableTooShort(waypoints.len()));
        }

        let mut prev_time_s = f64::NEG_INFINITY;
        for (row, wp) in waypoints.iter().enumerate() {
            if wp.axis_targets.len() != num_axes {
                return Err(TrajPlannerError::AxisCountMismatch {
                    row,
                    expected: num_axes,
                    found: wp.axis_targets.len(),
                });
            }
            if wp.time_s < prev_time_s {
                return Err(TrajPlannerError::TimeNotMonotonic {
                    row,
                    time_s: wp.time_s,
                });
            }
            prev_time_s = wp.time_s;
        }

        Ok(Self { waypoints })
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoint(&self, row: usize) -> &Waypoint {
        &self.waypoints[row]
    }
}

impl TrajPlanner {
    pub fn new(params: Params) -> Self {
        let num_axes = params.axes.len();
        Self {
            params,
            table: None,
            step: 0,
            t_1_s: 0.0,
            t_2_s: 0.0,
            complete: false,
            vels_rads: vec![0.0; num_axes],
        }
    }

    pub fn num_axes(&self) -> usize {
        self.params.axes.len()
    }

    /// Desired velocity per axis from the most recent [`advance`], wheel
    /// rad/s. Zero before the first advance of a run.
    ///
    /// [`advance`]: TrajPlanner::advance
    pub fn axis_vels_rads(&self) -> &[f64] {
        &self.vels_rads
    }

    /// Load the waypoint table for this run.
    ///
    /// Validates the table shape against the axis parameters and warns about
    /// any segment whose displacement is infeasible at the configured
    /// acceleration (such segments run as clamped triangular profiles and
    /// undershoot their waypoint).
    pub fn load_table(&mut self, table: TrajTable) -> Result<(), TrajPlannerError> {
        let num_axes = self.params.axes.len();

        // Re-validate against our axis count, the table may have been built
        // elsewhere
        if table.len() < 2 {
            return Err(TrajPlannerError::TableTooShort(table.len()));
        }
        if table.waypoint(0).axis_targets.len() != num_axes {
            return Err(TrajPlannerError::AxisCountMismatch {
                row: 0,
                expected: num_axes,
                found: table.waypoint(0).axis_targets.len(),
            });
        }

        // Feasibility sweep, warn once per offending segment
        for seg in 0..(table.len() - 1) {
            let w0 = table.waypoint(seg);
            let w1 = table.waypoint(seg + 1);
            let dur_s = w1.time_s - w0.time_s;

            for axis in 0..num_axes {
                let disp = w1.axis_targets[axis] - w0.axis_targets[axis];
                let accel = self.axis_accel(axis, disp);
                if dur_s > 0.0 && !profile::is_feasible(dur_s, disp.abs(), accel) {
                    warn!(
                        "Trajectory segment {} axis {} infeasible ({:.3} rad in {:.3} s \
                         at {:.3} rad/s^2), profile will be clamped",
                        seg, axis, disp, dur_s, accel
                    );
                }
            }
        }

        info!(
            "Trajectory table loaded: {} waypoints, {:.3} s total",
            table.len(),
            table.waypoint(table.len() - 1).time_s
        );

        self.t_1_s = table.waypoint(0).time_s;
        self.t_2_s = table.waypoint(1).time_s;
        self.step = 0;
        self.complete = false;
        for v in self.vels_rads.iter_mut() {
            *v = 0.0;
        }
        self.table = Some(table);

        Ok(())
    }

    /// Rewind to the start of the table. Called when the controller arms so
    /// a run always begins at segment zero.
    pub fn reset_run(&mut self) -> Result<(), TrajPlannerError> {
        let table = self.table.as_ref().ok_or(TrajPlannerError::NoTable)?;
        self.t_1_s = table.waypoint(0).time_s;
        self.t_2_s = table.waypoint(1).time_s;
        self.step = 0;
        self.complete = false;
        for v in self.vels_rads.iter_mut() {
            *v = 0.0;
        }
        Ok(())
    }

    /// Advance the planner to `t_rel_s` seconds into the run and compute the
    /// desired velocity per axis.
    ///
    /// Called once per control tick while armed. Once the final waypoint
    /// time has been reached every subsequent call reports completion with
    /// zero velocities.
    pub fn advance(&mut self, t_rel_s: f64) -> Result<AdvanceOutput, TrajPlannerError> {
        let table = self.table.as_ref().ok_or(TrajPlannerError::NoTable)?;

        if self.complete {
            return Ok(self.output(true));
        }

        // Desired waypoint is step + 1, current (previous) is step
        if self.step + 2 < table.len() {
            // Not yet aiming for the final destination: move the segment on
            // if its end time has been passed
            if t_rel_s >= table.waypoint(self.step + 1).time_s {
                self.step += 1;
                self.t_1_s = table.waypoint(self.step).time_s;
                self.t_2_s = table.waypoint(self.step + 1).time_s;
            }
        } else {
            // Aiming for the final destination
            if t_rel_s >= table.waypoint(self.step + 1).time_s {
                info!("Final trajectory waypoint reached");
                self.complete = true;
                for v in self.vels_rads.iter_mut() {
                    *v = 0.0;
                }
                return Ok(self.output(true));
            }
        }

        // Check times make sense. Promoted to a hard fault: continuing here
        // would integrate the setpoint from a stale profile.
        if self.t_1_s > self.t_2_s {
            return Err(TrajPlannerError::TimeReversal {
                t_1_s: self.t_1_s,
                t_2_s: self.t_2_s,
            });
        }

        // Time since the beginning of the current maneuver
        let t_test_s = t_rel_s - self.t_1_s;
        let dur_s = self.t_2_s - self.t_1_s;

        let w0 = table.waypoint(self.step);
        let w1 = table.waypoint(self.step + 1);

        for axis in 0..self.vels_rads.len() {
            let disp = w1.axis_targets[axis] - w0.axis_targets[axis];
            let accel = self.axis_accel(axis, disp);
            self.vels_rads[axis] = profile::velocity(t_test_s, dur_s, disp, accel);
        }

        Ok(self.output(false))
    }

    /// Acceleration magnitude for an axis given the sign of its
    /// displacement.
    fn axis_accel(&self, axis: usize, displacement: f64) -> f64 {
        let ap = &self.params.axes[axis];
        if displacement >= 0.0 {
            ap.accel_pos_rads2
        } else {
            ap.accel_neg_rads2
        }
    }

    fn output(&self, complete: bool) -> AdvanceOutput {
        AdvanceOutput {
            step: self.step,
            t_1_s: self.t_1_s,
            t_2_s: self.t_2_s,
            complete,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::traj::params::AxisParams;

    fn sym_axis(accel: f64) -> AxisParams {
        AxisParams {
            accel_pos_rads2: accel,
            accel_neg_rads2: accel,
        }
    }

    fn three_axis_params(accel: f64) -> Params {
        Params {
            axes: vec![sym_axis(accel); 3],
            mast_travel_limit_m: 1.0,
        }
    }

    fn waypoint(time_s: f64, targets: [f64; 3]) -> Waypoint {
        Waypoint {
            time_s,
            axis_targets: targets.to_vec(),
        }
    }

    /// The end-to-end scenario: {(0,0,0,0), (10,1,0,0), (20,0.5,0,0)} at
    /// a_max = 0.5. Integrating the planner's velocity must land on each
    /// target at its waypoint time, and the run must complete after 20 s.
    #[test]
    fn test_three_row_scenario() {
        let mut planner = TrajPlanner::new(three_axis_params(0.5));
        let table = TrajTable::new(
            vec![
                waypoint(0.0, [0.0, 0.0, 0.0]),
                waypoint(10.0, [1.0, 0.0, 0.0]),
                waypoint(20.0, [0.5, 0.0, 0.0]),
            ],
            3,
        )
        .unwrap();
        planner.load_table(table).unwrap();

        let dt = 0.001;
        let mut pos = 0.0;
        let mut completed_at = None;

        let mut t = 0.0;
        while t < 25.0 {
            // Midpoint sampling for an accurate integral
            let out = planner.advance(t + dt / 2.0).unwrap();
            if out.complete {
                completed_at = Some(t);
                break;
            }
            pos += planner.axis_vels_rads()[0] * dt;

            // Position check at the waypoint times
            if (t - 10.0).abs() < dt / 2.0 {
                assert!((pos - 1.0).abs() < 1e-2, "t=10: pos = {}", pos);
                assert_eq!(out.step, 1);
            }

            t += dt;
        }

        let completed_at = completed_at.expect("run never completed");
        assert!((completed_at - 20.0).abs() < 2.0 * dt);
        assert!((pos - 0.5).abs() < 1e-2, "t=20: pos = {}", pos);
    }

    #[test]
    fn test_completion_is_latched_and_zero() {
        let mut planner = TrajPlanner::new(three_axis_params(0.5));
        planner
            .load_table(
                TrajTable::new(
                    vec![waypoint(0.0, [0.0; 3]), waypoint(1.0, [0.5, 0.0, 0.0])],
                    3,
                )
                .unwrap(),
            )
            .unwrap();

        let out = planner.advance(1.5).unwrap();
        assert!(out.complete);
        assert!(planner.axis_vels_rads().iter().all(|&v| v == 0.0));

        // Stays complete on subsequent ticks
        let out = planner.advance(2.0).unwrap();
        assert!(out.complete);
    }

    #[test]
    fn test_step_monotonic_and_bounded() {
        let mut planner = TrajPlanner::new(three_axis_params(5.0));
        planner
            .load_table(
                TrajTable::new(
                    vec![
                        waypoint(0.0, [0.0; 3]),
                        waypoint(1.0, [0.1, 0.0, 0.0]),
                        waypoint(2.0, [0.2, 0.0, 0.0]),
                        waypoint(3.0, [0.3, 0.0, 0.0]),
                    ],
                    3,
                )
                .unwrap(),
            )
            .unwrap();

        let mut last_step = 0;
        let mut t = 0.0;
        while t < 2.9 {
            let out = planner.advance(t).unwrap();
            assert!(out.step >= last_step);
            assert!(out.step <= 2);
            last_step = out.step;
            t += 0.05;
        }
        assert_eq!(last_step, 2);
    }

    #[test]
    fn test_short_table_rejected() {
        assert!(matches!(
            TrajTable::new(vec![waypoint(0.0, [0.0; 3])], 3),
            Err(TrajPlannerError::TableTooShort(1))
        ));
    }

    #[test]
    fn test_non_monotonic_times_rejected() {
        assert!(matches!(
            TrajTable::new(
                vec![
                    waypoint(0.0, [0.0; 3]),
                    waypoint(10.0, [1.0, 0.0, 0.0]),
                    waypoint(5.0, [0.5, 0.0, 0.0]),
                ],
                3
            ),
            Err(TrajPlannerError::TimeNotMonotonic { row: 2, .. })
        ));
    }

    #[test]
    fn test_asymmetric_mast_accel() {
        let mut params = three_axis_params(0.5);
        params.axes[2] = AxisParams {
            accel_pos_rads2: 0.5,
            accel_neg_rads2: 0.1,
        };
        let mut planner = TrajPlanner::new(params);
        planner
            .load_table(
                TrajTable::new(
                    vec![
                        waypoint(0.0, [0.0, 0.0, 1.0]),
                        waypoint(10.0, [0.0, 0.0, 0.0]),
                    ],
                    3,
                )
                .unwrap(),
            )
            .unwrap();

        // Driving down uses the lower magnitude: v(1s) = -0.1 * 1
        planner.advance(1.0).unwrap();
        assert!((planner.axis_vels_rads()[2] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_advance_reuses_velocity_buffer() {
        let mut planner = TrajPlanner::new(three_axis_params(0.5));
        planner
            .load_table(
                TrajTable::new(
                    vec![waypoint(0.0, [0.0; 3]), waypoint(10.0, [1.0, 0.0, 0.0])],
                    3,
                )
                .unwrap(),
            )
            .unwrap();

        let buf_ptr = planner.axis_vels_rads().as_ptr();
        for i in 0..20 {
            planner.advance(0.1 * i as f64).unwrap();
        }
        planner.reset_run().unwrap();
        planner.advance(0.5).unwrap();
        assert_eq!(planner.axis_vels_rads().as_ptr(), buf_ptr);
    }

    #[test]
    fn test_advance_without_table_errors() {
        let mut planner = TrajPlanner::new(three_axis_params(0.5));
        assert!(matches!(
            planner.advance(0.0),
            Err(TrajPlannerError::NoTable)
        ));
    }
}
