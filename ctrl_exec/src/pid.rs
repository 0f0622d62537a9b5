//! # PID bank
//!
//! One discrete PID filter per motor axis, marched at the fixed control
//! period. The derivative path is low-passed with a corner at four sample
//! periods to keep encoder quantisation noise out of the output, and the
//! whole filter is scaled by an outer gain which is rescaled every tick
//! against the measured battery voltage, so that the commanded torque tracks
//! a voltage-independent target as the battery sags.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use serde::Deserialize;

// Internal
use util::maths::clamp;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Duty magnitude above which an axis is considered saturated.
pub const SATURATION_THRESHOLD: f64 = 0.95;

/// Measured voltages at or below this are treated as a broken reading and the
/// gain rescale is skipped rather than dividing by them.
const VOLTAGE_EPSILON: f64 = 0.1;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tuning for a single axis filter, loaded from the position controller's
/// parameter file.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PidGains {
    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64,

    /// Outer gain applied to the whole filter, the term rescaled for battery
    /// sag.
    pub gain: f64,
}

/// A discrete PID filter with a fixed sample period.
#[derive(Debug, Clone)]
pub struct PidFilter {
    gains: PidGains,

    /// Effective outer gain after battery compensation.
    gain: f64,

    /// Sample period, seconds.
    dt_s: f64,

    /// Derivative low-pass time constant, seconds.
    tau_s: f64,

    /// The integral accumulation
    integral: f64,

    /// Previous error, `None` until the first march after a reset.
    prev_error: Option<f64>,

    /// Filtered derivative state.
    deriv_filt: f64,

    /// Consecutive ticks the output has exceeded the saturation threshold.
    sat_counter: u64,
}

/// The fixed set of filters, one per motor axis.
#[derive(Debug, Clone)]
pub struct PidBank {
    filters: Vec<PidFilter>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidFilter {
    /// Create a new filter with the given gains and sample period.
    ///
    /// The derivative low-pass corner is fixed at `4 * dt_s`.
    pub fn new(gains: PidGains, dt_s: f64) -> Self {
        Self {
            gains,
            gain: gains.gain,
            dt_s,
            tau_s: 4.0 * dt_s,
            integral: 0.0,
            prev_error: None,
            deriv_filt: 0.0,
            sat_counter: 0,
        }
    }

    /// Clear the filter's memory: integrator, derivative state and
    /// saturation counter.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
        self.deriv_filt = 0.0;
        self.sat_counter = 0;
        self.gain = self.gains.gain;
    }

    /// Rescale the outer gain to compensate for battery sag.
    ///
    /// An implausibly low measured voltage leaves the configured gain in
    /// place rather than dividing by it.
    pub fn rescale_gain(&mut self, nominal_volts: f64, measured_volts: f64) {
        if measured_volts <= VOLTAGE_EPSILON {
            warn!(
                "PID gain rescale skipped, measured voltage {:.2} V implausible",
                measured_volts
            );
            self.gain = self.gains.gain;
        } else {
            self.gain = self.gains.gain * nominal_volts / measured_volts;
        }
    }

    /// March the filter one sample period with the given error, returning
    /// the duty-fraction output in `[-1, 1]`.
    pub fn march(&mut self, error: f64) -> f64 {
        // Accumulate the integral term
        self.integral += error * self.dt_s;

        // Raw derivative. On the first march after a reset there is no
        // previous error, and assuming zero avoids a spike against a stale
        // setpoint.
        let raw_deriv = match self.prev_error {
            Some(e) => (error - e) / self.dt_s,
            None => 0.0,
        };

        // First-order low-pass on the derivative, corner at tau_s
        let alpha = self.dt_s / (self.tau_s + self.dt_s);
        self.deriv_filt += alpha * (raw_deriv - self.deriv_filt);

        let out = self.gain
            * (self.gains.k_p * error
                + self.gains.k_i * self.integral
                + self.gains.k_d * self.deriv_filt);

        let out = clamp(&out, &-1.0, &1.0);

        // Track persistent saturation
        if out.abs() > SATURATION_THRESHOLD {
            self.sat_counter += 1;
        } else {
            self.sat_counter = 0;
        }

        self.prev_error = Some(error);

        out
    }

    /// True if the output has been saturated for at least `limit_ticks`
    /// consecutive marches.
    pub fn saturated_for(&self, limit_ticks: u64) -> bool {
        self.sat_counter >= limit_ticks
    }

    /// The integral accumulation, exposed for tests.
    #[cfg(test)]
    pub(crate) fn integral(&self) -> f64 {
        self.integral
    }
}

impl PidBank {
    /// Build the bank from per-axis gain sets.
    pub fn new(gains: &[PidGains], dt_s: f64) -> Self {
        Self {
            filters: gains.iter().map(|g| PidFilter::new(*g, dt_s)).collect(),
        }
    }

    pub fn num_axes(&self) -> usize {
        self.filters.len()
    }

    /// Reset every filter's memory. Invoked on the Disarmed to Armed
    /// transition.
    pub fn reset_all(&mut self) {
        for f in self.filters.iter_mut() {
            f.reset();
        }
    }

    /// Rescale every filter's gain against the measured battery voltage.
    pub fn rescale_gains(&mut self, nominal_volts: f64, measured_volts: f64) {
        for f in self.filters.iter_mut() {
            f.rescale_gain(nominal_volts, measured_volts);
        }
    }

    /// March the filter for `axis` with error `target - measured`.
    pub fn march(&mut self, axis: usize, target: f64, measured: f64) -> f64 {
        self.filters[axis].march(target - measured)
    }

    /// Index of the first axis saturated for at least `limit_ticks`, if any.
    pub fn first_saturated(&self, limit_ticks: u64) -> Option<usize> {
        self.filters
            .iter()
            .position(|f| f.saturated_for(limit_ticks))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const DT: f64 = 0.01;

    fn p_only(k_p: f64) -> PidGains {
        PidGains {
            k_p,
            k_i: 0.0,
            k_d: 0.0,
            gain: 1.0,
        }
    }

    #[test]
    fn test_output_clamped() {
        let mut f = PidFilter::new(p_only(100.0), DT);
        assert_eq!(f.march(10.0), 1.0);
        assert_eq!(f.march(-10.0), -1.0);
    }

    #[test]
    fn test_saturation_counter_boundary() {
        // P-only filter held at |out| = 0.96: must not trip at N-1
        // consecutive marches, must trip at N.
        let n: u64 = 100;
        let mut f = PidFilter::new(p_only(1.0), DT);

        for _ in 0..(n - 1) {
            let out = f.march(0.96);
            assert!((out - 0.96).abs() < 1e-12);
        }
        assert!(!f.saturated_for(n));

        f.march(0.96);
        assert!(f.saturated_for(n));
    }

    #[test]
    fn test_saturation_counter_clears_below_threshold() {
        let mut f = PidFilter::new(p_only(1.0), DT);
        for _ in 0..50 {
            f.march(0.96);
        }
        // One tick below the threshold resets the count
        f.march(0.5);
        f.march(0.96);
        assert!(!f.saturated_for(3));
    }

    #[test]
    fn test_reset_clears_memory() {
        let mut f = PidFilter::new(
            PidGains {
                k_p: 1.0,
                k_i: 1.0,
                k_d: 1.0,
                gain: 1.0,
            },
            DT,
        );
        for _ in 0..10 {
            f.march(0.5);
        }
        assert!(f.integral() > 0.0);

        f.reset();
        assert_eq!(f.integral(), 0.0);
        // First march after reset has no derivative kick
        let out = f.march(0.1);
        assert!((out - (0.1 + 0.1 * DT)).abs() < 1e-12);
    }

    #[test]
    fn test_battery_compensation() {
        let mut f = PidFilter::new(p_only(1.0), DT);

        // Half the nominal voltage doubles the effective gain
        f.rescale_gain(12.0, 6.0);
        let out = f.march(0.25);
        assert!((out - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_battery_compensation_guards_low_voltage() {
        let mut f = PidFilter::new(p_only(1.0), DT);
        f.rescale_gain(12.0, 0.0);
        let out = f.march(0.25);
        assert!((out - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_bank_march_sign_convention() {
        let mut bank = PidBank::new(&[p_only(1.0), p_only(1.0)], DT);
        // Error is target - measured
        let out = bank.march(0, 0.5, 0.2);
        assert!((out - 0.3).abs() < 1e-12);
        let out = bank.march(1, 0.2, 0.5);
        assert!((out + 0.3).abs() < 1e-12);
    }
}
