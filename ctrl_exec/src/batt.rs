//! # Battery monitor
//!
//! Background task slow-polling the battery ADC. The voltage feeds the PID
//! gain compensation, so a garbage reading must never propagate: anything
//! outside the plausible range is replaced with the nominal pack voltage.
//! The control loop gates its startup on the first value this task publishes.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Internal
use crate::data_store::DataStore;
use crate::hw::{BattAdc, HwError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the battery monitor.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Voltage poll frequency.
    ///
    /// Units: hertz
    pub poll_rate_hz: f64,

    /// Readings outside this range are implausible and replaced with the
    /// nominal voltage.
    ///
    /// Units: volts
    pub plausible_min_volts: f64,
    pub plausible_max_volts: f64,

    /// Fallback voltage substituted for implausible readings.
    ///
    /// Units: volts
    pub nominal_volts: f64,
}

/// Battery monitor state.
pub struct BattMonitor {
    params: Params,

    /// Whether the previous reading was implausible, so the substitution is
    /// logged on the transition rather than every poll.
    substituting: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BattMonitor {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            substituting: false,
        }
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.params.poll_rate_hz)
    }

    /// One poll of the battery ADC, publishing the (possibly substituted)
    /// voltage into the data store.
    pub fn check_once<A: BattAdc>(
        &mut self,
        adc: &mut A,
        ds: &DataStore,
    ) -> Result<(), HwError> {
        let raw = adc.read_volts()?;
        ds.set_batt_volts(self.plausible_or_nominal(raw));
        Ok(())
    }

    fn plausible_or_nominal(&mut self, raw: f64) -> f64 {
        if raw < self.params.plausible_min_volts || raw > self.params.plausible_max_volts {
            if !self.substituting {
                warn!(
                    "Battery reading {:.2} V implausible, substituting nominal {:.2} V",
                    raw, self.params.nominal_volts
                );
                self.substituting = true;
            }
            self.params.nominal_volts
        } else {
            self.substituting = false;
            raw
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Battery monitor thread main. Polls until the data store signals exit.
///
/// An ADC read failure is treated the same as an implausible reading: the
/// nominal voltage is published and the poll continues.
pub fn batt_monitor_thread<A: BattAdc>(mut monitor: BattMonitor, mut adc: A, ds: Arc<DataStore>) {
    let period = monitor.poll_period();

    while !ds.is_exiting() {
        if let Err(e) = monitor.check_once(&mut adc, &ds) {
            warn!("Battery ADC read failed ({}), using nominal voltage", e);
            ds.set_batt_volts(monitor.params.nominal_volts);
        }

        thread::sleep(period);
    }

    info!("Battery monitor thread exiting");
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(all(test, feature = "sim"))]
mod test {
    use super::*;
    use crate::hw::sim::SimBoard;

    fn test_params() -> Params {
        Params {
            poll_rate_hz: 5.0,
            plausible_min_volts: 10.0,
            plausible_max_volts: 13.0,
            nominal_volts: 12.0,
        }
    }

    #[test]
    fn test_plausible_reading_published() {
        let mut monitor = BattMonitor::new(test_params());
        let mut board = SimBoard::new(5, 8);
        let ds = DataStore::new(5, 3);

        board.with_inner(|inner| inner.batt_volts = 11.4);
        monitor.check_once(&mut board, &ds).unwrap();
        assert_eq!(ds.batt_volts(), 11.4);
    }

    #[test]
    fn test_implausible_reading_substituted() {
        let mut monitor = BattMonitor::new(test_params());
        let mut board = SimBoard::new(5, 8);
        let ds = DataStore::new(5, 3);

        // ADC stuck at zero, e.g. harness unplugged
        board.with_inner(|inner| inner.batt_volts = 0.0);
        monitor.check_once(&mut board, &ds).unwrap();
        assert_eq!(ds.batt_volts(), 12.0);

        // Over-range is substituted too
        board.with_inner(|inner| inner.batt_volts = 26.1);
        monitor.check_once(&mut board, &ds).unwrap();
        assert_eq!(ds.batt_volts(), 12.0);

        // Recovery passes the real reading through again
        board.with_inner(|inner| inner.batt_volts = 12.6);
        monitor.check_once(&mut board, &ds).unwrap();
        assert_eq!(ds.batt_volts(), 12.6);
    }
}
