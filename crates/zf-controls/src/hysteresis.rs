//! Two-state hysteresis controller.

use crate::controller::{ControllerCore, ControllerStatus, ProcessController};
use crate::error::{ControlError, ControlResult};
use serde::{Deserialize, Serialize};
use tracing::trace;
use zf_core::{Signal, ensure_finite};

/// Output magnitude; `+1.0` when on, `-1.0` when off.
pub const OUTPUT: f64 = 1.0;

/// Sample that produced the output, kept for instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisSample {
    pub sample: f64,
}

pub type HysteresisStatus = ControllerStatus<HysteresisSample>;

/// Goes ON when `pv - high >= setpoint`, goes OFF when `pv - low <= setpoint`.
/// Initial state is OFF.
#[derive(Debug, Clone)]
pub struct HysteresisController {
    core: ControllerCore,
    low: f64,
    high: f64,
    on: bool,
}

impl HysteresisController {
    /// Create a controller with a custom loop.
    ///
    /// # Arguments
    ///
    /// * `low` - Lower tipping point relative to setpoint, must be negative
    /// * `high` - Upper tipping point relative to setpoint, must be positive
    pub fn new(name: impl Into<String>, setpoint: f64, low: f64, high: f64) -> ControlResult<Self> {
        ensure_finite(low, "low threshold")?;
        ensure_finite(high, "high threshold")?;
        if low >= 0.0 {
            return Err(ControlError::InvalidValue {
                what: "low threshold must be negative",
                value: low,
            });
        }
        if high <= 0.0 {
            return Err(ControlError::InvalidValue {
                what: "high threshold must be positive",
                value: high,
            });
        }
        Ok(Self {
            core: ControllerCore::new(name, setpoint)?,
            low,
            high,
            on: false,
        })
    }

    /// Create a controller with a symmetrical loop of `±hysteresis`.
    pub fn symmetric(name: impl Into<String>, setpoint: f64, hysteresis: f64) -> ControlResult<Self> {
        Self::new(name, setpoint, -hysteresis, hysteresis)
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl ProcessController for HysteresisController {
    type Detail = HysteresisSample;

    fn name(&self) -> &str {
        self.core.name()
    }

    fn setpoint(&self) -> f64 {
        self.core.setpoint()
    }

    fn set_setpoint(&mut self, setpoint: f64) -> ControlResult<()> {
        self.core.set_setpoint(setpoint).map(|_| ())
    }

    fn process_variable(&self) -> Option<f64> {
        self.core.process_variable()
    }

    fn error(&self) -> f64 {
        self.core.error()
    }

    fn compute<P: Clone>(&mut self, pv: Signal<f64, P>) -> Signal<HysteresisStatus, P> {
        let pv = match pv.into_failure() {
            Ok(failed) => return failed,
            Err(pv) => pv,
        };
        let Some(&sample) = pv.value() else {
            unreachable!("non-failed signal without a value");
        };
        self.core.record(pv.timestamp(), sample);

        let setpoint = self.core.setpoint();
        let was_on = self.on;

        if self.on {
            if sample - self.low <= setpoint {
                self.on = false;
            }
        } else if sample - self.high >= setpoint {
            self.on = true;
        }

        if was_on != self.on {
            trace!(controller = self.core.name(), from = was_on, to = self.on, "state change");
        }

        pv.with_value(ControllerStatus {
            setpoint,
            error: sample - setpoint,
            signal: if self.on { OUTPUT } else { -OUTPUT },
            detail: HysteresisSample { sample },
        })
    }
}
