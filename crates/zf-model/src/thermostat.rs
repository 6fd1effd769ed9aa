//! Thermostat: PID controller rendered into a calling/not calling verdict.

use crate::error::{ModelError, ModelResult};
use crate::status::CallingStatus;
use serde::{Deserialize, Serialize};
use tracing::{info, trace};
use zf_controls::{HysteresisController, PidConfig, PidController, PidStatus, ProcessController};
use zf_core::Signal;

/// Renderer band. Not to be tuned: change the PID gains instead.
const HYSTERESIS: f64 = 1.0;

/// Inclusive setpoint bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointRange {
    pub min: f64,
    pub max: f64,
}

impl SetpointRange {
    pub fn new(min: f64, max: f64) -> ModelResult<Self> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(ModelError::InvalidArg {
                what: "setpoint range must be finite with min < max",
            });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, setpoint: f64) -> bool {
        (self.min..=self.max).contains(&setpoint)
    }

    pub fn check(&self, setpoint: f64) -> ModelResult<()> {
        if self.contains(setpoint) {
            Ok(())
        } else {
            Err(ModelError::SetpointOutOfRange {
                setpoint,
                min: self.min,
                max: self.max,
            })
        }
    }
}

impl Default for SetpointRange {
    fn default() -> Self {
        Self {
            min: 10.0,
            max: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatConfig {
    pub range: SetpointRange,
    pub pid: PidConfig,
}

/// Computes the calling status of one zone.
///
/// The sign of the PID gains defines the mode: positive for cooling,
/// negative for heating.
#[derive(Debug, Clone)]
pub struct Thermostat {
    name: String,
    range: SetpointRange,
    controller: PidController,
    renderer: HysteresisController,
    last_pid: Option<PidStatus>,
}

impl Thermostat {
    /// # Arguments
    ///
    /// * `setpoint` - Initial setpoint, must be within `config.range`
    pub fn new(name: impl Into<String>, setpoint: f64, config: ThermostatConfig) -> ModelResult<Self> {
        let name = name.into();
        config.range.check(setpoint)?;
        Ok(Self {
            controller: PidController::new(format!("(controller) {name}"), setpoint, config.pid)?,
            renderer: HysteresisController::symmetric(format!("(renderer) {name}"), 0.0, HYSTERESIS)?,
            range: config.range,
            name,
            last_pid: None,
        })
    }

    /// Thermostat with the default 10..40 range.
    pub fn with_gains(name: impl Into<String>, setpoint: f64, p: f64, i: f64, d: f64, limit: f64) -> ModelResult<Self> {
        Self::new(
            name,
            setpoint,
            ThermostatConfig {
                range: SetpointRange::default(),
                pid: PidConfig::new(p, i, d, limit),
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> SetpointRange {
        self.range
    }

    pub fn setpoint(&self) -> f64 {
        self.controller.setpoint()
    }

    /// Fails right away if the setpoint is outside the range.
    pub fn set_setpoint(&mut self, setpoint: f64) -> ModelResult<()> {
        self.range.check(setpoint)?;
        self.controller.set_setpoint(setpoint)?;
        info!(thermostat = %self.name, setpoint, "setpoint set");
        Ok(())
    }

    /// Last PID status, for instrumentation.
    pub fn last_pid(&self) -> Option<&PidStatus> {
        self.last_pid.as_ref()
    }

    /// Process one temperature sample.
    ///
    /// Demand is the PID signal shifted by the renderer band, so a thermostat
    /// that just started calling reads about the band width. A failed sample
    /// yields a failure: no demand, not calling.
    ///
    /// # Panics
    ///
    /// If the sample is not newer than the previous healthy one.
    pub fn compute<P: Clone>(&mut self, pv: Signal<f64, P>) -> Signal<CallingStatus, P> {
        let pid = match self.controller.compute(pv).into_failure() {
            Ok(failed) => return failed,
            Err(pid) => pid,
        };
        let Some(pid_status) = pid.value().cloned() else {
            unreachable!("non-failed signal without a value");
        };
        trace!(thermostat = %self.name, %pid_status, "controller");

        let rendered = self.renderer.compute(pid.map(|s| s.signal));
        let Some(hysteresis) = rendered.value() else {
            unreachable!("non-failed signal without a value");
        };
        trace!(thermostat = %self.name, %hysteresis, "renderer");

        let calling = CallingStatus {
            sample: Some(hysteresis.detail.sample),
            demand: pid_status.signal - self.renderer.low(),
            calling: hysteresis.signal == 1.0,
        };
        self.last_pid = Some(pid_status);
        rendered.with_value(calling)
    }
}
