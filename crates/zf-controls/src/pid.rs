//! PID controller with anti-windup.

use crate::controller::{ControllerCore, ControllerStatus, ProcessController};
use crate::error::{ControlError, ControlResult};
use crate::sliding::{SlidingDerivative, SlidingIntegral};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};
use zf_core::{Signal, ensure_finite};

/// Default integration window.
pub const DEFAULT_INTEGRAL_SPAN: Duration = Duration::from_secs(30 * 60);

/// Default differentiation window. Shorter than any realistic sensor
/// interval, so the derivative is the slope between the last two samples.
pub const DEFAULT_DERIVATIVE_SPAN: Duration = Duration::from_secs(1);

/// Individual PID components of the last output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidTerms {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

pub type PidStatus = ControllerStatus<PidTerms>;

/// PID controller configuration.
///
/// Gains are per second: the integral is in error-seconds, the derivative is
/// the slope of the process variable per second. A setpoint step does not
/// move the D term.
#[derive(Debug, Clone, PartialEq)]
pub struct PidConfig {
    /// Proportional gain.
    pub p: f64,
    /// Integral gain.
    pub i: f64,
    /// Derivative gain.
    pub d: f64,
    /// Saturation limit for anti-windup. Zero disables anti-windup.
    pub limit: f64,
    /// Integration window.
    pub integral_span: Duration,
    /// Differentiation window.
    pub derivative_span: Duration,
    /// Drop the accumulated integral when the setpoint changes.
    pub reset_on_setpoint_change: bool,
}

impl PidConfig {
    /// Create a configuration with default windows.
    ///
    /// # Arguments
    ///
    /// * `p` - Proportional gain
    /// * `i` - Integral gain
    /// * `d` - Derivative gain
    /// * `limit` - Saturation limit, zero to disable anti-windup
    pub fn new(p: f64, i: f64, d: f64, limit: f64) -> Self {
        Self {
            p,
            i,
            d,
            limit,
            integral_span: DEFAULT_INTEGRAL_SPAN,
            derivative_span: DEFAULT_DERIVATIVE_SPAN,
            reset_on_setpoint_change: true,
        }
    }

    pub fn with_integral_span(mut self, span: Duration) -> Self {
        self.integral_span = span;
        self
    }

    pub fn with_derivative_span(mut self, span: Duration) -> Self {
        self.derivative_span = span;
        self
    }

    pub fn with_reset_on_setpoint_change(mut self, reset: bool) -> Self {
        self.reset_on_setpoint_change = reset;
        self
    }

    pub fn validate(&self) -> ControlResult<()> {
        ensure_finite(self.p, "P")?;
        ensure_finite(self.i, "I")?;
        ensure_finite(self.d, "D")?;
        ensure_finite(self.limit, "saturation limit")?;
        if self.p == 0.0 && self.i == 0.0 && self.d == 0.0 {
            return Err(ControlError::InvalidArg {
                what: "all PID components are zeroed",
            });
        }
        if self.limit < 0.0 {
            return Err(ControlError::InvalidValue {
                what: "saturation limit must be non-negative",
                value: self.limit,
            });
        }
        if self.integral_span.is_zero() {
            return Err(ControlError::InvalidArg {
                what: "integral span must be positive",
            });
        }
        Ok(())
    }
}

/// Stateful PID controller.
///
/// Per step: `error = pv - setpoint`, `P = error * p`, `I` from the sliding
/// trapezoidal integral of the error, `D` from the sliding slope of the
/// process variable (so setpoint changes don't kick the output).
///
/// Anti-windup: while the previous output's magnitude is at or above the
/// saturation limit, the integral term stays frozen at its last value. It is
/// also held if updating it would put the term itself past the limit.
#[derive(Debug, Clone)]
pub struct PidController {
    core: ControllerCore,
    config: PidConfig,
    integral: SlidingIntegral,
    derivative: SlidingDerivative,
    last_output: Option<f64>,
    terms: PidTerms,
}

impl PidController {
    pub fn new(name: impl Into<String>, setpoint: f64, config: PidConfig) -> ControlResult<Self> {
        config.validate()?;
        Ok(Self {
            core: ControllerCore::new(name, setpoint)?,
            integral: SlidingIntegral::new(config.integral_span),
            derivative: SlidingDerivative::new(config.derivative_span),
            config,
            last_output: None,
            terms: PidTerms::default(),
        })
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    pub fn set_p(&mut self, p: f64) -> ControlResult<()> {
        self.reconfigure(PidConfig { p, ..self.config.clone() })
    }

    pub fn set_i(&mut self, i: f64) -> ControlResult<()> {
        self.reconfigure(PidConfig { i, ..self.config.clone() })
    }

    pub fn set_d(&mut self, d: f64) -> ControlResult<()> {
        self.reconfigure(PidConfig { d, ..self.config.clone() })
    }

    pub fn set_limit(&mut self, limit: f64) -> ControlResult<()> {
        self.reconfigure(PidConfig {
            limit,
            ..self.config.clone()
        })
    }

    pub fn set_reset_on_setpoint_change(&mut self, reset: bool) {
        self.config.reset_on_setpoint_change = reset;
    }

    fn reconfigure(&mut self, config: PidConfig) -> ControlResult<()> {
        config.validate()?;
        debug!(controller = self.core.name(), ?config, "reconfigured");
        self.config = config;
        Ok(())
    }

    /// Current integral term.
    pub fn integral(&self) -> f64 {
        self.terms.i
    }

    pub fn terms(&self) -> PidTerms {
        self.terms
    }

    pub fn last_output(&self) -> Option<f64> {
        self.last_output
    }

    fn update_integral(&mut self, timestamp: zf_core::Timestamp, error: f64) {
        let PidConfig { i, limit, .. } = self.config;

        if limit == 0.0 {
            self.terms.i = self.integral.append(timestamp, error) * i;
            return;
        }

        match self.last_output {
            Some(output) if output.abs() < limit => {
                let integral = self.integral.append(timestamp, error) * i;
                // Holding a saturated integral is not perfect, but predictable
                if integral.abs() < limit {
                    self.terms.i = integral;
                }
            }
            // Saturated, or no output yet: keep the window moving, but don't accumulate
            _ => {
                self.integral.append(timestamp, 0.0);
            }
        }
    }
}

impl ProcessController for PidController {
    type Detail = PidTerms;

    fn name(&self) -> &str {
        self.core.name()
    }

    fn setpoint(&self) -> f64 {
        self.core.setpoint()
    }

    fn set_setpoint(&mut self, setpoint: f64) -> ControlResult<()> {
        if self.core.set_setpoint(setpoint)? && self.config.reset_on_setpoint_change {
            debug!(controller = self.core.name(), setpoint, "setpoint changed, integral reset");
            self.integral.reset();
            self.terms.i = 0.0;
        }
        Ok(())
    }

    fn process_variable(&self) -> Option<f64> {
        self.core.process_variable()
    }

    fn error(&self) -> f64 {
        self.core.error()
    }

    /// # Panics
    ///
    /// If the sample is not strictly newer than the previous one, or if the
    /// output evaluates to NaN. Both mean the pipeline is wired incorrectly.
    fn compute<P: Clone>(&mut self, pv: Signal<f64, P>) -> Signal<PidStatus, P> {
        let pv = match pv.into_failure() {
            Ok(failed) => return failed,
            Err(pv) => pv,
        };
        let Some(&value) = pv.value() else {
            unreachable!("non-failed signal without a value");
        };
        let timestamp = pv.timestamp();

        if let Some(last) = self.core.last_timestamp() {
            assert!(
                timestamp > last,
                "{}: can't go back in time: last sample @{last}, this one @{timestamp}",
                self.core.name()
            );
        }
        self.core.record(timestamp, value);

        let setpoint = self.core.setpoint();
        let error = value - setpoint;

        self.terms.p = error * self.config.p;
        self.update_integral(timestamp, error);

        // Equal timestamps can't get past the check above, but a window
        // collapsing to zero width still must not poison the output
        let slope = self.derivative.append(timestamp, value);
        self.terms.d = if slope.is_finite() {
            slope * self.config.d
        } else {
            0.0
        };

        let signal = self.terms.p + self.terms.i + self.terms.d;
        assert!(
            !signal.is_nan(),
            "{}: signal is NaN, components: {:?}",
            self.core.name(),
            self.terms
        );

        self.last_output = Some(signal);
        trace!(controller = self.core.name(), error, signal, terms = ?self.terms, "computed");

        pv.with_value(ControllerStatus {
            setpoint,
            error,
            signal,
            detail: self.terms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use zf_core::{SignalError, Timestamp};

    fn ts(secs: i64) -> Timestamp {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn sample(secs: i64, value: f64) -> Signal<f64> {
        Signal::new(ts(secs), value)
    }

    #[test]
    fn proportional_only_follows_input() {
        let mut pid = PidController::new("simple", 0.0, PidConfig::new(1.0, 0.0, 0.0, 0.0)).unwrap();
        for (i, v) in [0.3, -1.5, 7.25, 0.0].into_iter().enumerate() {
            let out = pid.compute(sample(i as i64, v));
            assert_eq!(out.value().unwrap().signal, v);
        }
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(PidController::new("z", 20.0, PidConfig::new(0.0, 0.0, 0.0, 0.0)).is_err());
        assert!(PidController::new("n", 20.0, PidConfig::new(1.0, 0.0, 0.0, -1.0)).is_err());
        assert!(PidController::new("nan", 20.0, PidConfig::new(f64::NAN, 0.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn setters_validate() {
        let mut pid = PidController::new("s", 20.0, PidConfig::new(1.0, 0.0, 0.0, 0.0)).unwrap();
        assert!(pid.set_p(0.0).is_err());
        assert_eq!(pid.config().p, 1.0);
        assert!(pid.set_limit(-0.5).is_err());
        pid.set_i(0.5).unwrap();
        pid.set_p(0.0).unwrap();
        assert_eq!(pid.config().i, 0.5);
    }

    #[test]
    fn integral_accumulates_then_freezes_when_saturated() {
        // 0.5 error, one sample a minute: each full minute adds 0.5 * 60 * 0.01 = 0.3,
        // the first one half that since the integrator starts from zero
        let mut pid = PidController::new("integral", 20.0, PidConfig::new(1.0, 0.01, 0.0, 2.0)).unwrap();
        let expected = [0.0, 0.15, 0.45, 0.75, 1.05, 1.35, 1.65, 1.65, 1.65, 1.65];
        for (minute, want) in expected.into_iter().enumerate() {
            let out = pid.compute(sample(minute as i64 * 60, 20.5));
            let i = out.value().unwrap().detail.i;
            assert!((i - want).abs() < 1e-9, "minute {minute}: {i} != {want}");
        }
        for minute in [18, 36, 72, 144] {
            let out = pid.compute(sample(minute * 60, 20.5));
            assert!((out.value().unwrap().detail.i - 1.65).abs() < 1e-9);
        }
    }

    #[test]
    fn derivative_reacts_only_to_changes() {
        let mut pid = PidController::new("derivative", 20.0, PidConfig::new(1.0, 0.0, 2.0, 0.0)).unwrap();
        let steps = [
            (0, 20.0, 0.0),
            (1, 21.0, 2.0),
            (2, 21.0, 0.0),
            (5, 21.0, 0.0),
            (15, 21.0, 0.0),
            (20, 20.0, -0.4),
            (21, 20.0, 0.0),
            (30, 20.0, 0.0),
            (35, 22.0, 0.8),
            (36, 22.0, 0.0),
        ];
        for (secs, pv, want) in steps {
            let out = pid.compute(sample(secs, pv));
            let d = out.value().unwrap().detail.d;
            assert!((d - want).abs() < 1e-9, "t={secs}: {d} != {want}");
        }
    }

    #[test]
    fn setpoint_step_leaves_derivative_alone() {
        let mut pid = PidController::new("kick", 20.0, PidConfig::new(1.0, 0.0, 2.0, 0.0)).unwrap();
        pid.compute(sample(0, 21.0));
        pid.set_setpoint(18.0).unwrap();
        let out = pid.compute(sample(1, 21.0));
        let status = out.value().unwrap();
        assert_eq!(status.detail.d, 0.0);
        assert_eq!(status.detail.p, 3.0);
    }

    #[test]
    fn setpoint_change_resets_integral() {
        let mut pid = PidController::new("reset", 20.0, PidConfig::new(1.0, 0.01, 0.0, 0.0)).unwrap();
        pid.compute(sample(0, 21.0));
        pid.compute(sample(60, 21.0));
        assert!(pid.integral() > 0.0);

        pid.set_setpoint(22.0).unwrap();
        assert_eq!(pid.integral(), 0.0);
        let out = pid.compute(sample(120, 21.0));
        assert_eq!(out.value().unwrap().detail.i, 0.0);
        assert_eq!(out.value().unwrap().error, -1.0);
    }

    #[test]
    fn setpoint_change_without_reset_keeps_integral() {
        let config = PidConfig::new(1.0, 0.01, 0.0, 0.0).with_reset_on_setpoint_change(false);
        let mut pid = PidController::new("keep", 20.0, config).unwrap();
        pid.compute(sample(0, 21.0));
        pid.compute(sample(60, 21.0));
        let before = pid.integral();
        pid.set_setpoint(22.0).unwrap();
        assert_eq!(pid.integral(), before);
    }

    #[test]
    fn total_failure_passes_through_without_state_change() {
        let mut pid = PidController::new("f", 20.0, PidConfig::new(1.0, 0.0, 0.0, 0.0)).unwrap();
        pid.compute(sample(10, 21.0));
        let failed: Signal<f64> = Signal::failure(ts(5), None, SignalError::sensor("gone"));
        let out = pid.compute(failed);
        assert!(out.is_error());
        assert_eq!(pid.process_variable(), Some(21.0));
    }

    #[test]
    fn partial_failure_is_computed_and_stays_partial() {
        let mut pid = PidController::new("p", 20.0, PidConfig::new(1.0, 0.0, 0.0, 0.0)).unwrap();
        let pv = Signal::<f64>::partial(ts(0), 22.0, None, SignalError::sensor("stale"));
        let out = pid.compute(pv);
        assert!(out.is_partial());
        assert_eq!(out.value().unwrap().signal, 2.0);
    }

    #[test]
    #[should_panic(expected = "can't go back in time")]
    fn non_increasing_timestamp_panics() {
        let mut pid = PidController::new("t", 20.0, PidConfig::new(1.0, 0.0, 0.0, 0.0)).unwrap();
        pid.compute(sample(10, 21.0));
        pid.compute(sample(10, 21.0));
    }

    #[test]
    fn payload_survives() {
        let mut pid = PidController::new("pl", 20.0, PidConfig::new(1.0, 0.0, 0.0, 0.0)).unwrap();
        let out = pid.compute(Signal::with_payload(ts(0), 21.0, "bedroom"));
        assert_eq!(out.payload(), Some(&"bedroom"));
    }
}
