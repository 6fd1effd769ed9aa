//! Shared controller contract and bookkeeping.

use crate::error::ControlResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use zf_core::{Signal, Timestamp, ensure_finite};

/// Output of one controller compute step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus<D> {
    /// Setpoint in effect when the sample was processed.
    pub setpoint: f64,
    /// `pv - setpoint`.
    pub error: f64,
    /// Corrective signal.
    pub signal: f64,
    /// Controller specific detail.
    pub detail: D,
}

impl<D: fmt::Debug> fmt::Display for ControllerStatus<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "setpoint={},error={},signal={},{:?}",
            self.setpoint, self.error, self.signal, self.detail
        )
    }
}

/// A stateful single-input/single-output controller.
pub trait ProcessController: Send {
    type Detail: Clone + fmt::Debug + Send + 'static;

    fn name(&self) -> &str;

    fn setpoint(&self) -> f64;

    fn set_setpoint(&mut self, setpoint: f64) -> ControlResult<()>;

    /// Last healthy process variable seen, if any.
    fn process_variable(&self) -> Option<f64>;

    /// Current error, zero until the first sample arrives.
    fn error(&self) -> f64;

    /// Process one sample.
    ///
    /// A total failure passes through untouched; a partial failure is computed
    /// on and keeps its degraded status.
    fn compute<P: Clone>(&mut self, pv: Signal<f64, P>) -> Signal<ControllerStatus<Self::Detail>, P>;
}

/// Setpoint and process-variable bookkeeping shared by all controllers.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerCore {
    name: String,
    setpoint: f64,
    pv: Option<(Timestamp, f64)>,
}

impl ControllerCore {
    pub fn new(name: impl Into<String>, setpoint: f64) -> ControlResult<Self> {
        ensure_finite(setpoint, "setpoint")?;
        Ok(Self {
            name: name.into(),
            setpoint,
            pv: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Returns whether the setpoint actually changed.
    pub fn set_setpoint(&mut self, setpoint: f64) -> ControlResult<bool> {
        ensure_finite(setpoint, "setpoint")?;
        let changed = setpoint != self.setpoint;
        self.setpoint = setpoint;
        Ok(changed)
    }

    pub fn record(&mut self, timestamp: Timestamp, value: f64) {
        self.pv = Some((timestamp, value));
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.pv.map(|(t, _)| t)
    }

    pub fn process_variable(&self) -> Option<f64> {
        self.pv.map(|(_, v)| v)
    }

    pub fn error(&self) -> f64 {
        self.pv.map_or(0.0, |(_, v)| v - self.setpoint)
    }
}
