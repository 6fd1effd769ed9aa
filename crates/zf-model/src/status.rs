//! Status payloads flowing from thermostats to the unit.

use crate::settings::{EconomizerSettings, PeriodSettings, ZoneSettings};
use serde::{Deserialize, Serialize};
use std::fmt;
use zf_core::Signal;

/// Thermostat verdict for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallingStatus {
    /// Hysteresis input that produced this verdict.
    pub sample: Option<f64>,
    pub demand: f64,
    pub calling: bool,
}

impl CallingStatus {
    /// Not calling, no demand.
    pub const IDLE: CallingStatus = CallingStatus {
        sample: None,
        demand: 0.0,
        calling: false,
    };
}

/// Economizer state attached to a zone status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomizerStatus {
    pub settings: Option<EconomizerSettings>,
    pub sample: Option<f64>,
    pub demand: f64,
    pub calling: bool,
    pub ambient: Option<f64>,
}

/// Everything a consumer needs to know about a zone after one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub settings: ZoneSettings,
    pub calling: CallingStatus,
    pub economizer: Option<EconomizerStatus>,
    pub period: Option<PeriodSettings>,
}

/// Coarse zone state, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneState {
    Error,
    Off,
    Calling,
    Happy,
}

impl ZoneState {
    pub fn of<P>(signal: &Signal<ZoneStatus, P>) -> ZoneState {
        match signal.value() {
            None => ZoneState::Error,
            Some(status) if !status.settings.is_enabled() => ZoneState::Off,
            Some(status) if status.calling.calling => ZoneState::Calling,
            Some(_) => ZoneState::Happy,
        }
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZoneState::Error => "ERROR",
            ZoneState::Off => "OFF",
            ZoneState::Calling => "CALLING",
            ZoneState::Happy => "HAPPY",
        };
        f.write_str(s)
    }
}

/// Arbitrated command for the shared unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitControlSignal {
    pub demand: f64,
    pub fan_speed: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use zf_core::SignalError;

    fn status(enabled: bool, calling: bool) -> ZoneStatus {
        ZoneStatus {
            settings: ZoneSettings::with_setpoint(20.0).with_enabled(enabled),
            calling: CallingStatus {
                sample: Some(0.5),
                demand: if calling { 1.5 } else { 0.0 },
                calling,
            },
            economizer: None,
            period: None,
        }
    }

    #[test]
    fn state_derivation() {
        let t = DateTime::from_timestamp(0, 0).unwrap();
        let of = |s: ZoneStatus| ZoneState::of(&Signal::<ZoneStatus>::new(t, s));

        assert_eq!(of(status(false, true)), ZoneState::Off);
        assert_eq!(of(status(true, true)), ZoneState::Calling);
        assert_eq!(of(status(true, false)), ZoneState::Happy);

        let failed: Signal<ZoneStatus> = Signal::failure(t, None, SignalError::sensor("gone"));
        assert_eq!(ZoneState::of(&failed), ZoneState::Error);
    }
}
