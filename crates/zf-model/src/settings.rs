//! Sparse zone settings with merge semantics.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_max_power() -> f64 {
    1.0
}

/// User facing economizer knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EconomizerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Minimum indoor/ambient difference before free conditioning kicks in.
    pub changeover_delta: f64,
    /// Indoor temperature to stop at.
    pub target_temperature: f64,
    /// Leave the HVAC running while the economizer is on. Only makes sense
    /// when outside air is fed into the HVAC return.
    #[serde(default)]
    pub keep_hvac_on: bool,
    /// Actuator power when on, `0.0..=1.0`.
    #[serde(default = "default_max_power")]
    pub max_power: f64,
}

impl EconomizerSettings {
    pub fn new(changeover_delta: f64, target_temperature: f64) -> Self {
        Self {
            enabled: Some(true),
            changeover_delta,
            target_temperature,
            keep_hvac_on: false,
            max_power: default_max_power(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if !self.changeover_delta.is_finite() || self.changeover_delta < 0.0 {
            return Err(ModelError::InvalidArg {
                what: "changeover delta must be non-negative",
            });
        }
        if !self.target_temperature.is_finite() {
            return Err(ModelError::InvalidArg {
                what: "target temperature must be finite",
            });
        }
        if !(0.0..=1.0).contains(&self.max_power) {
            return Err(ModelError::InvalidArg {
                what: "max power must be within 0..1",
            });
        }
        Ok(())
    }
}

/// Desired zone configuration.
///
/// Every field is optional so that an update can carry only what changes;
/// see [`ZoneSettings::merge`]. Unset flags resolve to enabled, voting, not on
/// hold, dump priority 0. The setpoint has no default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZoneSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting: Option<bool>,
    #[serde(skip)]
    pub hold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economizer: Option<EconomizerSettings>,
}

impl ZoneSettings {
    /// Fully resolved settings around a setpoint.
    pub fn with_setpoint(setpoint: f64) -> Self {
        Self {
            enabled: Some(true),
            setpoint: Some(setpoint),
            voting: Some(true),
            hold: Some(false),
            dump_priority: Some(0),
            economizer: None,
        }
    }

    /// Overlay `update` on top of `self`: every field set in `update` wins.
    pub fn merge(&self, update: &ZoneSettings) -> ZoneSettings {
        ZoneSettings {
            enabled: update.enabled.or(self.enabled),
            setpoint: update.setpoint.or(self.setpoint),
            voting: update.voting.or(self.voting),
            hold: update.hold.or(self.hold),
            dump_priority: update.dump_priority.or(self.dump_priority),
            economizer: update.economizer.clone().or_else(|| self.economizer.clone()),
        }
    }

    /// Copy with the enabled flag forced.
    pub fn with_enabled(&self, enabled: bool) -> ZoneSettings {
        ZoneSettings {
            enabled: Some(enabled),
            ..self.clone()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn is_voting(&self) -> bool {
        self.voting.unwrap_or(true)
    }

    pub fn is_on_hold(&self) -> bool {
        self.hold.unwrap_or(false)
    }

    pub fn priority(&self) -> i32 {
        self.dump_priority.unwrap_or(0)
    }

    /// Compare what the user sees; hold and dump priority are ignored.
    pub fn same(&self, other: &ZoneSettings) -> bool {
        self.enabled == other.enabled
            && self.setpoint == other.setpoint
            && self.voting == other.voting
            && self.economizer == other.economizer
    }
}

impl fmt::Display for ZoneSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{enabled={:?}, setpoint={:?}, voting={:?}, hold={:?}, dump={:?}, economizer={:?}}}",
            self.enabled, self.setpoint, self.voting, self.hold, self.dump_priority, self.economizer
        )
    }
}

/// Settings a schedule period wants applied, with the period that wants them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSettings {
    pub period: String,
    pub settings: ZoneSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let s = ZoneSettings::default();
        assert!(s.is_enabled());
        assert!(s.is_voting());
        assert!(!s.is_on_hold());
        assert_eq!(s.priority(), 0);
        assert_eq!(s.setpoint, None);
    }

    #[test]
    fn update_fields_win() {
        let base = ZoneSettings::with_setpoint(20.0);
        let update = ZoneSettings {
            enabled: Some(false),
            dump_priority: Some(3),
            ..Default::default()
        };
        let merged = base.merge(&update);
        assert_eq!(merged.enabled, Some(false));
        assert_eq!(merged.setpoint, Some(20.0));
        assert_eq!(merged.voting, Some(true));
        assert_eq!(merged.priority(), 3);
    }

    #[test]
    fn same_ignores_hold_and_dump() {
        let a = ZoneSettings::with_setpoint(21.0);
        let b = ZoneSettings {
            hold: Some(true),
            dump_priority: Some(5),
            ..a.clone()
        };
        assert!(a.same(&b));
        assert!(!a.same(&ZoneSettings::with_setpoint(22.0)));
    }

    #[test]
    fn kebab_case_and_sparse_serialization() {
        let s = ZoneSettings {
            setpoint: Some(22.5),
            dump_priority: Some(2),
            hold: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"setpoint":22.5,"dump-priority":2}"#);
    }

    #[test]
    fn economizer_validation() {
        assert!(EconomizerSettings::new(2.0, 22.0).validate().is_ok());
        assert!(EconomizerSettings::new(-1.0, 22.0).validate().is_err());
        let too_much = EconomizerSettings {
            max_power: 1.5,
            ..EconomizerSettings::new(2.0, 22.0)
        };
        assert!(too_much.validate().is_err());
    }

    mod proptests {
        use super::*;
        use proptest::option;
        use proptest::prelude::*;

        fn settings() -> impl Strategy<Value = ZoneSettings> {
            (
                option::of(any::<bool>()),
                option::of(10.0f64..40.0),
                option::of(any::<bool>()),
                option::of(any::<bool>()),
                option::of(-5i32..5),
            )
                .prop_map(|(enabled, setpoint, voting, hold, dump_priority)| ZoneSettings {
                    enabled,
                    setpoint,
                    voting,
                    hold,
                    dump_priority,
                    economizer: None,
                })
        }

        proptest! {
            #[test]
            fn merge_is_idempotent(base in settings(), update in settings()) {
                let once = base.merge(&update);
                let twice = once.merge(&update);
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn merge_with_empty_is_identity(base in settings()) {
                prop_assert_eq!(base.merge(&ZoneSettings::default()), base);
            }
        }
    }
}
