//! Builds model objects from their config definitions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use zf_config::{EconomizerDef, PidDef, SchedulerDef, SystemConfig, ZoneDef};
use zf_controls::PidConfig;
use zf_core::{Clock, Signal, fraction};
use zf_model::{
    Economizer, EconomizerConfig, EconomizerGains, EconomizerSettings, HvacCommand, HvacDevice, HvacMode,
    SetpointRange, Thermostat, ThermostatConfig, UnitControlSignal, Zone, ZoneSettings,
};
use zf_scheduler::{Schedule, SchedulePeriod, SchedulerConfig, parse_settings};

use crate::error::AppResult;

fn pid_config(def: &PidDef) -> PidConfig {
    let mut config = PidConfig::new(def.p, def.i, def.d, def.limit);
    if let Some(span) = def.integral_span_s {
        config = config.with_integral_span(Duration::from_secs_f64(span));
    }
    if let Some(span) = def.derivative_span_s {
        config = config.with_derivative_span(Duration::from_secs_f64(span));
    }
    config
}

pub fn build_thermostat(def: &ZoneDef) -> AppResult<Thermostat> {
    let config = ThermostatConfig {
        range: SetpointRange::new(def.range.min, def.range.max)?,
        pid: pid_config(&def.pid),
    };
    Ok(Thermostat::new(&def.name, def.setpoint, config)?)
}

pub fn economizer_settings(def: &EconomizerDef) -> EconomizerSettings {
    EconomizerSettings {
        enabled: Some(def.enabled),
        changeover_delta: def.changeover_delta,
        target_temperature: def.target_temperature,
        keep_hvac_on: def.keep_hvac_on,
        max_power: def.max_power,
    }
}

/// Fully resolved settings the zone starts with.
pub fn initial_settings(def: &ZoneDef) -> ZoneSettings {
    ZoneSettings {
        enabled: Some(def.enabled),
        setpoint: Some(def.setpoint),
        voting: Some(def.voting),
        hold: Some(false),
        dump_priority: Some(def.dump_priority),
        economizer: def.economizer.as_ref().map(economizer_settings),
    }
}

/// # Arguments
///
/// * `zone` - Name of the zone the economizer serves
/// * `device` - Actuator, must support `def.mode`
pub fn build_economizer(
    zone: &str,
    def: &EconomizerDef,
    device: Arc<dyn HvacDevice>,
    clock: Arc<dyn Clock>,
) -> AppResult<Arc<Economizer>> {
    let gains = def
        .pid
        .map(|pid| EconomizerGains {
            p: pid.p,
            i: pid.i,
            limit: pid.limit,
        })
        .unwrap_or_default();

    let config = EconomizerConfig {
        mode: def.mode,
        settings: economizer_settings(def),
        gains,
        timeout: Duration::from_secs(def.timeout_s),
    };
    Ok(Arc::new(Economizer::new(zone, config, device, clock)?))
}

/// Build a zone and, if the definition has one, its economizer driving
/// `economizer_device`.
pub fn build_zone(
    def: &ZoneDef,
    economizer_device: Option<Arc<dyn HvacDevice>>,
    clock: Arc<dyn Clock>,
) -> AppResult<Arc<Zone>> {
    let thermostat = build_thermostat(def)?;

    let economizer = match (&def.economizer, economizer_device) {
        (Some(eco), Some(device)) => Some(build_economizer(&def.name, eco, device, clock)?),
        (Some(_), None) => {
            debug!(zone = %def.name, "no economizer device, economizer left out");
            None
        }
        (None, _) => None,
    };

    Ok(Arc::new(Zone::new(thermostat, initial_settings(def), economizer)?))
}

/// Static schedules per zone from the config's schedule entries.
pub fn build_schedules(config: &SystemConfig) -> AppResult<BTreeMap<String, Schedule>> {
    let mut schedules: BTreeMap<String, Schedule> = BTreeMap::new();
    for entry in &config.schedule {
        let period = SchedulePeriod::parse(&entry.period, &entry.start, &entry.end, &entry.days)?;
        let settings = parse_settings(&entry.settings)?;
        debug!(zone = %entry.zone, %period, %settings, "schedule entry");
        schedules.entry(entry.zone.clone()).or_default().insert(period, settings);
    }
    Ok(schedules)
}

pub fn scheduler_config(def: &SchedulerDef) -> SchedulerConfig {
    SchedulerConfig {
        granularity: Duration::from_secs(def.granularity_s),
        poll_interval: Duration::from_secs(def.poll_interval_s),
    }
}

/// Translate arbitrated demand into a command for a unit running in `mode`.
///
/// Demand follows the thermostat sign convention: positive asks for cooling,
/// negative for heating. Demand the unit can't act on becomes zero; the rest
/// is capped at full power. Without an explicit fan speed the fan runs
/// whenever the unit does.
pub fn unit_command(mode: HvacMode, signal: &Signal<UnitControlSignal>) -> HvacCommand {
    let Some(control) = signal.value() else {
        return HvacCommand::off(Some(mode));
    };
    let wanted = match mode {
        HvacMode::Cooling => control.demand,
        HvacMode::Heating => -control.demand,
    };
    let demand = fraction(wanted);
    let fan_speed = fraction(control.fan_speed.unwrap_or(if demand > 0.0 { 1.0 } else { 0.0 }));

    HvacCommand {
        mode: Some(mode),
        demand,
        fan_speed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use zf_config::{RangeDef, ScheduleEntryDef, SensorDef};
    use zf_core::{ManualClock, SignalError, Timestamp};
    use zf_model::NullDevice;

    fn ts() -> Timestamp {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn zone_def() -> ZoneDef {
        ZoneDef {
            name: "den".to_string(),
            setpoint: 22.0,
            range: RangeDef { min: 15.0, max: 30.0 },
            pid: PidDef {
                p: 1.0,
                i: 0.0,
                d: 0.0,
                limit: 0.0,
                integral_span_s: Some(600.0),
                derivative_span_s: None,
            },
            enabled: true,
            voting: false,
            dump_priority: 2,
            sensor: SensorDef {
                sources: vec!["den".to_string()],
                median_depth: 1,
                timeout_ms: 60_000,
                repeat: false,
            },
            economizer: None,
        }
    }

    fn eco_def() -> EconomizerDef {
        EconomizerDef {
            mode: HvacMode::Cooling,
            changeover_delta: 1.0,
            target_temperature: 20.0,
            enabled: true,
            keep_hvac_on: false,
            max_power: 0.5,
            pid: None,
            timeout_s: 90,
        }
    }

    fn demand(demand: f64) -> Signal<UnitControlSignal> {
        Signal::new(
            ts(),
            UnitControlSignal {
                demand,
                fan_speed: None,
            },
        )
    }

    #[test]
    fn thermostat_uses_configured_range() {
        let thermostat = build_thermostat(&zone_def()).unwrap();
        assert_eq!(thermostat.name(), "den");
        assert_eq!(thermostat.range(), SetpointRange::new(15.0, 30.0).unwrap());

        let mut bad = zone_def();
        bad.setpoint = 35.0;
        assert!(build_thermostat(&bad).is_err());
    }

    #[test]
    fn zone_starts_with_config_flags() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(ts()));
        let zone = build_zone(&zone_def(), None, clock).unwrap();
        let settings = zone.settings();
        assert_eq!(settings.setpoint, Some(22.0));
        assert!(!settings.is_voting());
        assert_eq!(settings.priority(), 2);
        assert!(zone.economizer().is_none());
    }

    #[test]
    fn economizer_is_attached_with_a_device() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(ts()));
        let mut def = zone_def();
        def.economizer = Some(eco_def());
        let device = Arc::new(NullDevice::new("den damper", [HvacMode::Cooling]));

        let zone = build_zone(&def, Some(device), clock.clone()).unwrap();
        let eco = zone.economizer().unwrap();
        assert_eq!(eco.settings().max_power, 0.5);

        let heating_only = Arc::new(NullDevice::new("den heater", [HvacMode::Heating]));
        assert!(build_zone(&def, Some(heating_only), clock).is_err());
    }

    #[test]
    fn schedules_group_by_zone() {
        let entry = |zone: &str, period: &str, start: &str, end: &str| ScheduleEntryDef {
            zone: zone.to_string(),
            period: period.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            days: "MTWTFSS".to_string(),
            settings: "setpoint 20".to_string(),
        };
        let config = SystemConfig {
            version: zf_config::LATEST_VERSION,
            name: "t".to_string(),
            unit: Default::default(),
            zones: vec![zone_def()],
            ambient: None,
            scheduler: Default::default(),
            schedule: vec![
                entry("den", "day", "8:00", "20:00"),
                entry("den", "night", "20:00", "8:00"),
                entry("attic", "day", "8:00", "20:00"),
            ],
        };

        let schedules = build_schedules(&config).unwrap();
        assert_eq!(schedules["den"].len(), 2);
        assert_eq!(schedules["attic"].len(), 1);
        assert!(schedules["den"].values().all(|s| s.setpoint == Some(20.0)));

        let mut broken = config.clone();
        broken.schedule[0].settings = "voting".to_string();
        assert!(build_schedules(&broken).is_err());
    }

    #[test]
    fn cooling_unit_ignores_heating_demand() {
        let cmd = unit_command(HvacMode::Cooling, &demand(0.6));
        assert_eq!(cmd.demand, 0.6);
        assert_eq!(cmd.fan_speed, 1.0);

        let cmd = unit_command(HvacMode::Cooling, &demand(-0.6));
        assert_eq!(cmd, HvacCommand::off(Some(HvacMode::Cooling)));
    }

    #[test]
    fn heating_unit_flips_the_sign_and_caps() {
        let cmd = unit_command(HvacMode::Heating, &demand(-3.0));
        assert_eq!(cmd.demand, 1.0);
        assert_eq!(cmd.mode, Some(HvacMode::Heating));
    }

    #[test]
    fn failed_demand_turns_the_unit_off() {
        let failed = Signal::<UnitControlSignal>::failure(ts(), None, SignalError::sensor("gone"));
        assert_eq!(unit_command(HvacMode::Cooling, &failed), HvacCommand::off(Some(HvacMode::Cooling)));
    }
}
