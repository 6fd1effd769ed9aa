//! Configuration validation logic.

use crate::schema::{EconomizerDef, PidDef, SensorDef, SystemConfig, ZoneDef};
use std::collections::HashSet;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

pub fn validate_config(config: &SystemConfig) -> Result<(), ValidationError> {
    if config.version > crate::migrate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: config.version,
        });
    }

    let mut zone_names = HashSet::new();
    for zone in &config.zones {
        if !zone_names.insert(&zone.name) {
            return Err(ValidationError::DuplicateId {
                id: zone.name.clone(),
                context: "zones".to_string(),
            });
        }
        validate_zone(zone)?;

        if zone.economizer.is_some() && config.ambient.is_none() {
            return Err(ValidationError::MissingReference {
                id: "ambient".to_string(),
                context: format!("zone '{}' economizer", zone.name),
            });
        }
    }

    if let Some(ambient) = &config.ambient {
        validate_sensor(ambient, "ambient")?;
    }

    // a reading is routed by its source name, so one source feeds one chain
    let mut sources = HashSet::new();
    let chains = config
        .zones
        .iter()
        .map(|z| &z.sensor)
        .chain(config.ambient.as_ref());
    for source in chains.flat_map(|sensor| &sensor.sources) {
        if !sources.insert(source) {
            return Err(ValidationError::DuplicateId {
                id: source.clone(),
                context: "sensor sources".to_string(),
            });
        }
    }

    if config.scheduler.granularity_s == 0 {
        return Err(invalid("scheduler.granularity_s", 0, "must be positive"));
    }
    if config.scheduler.poll_interval_s == 0 {
        return Err(invalid("scheduler.poll_interval_s", 0, "must be positive"));
    }

    for entry in &config.schedule {
        if !zone_names.contains(&entry.zone) {
            return Err(ValidationError::MissingReference {
                id: entry.zone.clone(),
                context: format!("schedule period '{}'", entry.period),
            });
        }
        if entry.days.chars().count() != 7 {
            return Err(invalid(
                format!("schedule '{}' days", entry.period),
                &entry.days,
                "seven characters, Monday first",
            ));
        }
    }

    Ok(())
}

fn validate_zone(zone: &ZoneDef) -> Result<(), ValidationError> {
    let context = format!("zone '{}'", zone.name);

    if zone.name.trim().is_empty() {
        return Err(invalid("zone name", &zone.name, "must not be empty"));
    }
    if !zone.range.min.is_finite() || !zone.range.max.is_finite() || zone.range.min >= zone.range.max {
        return Err(invalid(
            format!("{context} range"),
            format!("{}..{}", zone.range.min, zone.range.max),
            "must be finite with min < max",
        ));
    }
    if !(zone.range.min..=zone.range.max).contains(&zone.setpoint) {
        return Err(invalid(
            format!("{context} setpoint"),
            zone.setpoint,
            "outside of setpoint range",
        ));
    }

    validate_pid(&zone.pid, &context)?;
    validate_sensor(&zone.sensor, &context)?;

    if let Some(economizer) = &zone.economizer {
        validate_economizer(economizer, &context)?;
    }
    Ok(())
}

fn validate_pid(pid: &PidDef, context: &str) -> Result<(), ValidationError> {
    let gains = [pid.p, pid.i, pid.d];
    if gains.iter().any(|g| !g.is_finite()) {
        return Err(invalid(format!("{context} pid"), format!("{gains:?}"), "gains must be finite"));
    }
    if gains.iter().all(|g| *g == 0.0) {
        return Err(invalid(format!("{context} pid"), format!("{gains:?}"), "at least one gain must be non-zero"));
    }
    if !pid.limit.is_finite() || pid.limit < 0.0 {
        return Err(invalid(format!("{context} pid.limit"), pid.limit, "must be non-negative"));
    }
    for (field, span) in [("integral_span_s", pid.integral_span_s), ("derivative_span_s", pid.derivative_span_s)] {
        if let Some(span) = span {
            if !span.is_finite() || span <= 0.0 {
                return Err(invalid(format!("{context} pid.{field}"), span, "must be positive"));
            }
        }
    }
    Ok(())
}

fn validate_sensor(sensor: &SensorDef, context: &str) -> Result<(), ValidationError> {
    if sensor.sources.is_empty() {
        return Err(invalid(format!("{context} sensor.sources"), "[]", "at least one source required"));
    }
    let mut seen = HashSet::new();
    for source in &sensor.sources {
        if !seen.insert(source) {
            return Err(ValidationError::DuplicateId {
                id: source.clone(),
                context: format!("{context} sensor sources"),
            });
        }
    }
    if sensor.median_depth == 0 {
        return Err(invalid(format!("{context} sensor.median_depth"), 0, "must be at least 1"));
    }
    if sensor.timeout_ms == 0 {
        return Err(invalid(format!("{context} sensor.timeout_ms"), 0, "must be positive"));
    }
    Ok(())
}

fn validate_economizer(economizer: &EconomizerDef, context: &str) -> Result<(), ValidationError> {
    if !economizer.changeover_delta.is_finite() || economizer.changeover_delta < 0.0 {
        return Err(invalid(
            format!("{context} economizer.changeover_delta"),
            economizer.changeover_delta,
            "must be non-negative",
        ));
    }
    if !economizer.target_temperature.is_finite() {
        return Err(invalid(
            format!("{context} economizer.target_temperature"),
            economizer.target_temperature,
            "must be finite",
        ));
    }
    if !(0.0..=1.0).contains(&economizer.max_power) {
        return Err(invalid(
            format!("{context} economizer.max_power"),
            economizer.max_power,
            "must be within 0..1",
        ));
    }
    if economizer.timeout_s == 0 {
        return Err(invalid(format!("{context} economizer.timeout_s"), 0, "must be positive"));
    }
    if let Some(pid) = &economizer.pid {
        validate_pid(pid, &format!("{context} economizer"))?;
    }
    Ok(())
}
