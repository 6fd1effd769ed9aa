//! Zone settings out of calendar event text.
//!
//! Two syntaxes. The legacy one lives in the event title after the period
//! name and a colon: `Sleep: setpoint 18c, non-voting`. The current one puts
//! YAML in the event description and leaves the title as `name # comment`.
//! YAML wins when both are present and it parses.

use crate::error::{ScheduleError, ScheduleResult};
use serde::Deserialize;
use tracing::{debug, trace, warn};
use zf_core::fahrenheit_to_celsius;
use zf_model::{EconomizerSettings, ZoneSettings};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ZoneSettingsYaml {
    enabled: Option<bool>,
    setpoint: Option<f64>,
    voting: Option<bool>,
    dump_priority: Option<i32>,
    economizer: Option<EconomizerSettingsYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct EconomizerSettingsYaml {
    enabled: Option<bool>,
    changeover_delta: f64,
    target_temperature: f64,
    keep_hvac_on: Option<bool>,
    max_power: Option<f64>,
}

impl From<EconomizerSettingsYaml> for EconomizerSettings {
    fn from(source: EconomizerSettingsYaml) -> Self {
        let defaults = EconomizerSettings::new(source.changeover_delta, source.target_temperature);
        EconomizerSettings {
            enabled: source.enabled.or(defaults.enabled),
            keep_hvac_on: source.keep_hvac_on.unwrap_or(defaults.keep_hvac_on),
            max_power: source.max_power.unwrap_or(defaults.max_power),
            ..defaults
        }
    }
}

/// Period name out of an event title.
///
/// With a description present the name is everything before `#`; without
/// one it's everything before the first colon.
pub fn parse_period_name(title: &str, description: Option<&str>) -> ScheduleResult<String> {
    if description.is_none_or(|d| d.trim().is_empty()) {
        return match title.find(':') {
            Some(colon) if colon > 0 => Ok(title[..colon].trim().to_string()),
            _ => Err(ScheduleError::BadPeriodName {
                title: title.to_string(),
                reason: "must be separated by a colon, and not empty",
            }),
        };
    }

    let name = title.split('#').next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(ScheduleError::BadPeriodName {
            title: title.to_string(),
            reason: "empty text before '#'",
        });
    }
    Ok(name.to_string())
}

/// Settings out of a YAML event description.
///
/// Non-breaking spaces, which calendar editors like to put in indentation,
/// are read as plain spaces.
pub fn parse_yaml(source: &str) -> ScheduleResult<ZoneSettings> {
    let cleaned = source.replace('\u{00A0}', " ");
    let yaml: ZoneSettingsYaml = serde_yaml::from_str(&cleaned)?;
    let economizer = yaml.economizer.map(EconomizerSettings::from);
    if let Some(economizer) = &economizer {
        economizer.validate()?;
    }

    let settings = ZoneSettings {
        enabled: yaml.enabled,
        setpoint: yaml.setpoint,
        voting: yaml.voting,
        hold: None,
        dump_priority: yaml.dump_priority,
        economizer,
    };
    debug!(%settings, "YAML event settings parsed");
    Ok(settings)
}

/// Settings out of the legacy free form text.
///
/// Comma or semicolon separated, case insensitive tokens: `on`/`enabled`,
/// `off`/`disabled`, `voting`, `non-voting`/`not voting`,
/// `setpoint <number>[c|f]` (or `temperature`; `=`, `:` or space before the
/// value) and `dump[ priority] <int>`. The setpoint is mandatory.
pub fn parse_settings(text: &str) -> ScheduleResult<ZoneSettings> {
    let arguments = text.trim().to_lowercase();

    let mut enabled = None;
    let mut setpoint = None;
    let mut voting = None;
    let mut dump_priority = None;

    for token in arguments.split([',', ';']).map(str::trim).filter(|t| !t.is_empty()) {
        trace!(token, "token");
        match token {
            "on" | "enabled" => enabled = Some(true),
            "off" | "disabled" => enabled = Some(false),
            "voting" => voting = Some(true),
            "non-voting" | "not voting" => voting = Some(false),
            _ if token.starts_with("setpoint") || token.starts_with("temperature") => {
                if setpoint.is_none() {
                    setpoint = Some(parse_setpoint_token(token, &arguments)?);
                }
            }
            _ if token.starts_with("dump") => dump_priority = Some(parse_dump_priority(token)?),
            _ => debug!(token, "unrecognized, ignored"),
        }
    }

    let Some(setpoint) = setpoint else {
        return Err(ScheduleError::MissingSetpoint { text: arguments });
    };

    Ok(ZoneSettings {
        enabled,
        setpoint: Some(setpoint),
        voting,
        hold: None,
        dump_priority,
        economizer: None,
    })
}

/// Period name and settings out of one event.
///
/// A description that fails to parse as YAML is logged and the title is
/// tried instead.
pub fn parse_event(title: &str, description: Option<&str>) -> ScheduleResult<(String, ZoneSettings)> {
    let name = parse_period_name(title, description)?;

    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        match parse_yaml(description) {
            Ok(settings) => return Ok((name, settings)),
            Err(e) => warn!(title, error = %e, "can't parse description as YAML, reverting to title syntax"),
        }
    }

    let legacy = title.split_once(':').map_or(title, |(_, rest)| rest);
    Ok((name, parse_settings(legacy)?))
}

fn parse_setpoint_token(token: &str, arguments: &str) -> ScheduleResult<f64> {
    let mut parts = token.split([' ', '=', ':']).filter(|s| !s.is_empty()).skip(1);
    let Some(value) = parts.next() else {
        return Err(ScheduleError::MalformedSetpoint {
            text: arguments.to_string(),
            token: token.to_string(),
        });
    };

    let Some((number, suffix)) = leading_number(value) else {
        return Err(ScheduleError::MissingSetpoint { text: value.to_string() });
    };

    // The unit may be glued to the number or stand on its own: `80f`, `80 f`
    let unit = if suffix.is_empty() {
        parts.next().filter(|u| matches!(*u, "c" | "f" | "°c" | "°f")).unwrap_or("")
    } else {
        suffix
    };

    if unit.trim_start_matches('°').starts_with('f') {
        trace!(value, unit, "Fahrenheit");
        Ok(fahrenheit_to_celsius(number))
    } else {
        Ok(number)
    }
}

fn parse_dump_priority(token: &str) -> ScheduleResult<i32> {
    token
        .split([' ', '=', ':'])
        .filter(|s| !s.is_empty())
        .find_map(|s| s.parse::<i32>().ok())
        .ok_or_else(|| ScheduleError::BadDumpPriority { token: token.to_string() })
}

/// The longest numeric prefix and whatever follows it, so that `18c` reads
/// as 18 with `c` left over.
fn leading_number(text: &str) -> Option<(f64, &str)> {
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map_or(text.len(), |(i, _)| i);
    let number = text[..end].parse().ok()?;
    Some((number, &text[end..]))
}
