//! Config loading, saving, validation, and introspection.

use std::path::Path;
use zf_config::{SystemConfig, ZoneDef};

use crate::error::{AppError, AppResult};

/// Summary of a zone for listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSummary {
    pub name: String,
    pub setpoint: f64,
    pub range: (f64, f64),
    pub enabled: bool,
    pub voting: bool,
    pub source_count: usize,
    pub median_depth: usize,
    pub has_economizer: bool,
    pub schedule_periods: usize,
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Load, migrate and validate a config file. `.json` files are read as JSON,
/// anything else as YAML.
pub fn load_config(path: &Path) -> AppResult<SystemConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::ConfigFileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = if is_json(path) {
        zf_config::from_json_str(&content)?
    } else {
        zf_config::from_yaml_str(&content)?
    };

    Ok(config)
}

/// Save a config file, in the format its extension asks for.
pub fn save_config(path: &Path, config: &SystemConfig) -> AppResult<()> {
    validate(config)?;

    let content = if is_json(path) {
        serde_json::to_string_pretty(config)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_yaml::to_string(config).map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?
    };

    std::fs::write(path, content).map_err(|e| AppError::ConfigFileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

/// Validate config structure. The same checks run on every load.
pub fn validate(config: &SystemConfig) -> AppResult<()> {
    zf_config::validate_config(config)?;
    Ok(())
}

/// List all zones in the config with summaries.
pub fn list_zones(config: &SystemConfig) -> Vec<ZoneSummary> {
    config
        .zones
        .iter()
        .map(|zone| ZoneSummary {
            name: zone.name.clone(),
            setpoint: zone.setpoint,
            range: (zone.range.min, zone.range.max),
            enabled: zone.enabled,
            voting: zone.voting,
            source_count: zone.sensor.sources.len(),
            median_depth: zone.sensor.median_depth,
            has_economizer: zone.economizer.is_some(),
            schedule_periods: config.schedule.iter().filter(|entry| entry.zone == zone.name).count(),
        })
        .collect()
}

/// Get a specific zone by name.
pub fn get_zone<'a>(config: &'a SystemConfig, name: &str) -> AppResult<&'a ZoneDef> {
    config
        .zones
        .iter()
        .find(|zone| zone.name == name)
        .ok_or_else(|| AppError::ZoneNotFound(name.to_string()))
}
