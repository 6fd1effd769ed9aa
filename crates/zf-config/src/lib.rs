//! zf-config: configuration file format and validation.

pub mod migrate;
pub mod schema;
pub mod validate;

pub use migrate::{FIRST_VERSION, LATEST_VERSION, migrate_to_latest};
pub use schema::*;
pub use validate::{ValidationError, validate_config};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Migration error: {what}")]
    Migration { what: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse, migrate and validate YAML text.
pub fn from_yaml_str(content: &str) -> ConfigResult<SystemConfig> {
    let config: SystemConfig = serde_yaml::from_str(content)?;
    let config = migrate_to_latest(config)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_yaml(path: &std::path::Path) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    from_yaml_str(&content)
}

pub fn save_yaml(path: &std::path::Path, config: &SystemConfig) -> ConfigResult<()> {
    validate_config(config)?;
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Parse, migrate and validate JSON text.
pub fn from_json_str(content: &str) -> ConfigResult<SystemConfig> {
    let config: SystemConfig = serde_json::from_str(content)?;
    let config = migrate_to_latest(config)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_json(path: &std::path::Path) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    from_json_str(&content)
}

pub fn save_json(path: &std::path::Path, config: &SystemConfig) -> ConfigResult<()> {
    validate_config(config)?;
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
