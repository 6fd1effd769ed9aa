//! Schema versions.

use crate::ConfigError;
use crate::schema::SystemConfig;

/// The first file format. Nothing older exists to upgrade from.
pub const FIRST_VERSION: u32 = 1;

pub const LATEST_VERSION: u32 = 1;

/// Bring a file up to [`LATEST_VERSION`].
///
/// Only the first format exists so far, so this rejects versions older than
/// [`FIRST_VERSION`] and passes everything else through. Versions newer than
/// [`LATEST_VERSION`] are left to validation.
pub fn migrate_to_latest(config: SystemConfig) -> Result<SystemConfig, ConfigError> {
    if config.version < FIRST_VERSION {
        return Err(ConfigError::Migration {
            what: format!(
                "No migration path from version {} (the first supported version is {})",
                config.version, FIRST_VERSION
            ),
        });
    }
    Ok(config)
}
