//! Shared application service layer for zoneflow.
//!
//! Turns a validated configuration into running zones: sensor chains feeding
//! zones, zone statuses arbitrated into one unit command, and the scheduler
//! keeping zones in their periods. The same assembly can be driven live on
//! tokio tasks ([`Runtime`]) or synchronously over recorded readings
//! ([`replay()`]).

pub mod build;
pub mod config_service;
pub mod error;
pub mod replay;
pub mod runtime;
pub mod sensor;

// Re-export key types for convenience
pub use build::{
    build_economizer, build_schedules, build_thermostat, build_zone, economizer_settings, initial_settings,
    scheduler_config, unit_command,
};
pub use config_service::{ZoneSummary, get_zone, list_zones, load_config, save_config, validate};
pub use error::{AppError, AppResult};
pub use replay::{ReplayReport, Reading, UnitRecord, parse_readings, replay};
pub use runtime::{Runtime, RuntimeOptions};
pub use sensor::{OrderGuard, SensorChain, SensorReading};
