//! zf-model: zones and the shared unit.
//!
//! Contains:
//! - settings (sparse, mergeable zone and economizer settings)
//! - status (calling, zone, economizer and unit command payloads)
//! - device (HVAC device seam)
//! - thermostat (PID + hysteresis renderer)
//! - economizer (free conditioning loop)
//! - zone (thermostat + settings + economizer)
//! - zone_controller (multi-zone demand arbitration)
//!
//! Demand sign convention follows the thermostat PID gains: positive gains
//! mean cooling, negative mean heating.

pub mod device;
pub mod economizer;
pub mod error;
pub mod settings;
pub mod status;
pub mod thermostat;
pub mod zone;
pub mod zone_controller;

pub use device::{HvacCommand, HvacDevice, HvacMode, NullDevice};
pub use economizer::{
    DEFAULT_ECONOMIZER_TIMEOUT, Economizer, EconomizerConfig, EconomizerGains, compute_combined,
};
pub use error::{ModelError, ModelResult};
pub use settings::{EconomizerSettings, PeriodSettings, ZoneSettings};
pub use status::{CallingStatus, EconomizerStatus, UnitControlSignal, ZoneState, ZoneStatus};
pub use thermostat::{SetpointRange, Thermostat, ThermostatConfig};
pub use zone::Zone;
pub use zone_controller::{ZoneController, compute_demand};
