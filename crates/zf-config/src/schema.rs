//! Configuration file schema.

use serde::{Deserialize, Serialize};
use zf_model::HvacMode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemConfig {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub unit: UnitDef,
    #[serde(default)]
    pub zones: Vec<ZoneDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient: Option<SensorDef>,
    #[serde(default)]
    pub scheduler: SchedulerDef,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntryDef>,
}

/// The shared HVAC unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitDef {
    #[serde(default = "default_unit_name")]
    pub name: String,
    #[serde(default = "default_mode")]
    pub mode: HvacMode,
    /// Identical commands closer than this are not repeated.
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
}

impl Default for UnitDef {
    fn default() -> Self {
        Self {
            name: default_unit_name(),
            mode: default_mode(),
            rate_limit_ms: default_rate_limit_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneDef {
    pub name: String,
    pub setpoint: f64,
    #[serde(default)]
    pub range: RangeDef,
    pub pid: PidDef,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub voting: bool,
    #[serde(default)]
    pub dump_priority: i32,
    pub sensor: SensorDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub economizer: Option<EconomizerDef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RangeDef {
    pub min: f64,
    pub max: f64,
}

impl Default for RangeDef {
    fn default() -> Self {
        Self { min: 10.0, max: 40.0 }
    }
}

/// PID gains. Positive for cooling, negative for heating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PidDef {
    pub p: f64,
    #[serde(default)]
    pub i: f64,
    #[serde(default)]
    pub d: f64,
    #[serde(default)]
    pub limit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integral_span_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivative_span_s: Option<f64>,
}

/// Sensor chain: fallback over `sources`, then a median, then a timeout guard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorDef {
    /// Highest priority first.
    pub sources: Vec<String>,
    #[serde(default = "default_median_depth")]
    pub median_depth: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub repeat: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EconomizerDef {
    pub mode: HvacMode,
    pub changeover_delta: f64,
    pub target_temperature: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub keep_hvac_on: bool,
    #[serde(default = "default_max_power")]
    pub max_power: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<PidDef>,
    #[serde(default = "default_economizer_timeout_s")]
    pub timeout_s: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SchedulerDef {
    #[serde(default = "default_granularity_s")]
    pub granularity_s: u64,
    #[serde(default = "default_poll_interval_s")]
    pub poll_interval_s: u64,
}

impl Default for SchedulerDef {
    fn default() -> Self {
        Self {
            granularity_s: default_granularity_s(),
            poll_interval_s: default_poll_interval_s(),
        }
    }
}

/// A static schedule period. `settings` uses the calendar text syntax, e.g.
/// `setpoint 18, non-voting`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntryDef {
    pub zone: String,
    pub period: String,
    pub start: String,
    pub end: String,
    /// Seven characters, Monday first, space for days off.
    pub days: String,
    pub settings: String,
}

fn default_true() -> bool {
    true
}

fn default_unit_name() -> String {
    "unit".to_string()
}

fn default_mode() -> HvacMode {
    HvacMode::Cooling
}

fn default_rate_limit_ms() -> u64 {
    1_000
}

fn default_median_depth() -> usize {
    1
}

fn default_timeout_ms() -> u64 {
    90_000
}

fn default_max_power() -> f64 {
    1.0
}

fn default_economizer_timeout_s() -> u64 {
    90
}

fn default_granularity_s() -> u64 {
    10
}

fn default_poll_interval_s() -> u64 {
    60
}
