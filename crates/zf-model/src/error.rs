//! Error types for zone model configuration.

use crate::device::HvacMode;
use thiserror::Error;
use zf_controls::ControlError;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("{setpoint} is outside of {min}..{max}")]
    SetpointOutOfRange { setpoint: f64, min: f64, max: f64 },

    #[error("Zone '{zone}' has no setpoint")]
    MissingSetpoint { zone: String },

    #[error("Duplicate zone name: {name}")]
    DuplicateZone { name: String },

    #[error("Requested mode {mode} is not among available on {device}: {available:?}")]
    UnsupportedMode {
        mode: HvacMode,
        device: String,
        available: Vec<HvacMode>,
    },

    #[error("Device {device} failed: {message}")]
    Device { device: String, message: String },

    #[error(transparent)]
    Control(#[from] ControlError),
}
