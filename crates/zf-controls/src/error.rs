//! Error types for process controller operations.

use thiserror::Error;

/// Result type for process controller operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur configuring a process controller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Numeric argument out of its allowed range.
    #[error("Invalid value for {what}: {value}")]
    InvalidValue { what: &'static str, value: f64 },
}

impl From<zf_core::CoreError> for ControlError {
    fn from(err: zf_core::CoreError) -> Self {
        match err {
            zf_core::CoreError::NonFinite { what, value } => ControlError::InvalidValue { what, value },
            zf_core::CoreError::InvalidSignal { what } => ControlError::InvalidArg { what },
        }
    }
}
