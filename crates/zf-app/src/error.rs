//! Error types for the zf-app service layer.

use std::path::PathBuf;

/// Application error type that wraps errors from the library crates and
/// provides a unified error interface for the CLI.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to read config file: {path}")]
    ConfigFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file: {path}")]
    ConfigFileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config validation failed: {0}")]
    Validation(String),

    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("Unknown sensor source: {0}")]
    SourceNotFound(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Filter error: {0}")]
    Filter(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Controller error: {0}")]
    Control(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Runtime is shut down")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for zf-app operations.
pub type AppResult<T> = Result<T, AppError>;

// Conversions from library error types
impl From<zf_config::ConfigError> for AppError {
    fn from(err: zf_config::ConfigError) -> Self {
        match err {
            zf_config::ConfigError::Validation(e) => AppError::Validation(e.to_string()),
            other => AppError::Config(other.to_string()),
        }
    }
}

impl From<zf_config::ValidationError> for AppError {
    fn from(err: zf_config::ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<zf_model::ModelError> for AppError {
    fn from(err: zf_model::ModelError) -> Self {
        AppError::Model(err.to_string())
    }
}

impl From<zf_filters::FilterError> for AppError {
    fn from(err: zf_filters::FilterError) -> Self {
        AppError::Filter(err.to_string())
    }
}

impl From<zf_scheduler::ScheduleError> for AppError {
    fn from(err: zf_scheduler::ScheduleError) -> Self {
        AppError::Schedule(err.to_string())
    }
}

impl From<zf_controls::ControlError> for AppError {
    fn from(err: zf_controls::ControlError) -> Self {
        AppError::Control(err.to_string())
    }
}
