//! Error types for schedule parsing and fetching.

use chrono::NaiveTime;
use thiserror::Error;
use zf_model::ModelError;

pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Period name can't be empty")]
    EmptyName,

    #[error("Days argument malformed, expected seven characters starting with Monday: '{days}'")]
    MalformedDays { days: String },

    #[error("Start and end time are the same: {time}")]
    SameStartEnd { time: NaiveTime },

    #[error("Tried all available formats to parse '{text}' and failed, giving up")]
    BadTime { text: String },

    #[error("Could not parse setpoint out of '{text}'")]
    MissingSetpoint { text: String },

    #[error("can't parse '{text}' (malformed setpoint '{token}')")]
    MalformedSetpoint { text: String, token: String },

    #[error("Could not parse dump priority out of '{token}'")]
    BadDumpPriority { token: String },

    #[error("Can't parse period name out of event title '{title}' ({reason})")]
    BadPeriodName { title: String, reason: &'static str },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Schedule source failed: {message}")]
    Source { message: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}
