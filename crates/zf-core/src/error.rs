use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    /// Status, value and error of a signal don't agree.
    #[error("Invalid signal: {what}")]
    InvalidSignal { what: &'static str },
}
