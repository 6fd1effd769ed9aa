//! Error types for filter construction.

use std::time::Duration;
use thiserror::Error;

pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Fallback chain is empty")]
    EmptyChain,

    #[error("Duplicate source in fallback chain: {source_id}")]
    DuplicateSource { source_id: String },

    #[error("Unreasonably short timeout of {timeout:?}")]
    TimeoutTooShort { timeout: Duration },
}
