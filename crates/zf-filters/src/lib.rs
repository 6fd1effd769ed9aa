//! zf-filters: signal conditioning stages.
//!
//! Every filter is a [`zf_core::SignalProcessor`] over [`zf_core::Signal`]s and
//! follows the same degradation contract: a result computed from some failed
//! inputs is `FailurePartial`, a result with nothing usable is `FailureTotal`.
//!
//! - median (sliding window over one source)
//! - median_set (latest reading per source)
//! - fallback (ordered source chain)
//! - timeout (synthetic failure on silence)
//! - rate_limit (drop repeated values arriving too fast)

pub mod error;
pub mod fallback;
pub mod median;
pub mod median_set;
pub mod rate_limit;
pub mod timeout;

pub use error::{FilterError, FilterResult};
pub use fallback::FallbackFilter;
pub use median::MedianFilter;
pub use median_set::MedianSetFilter;
pub use rate_limit::RateLimiter;
pub use timeout::TimeoutGuard;
