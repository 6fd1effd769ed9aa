//! zf-core: stable foundation for zoneflow.
//!
//! Contains:
//! - signal (timestamped value envelope with health status)
//! - clock (wall clock abstraction, manual clock for tests)
//! - processor (the stage contract every filter and controller implements)
//! - stream (bounded channel plumbing between stages)
//! - units (uom temperature types + conversions)
//! - numeric (finiteness checks, averaging, power fractions)
//! - error (shared error types)

pub mod clock;
pub mod error;
pub mod numeric;
pub mod processor;
pub mod signal;
pub mod stream;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use numeric::*;
pub use processor::SignalProcessor;
pub use signal::{Signal, SignalError, SignalStatus, Timestamp};
pub use units::*;
