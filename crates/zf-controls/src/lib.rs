//! Process controllers for zoneflow.
//!
//! A process controller turns a stream of process-variable samples into a
//! stream of corrective signals. Two controllers are provided:
//!
//! - **PID**: proportional, integral and derivative action with anti-windup,
//!   backed by O(1) sliding-window integral and derivative estimators
//! - **Hysteresis**: two-state controller with independent low/high thresholds
//!
//! Both share the setpoint and error bookkeeping in [`ControllerCore`] and
//! implement [`ProcessController`].
//!
//! # Sign convention
//!
//! `error = pv - setpoint`. Positive gains mean cooling, negative gains mean
//! heating. This is a caller-level convention and is not enforced here beyond
//! requiring at least one non-zero gain.

pub mod controller;
pub mod error;
pub mod hysteresis;
pub mod pid;
pub mod sliding;

pub use controller::{ControllerCore, ControllerStatus, ProcessController};
pub use error::{ControlError, ControlResult};
pub use hysteresis::{HysteresisController, HysteresisSample, HysteresisStatus};
pub use pid::{PidConfig, PidController, PidStatus, PidTerms};
pub use sliding::{SlidingDerivative, SlidingIntegral};
