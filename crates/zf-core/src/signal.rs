//! Signal envelope: a timestamped value carrying a health status.
//!
//! Every stage in the control core consumes and produces [`Signal`]s. The
//! envelope keeps three states apart:
//!
//! - **OK**: value present, no error
//! - **Partial failure**: value present (best effort) and an error describing
//!   the degraded contributing source
//! - **Total failure**: no value, error present
//!
//! The optional payload identifies the originating source (zone name, sensor
//! address) and is carried through filters untouched.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Point in time a signal was observed at.
pub type Timestamp = DateTime<Utc>;

/// Health of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignalStatus {
    Ok,
    FailurePartial,
    FailureTotal,
}

/// Why a signal is degraded or missing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    /// No input arrived within the guard interval.
    #[error("{marker}: timeout of {timeout:?} is exceeded")]
    Timeout { marker: String, timeout: Duration },

    /// The sensor reported a failure.
    #[error("sensor failure: {message}")]
    Sensor { message: String },

    /// The input is older than allowed.
    #[error("stale {what}")]
    Stale { what: String },

    /// A required input has not been seen yet.
    #[error("missing {what}")]
    Missing { what: String },

    /// An upstream stage failed.
    #[error("{what}: {message}")]
    Upstream { what: String, message: String },
}

impl SignalError {
    pub fn sensor(message: impl Into<String>) -> Self {
        Self::Sensor {
            message: message.into(),
        }
    }

    pub fn timeout(marker: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            marker: marker.into(),
            timeout,
        }
    }
}

/// Timestamped value with status and optional source payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal<T, P = ()> {
    timestamp: Timestamp,
    value: Option<T>,
    payload: Option<P>,
    status: SignalStatus,
    error: Option<SignalError>,
}

impl<T, P> Signal<T, P> {
    /// Healthy signal without payload.
    pub fn new(timestamp: Timestamp, value: T) -> Self {
        Self {
            timestamp,
            value: Some(value),
            payload: None,
            status: SignalStatus::Ok,
            error: None,
        }
    }

    /// Healthy signal attributed to a source.
    pub fn with_payload(timestamp: Timestamp, value: T, payload: P) -> Self {
        Self {
            timestamp,
            value: Some(value),
            payload: Some(payload),
            status: SignalStatus::Ok,
            error: None,
        }
    }

    /// Best-effort value accompanied by the error that degraded it.
    pub fn partial(timestamp: Timestamp, value: T, payload: Option<P>, error: SignalError) -> Self {
        Self {
            timestamp,
            value: Some(value),
            payload,
            status: SignalStatus::FailurePartial,
            error: Some(error),
        }
    }

    /// Total failure: no value, just the reason.
    pub fn failure(timestamp: Timestamp, payload: Option<P>, error: SignalError) -> Self {
        Self {
            timestamp,
            value: None,
            payload,
            status: SignalStatus::FailureTotal,
            error: Some(error),
        }
    }

    /// Assemble a signal from raw parts, checking the envelope invariants.
    pub fn from_parts(
        timestamp: Timestamp,
        value: Option<T>,
        payload: Option<P>,
        status: SignalStatus,
        error: Option<SignalError>,
    ) -> CoreResult<Self> {
        match (status, value.is_some(), error.is_some()) {
            (SignalStatus::Ok, true, false)
            | (SignalStatus::FailurePartial, true, true)
            | (SignalStatus::FailureTotal, false, true) => Ok(Self {
                timestamp,
                value,
                payload,
                status,
                error,
            }),
            (SignalStatus::FailureTotal, true, _) => Err(CoreError::InvalidSignal {
                what: "total failure can't carry a value",
            }),
            (SignalStatus::Ok, _, true) => Err(CoreError::InvalidSignal {
                what: "healthy signal can't carry an error",
            }),
            (SignalStatus::Ok | SignalStatus::FailurePartial, false, _) => {
                Err(CoreError::InvalidSignal {
                    what: "value is required unless the failure is total",
                })
            }
            (_, _, false) => Err(CoreError::InvalidSignal {
                what: "failed signal must carry an error",
            }),
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    pub fn status(&self) -> SignalStatus {
        self.status
    }

    pub fn error(&self) -> Option<&SignalError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.status == SignalStatus::Ok
    }

    pub fn is_partial(&self) -> bool {
        self.status == SignalStatus::FailurePartial
    }

    /// Only a total failure counts as an error; a partial failure still has a usable value.
    pub fn is_error(&self) -> bool {
        self.status == SignalStatus::FailureTotal
    }

    /// Transform the value, keeping timestamp, payload and status.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Signal<U, P> {
        Signal {
            timestamp: self.timestamp,
            value: self.value.map(f),
            payload: self.payload,
            status: self.status,
            error: self.error,
        }
    }

    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> Signal<T, Q> {
        Signal {
            timestamp: self.timestamp,
            value: self.value,
            payload: self.payload.map(f),
            status: self.status,
            error: self.error,
        }
    }

    pub fn replace_payload<Q>(self, payload: Option<Q>) -> Signal<T, Q> {
        Signal {
            timestamp: self.timestamp,
            value: self.value,
            payload,
            status: self.status,
            error: self.error,
        }
    }

    pub fn without_payload(self) -> Signal<T, ()> {
        self.replace_payload(None)
    }

    /// Mark a healthy signal as partially failed; a failed signal keeps its own error.
    pub fn degrade(self, error: SignalError) -> Self {
        match self.status {
            SignalStatus::Ok => Self {
                status: SignalStatus::FailurePartial,
                error: Some(error),
                ..self
            },
            _ => self,
        }
    }

    /// Re-type a total failure so it can pass a stage that has nothing to
    /// compute on it; anything else is handed back unchanged.
    pub fn into_failure<U>(self) -> Result<Signal<U, P>, Self> {
        if self.is_error() {
            Ok(Signal {
                timestamp: self.timestamp,
                value: None,
                payload: self.payload,
                status: self.status,
                error: self.error,
            })
        } else {
            Err(self)
        }
    }

    /// Carry this signal's status and error over to a new value.
    ///
    /// A total failure stays valueless whatever `value` is.
    pub fn with_value<U>(&self, value: U) -> Signal<U, P>
    where
        P: Clone,
    {
        Signal {
            timestamp: self.timestamp,
            value: if self.is_error() { None } else { Some(value) },
            payload: self.payload.clone(),
            status: self.status,
            error: self.error.clone(),
        }
    }
}

impl<T: fmt::Debug, P: fmt::Debug> fmt::Display for Signal<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{@{}, value={:?}", self.timestamp, self.value)?;
        if let Some(payload) = &self.payload {
            write!(f, ", payload={payload:?}")?;
        }
        write!(f, ", status={:?}", self.status)?;
        if let Some(error) = &self.error {
            write!(f, ", error={error}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> Timestamp {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn healthy_signal() {
        let s: Signal<f64> = Signal::new(ts(1), 42.0);
        assert!(s.is_ok());
        assert!(!s.is_error());
        assert_eq!(s.value(), Some(&42.0));
        assert!(s.error().is_none());
    }

    #[test]
    fn partial_is_not_error() {
        let s: Signal<f64> = Signal::partial(ts(1), -42.0, None, SignalError::sensor("stale"));
        assert!(s.is_partial());
        assert!(!s.is_error());
        assert_eq!(s.value(), Some(&-42.0));
    }

    #[test]
    fn total_failure_has_no_value() {
        let s: Signal<f64> = Signal::failure(ts(1), None, SignalError::sensor("gone"));
        assert!(s.is_error());
        assert!(s.value().is_none());
        assert_eq!(s.error(), Some(&SignalError::sensor("gone")));
    }

    #[test]
    fn from_parts_enforces_invariants() {
        assert!(Signal::<f64>::from_parts(ts(1), None, None, SignalStatus::Ok, None).is_err());
        assert!(
            Signal::<f64>::from_parts(ts(1), Some(1.0), None, SignalStatus::FailurePartial, None)
                .is_err()
        );
        assert!(
            Signal::<f64>::from_parts(
                ts(1),
                Some(1.0),
                None,
                SignalStatus::FailureTotal,
                Some(SignalError::sensor("x"))
            )
            .is_err()
        );
        assert!(
            Signal::<f64>::from_parts(
                ts(1),
                Some(1.0),
                None,
                SignalStatus::Ok,
                Some(SignalError::sensor("x"))
            )
            .is_err()
        );
        assert!(
            Signal::<f64>::from_parts(
                ts(1),
                None,
                None,
                SignalStatus::FailureTotal,
                Some(SignalError::sensor("x"))
            )
            .is_ok()
        );
    }

    #[test]
    fn map_keeps_envelope() {
        let s = Signal::with_payload(ts(5), 2.0, "kitchen").degrade(SignalError::sensor("flaky"));
        let m = s.map(|v| v * 2.0);
        assert_eq!(m.value(), Some(&4.0));
        assert_eq!(m.payload(), Some(&"kitchen"));
        assert!(m.is_partial());
        assert_eq!(m.timestamp(), ts(5));
    }

    #[test]
    fn payload_helpers() {
        let s = Signal::with_payload(ts(5), 2.0, "kitchen");
        let named = s.clone().map_payload(|p| p.len());
        assert_eq!(named.payload(), Some(&7));
        assert_eq!(named.value(), Some(&2.0));

        let bare = s.without_payload();
        assert!(bare.payload().is_none());
        assert!(bare.is_ok());
    }

    #[test]
    fn degrade_leaves_total_failure_alone() {
        let s: Signal<f64> = Signal::failure(ts(1), None, SignalError::sensor("first"));
        let d = s.degrade(SignalError::sensor("second"));
        assert!(d.is_error());
        assert_eq!(d.error(), Some(&SignalError::sensor("first")));
    }

    #[test]
    fn with_value_drops_value_on_total_failure() {
        let s: Signal<f64, &str> = Signal::failure(ts(1), Some("a"), SignalError::sensor("gone"));
        let t = s.with_value(true);
        assert!(t.is_error());
        assert!(t.value().is_none());
        assert_eq!(t.payload(), Some(&"a"));
    }

    #[test]
    fn into_failure_only_takes_total_failures() {
        let ok: Signal<f64> = Signal::new(ts(1), 1.0);
        assert!(ok.into_failure::<bool>().is_err());

        let failed: Signal<f64> = Signal::failure(ts(1), None, SignalError::sensor("gone"));
        let retyped: Signal<bool> = failed.into_failure().unwrap();
        assert!(retyped.is_error());
    }

    #[test]
    fn timeout_message() {
        let e = SignalError::timeout("sensor1", Duration::from_millis(50));
        assert_eq!(e.to_string(), "sensor1: timeout of 50ms is exceeded");
    }
}
