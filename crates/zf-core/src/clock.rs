//! Wall clock abstraction.
//!
//! Stages that stamp synthesized signals (timeout guard, economizer, thermostat
//! nudges) take an `Arc<dyn Clock>` so tests can drive time by hand.

use crate::signal::Timestamp;
use chrono::{Local, NaiveDateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;

pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Timestamp;

    /// Current local wall-clock time, used for schedule matching.
    fn local_now(&self) -> NaiveDateTime {
        self.now().with_timezone(&Local).naive_local()
    }
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// Local time is reported as the UTC wall time so results don't depend on the
/// host time zone.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(by) = chrono::Duration::from_std(by) {
            *self.now.lock() += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }

    fn local_now(&self) -> NaiveDateTime {
        self.now.lock().naive_utc()
    }
}
