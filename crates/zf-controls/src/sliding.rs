//! O(1) sliding-window estimators used by the PID controller.
//!
//! Both keep only the samples inside a time span and update their result
//! incrementally, so a compute step costs amortized constant time no matter
//! how long the controller has been running.

use chrono::TimeDelta;
use std::collections::VecDeque;
use std::time::Duration;
use zf_core::Timestamp;

fn seconds(delta: TimeDelta) -> f64 {
    delta
        .num_microseconds()
        .map_or_else(|| delta.num_milliseconds() as f64 / 1e3, |us| us as f64 / 1e6)
}

fn span_of(span: Duration) -> TimeDelta {
    TimeDelta::from_std(span).unwrap_or(TimeDelta::MAX)
}

/// Trapezoidal integral over a sliding time window.
///
/// Each sample stores the area of the trapezoid between itself and its
/// predecessor; the running sum is adjusted as samples enter and leave.
#[derive(Debug, Clone)]
pub struct SlidingIntegral {
    span: TimeDelta,
    samples: VecDeque<(Timestamp, f64)>,
    last: Option<(Timestamp, f64)>,
    sum: f64,
}

impl SlidingIntegral {
    pub fn new(span: Duration) -> Self {
        Self {
            span: span_of(span),
            samples: VecDeque::new(),
            last: None,
            sum: 0.0,
        }
    }

    /// Add a sample and return the integral over the window, in value-seconds.
    ///
    /// # Panics
    ///
    /// If `timestamp` is not strictly after the previous sample.
    pub fn append(&mut self, timestamp: Timestamp, value: f64) -> f64 {
        let area = match self.last {
            Some((last_t, last_v)) => {
                assert!(
                    timestamp > last_t,
                    "data element out of sequence: last key is {last_t}, key being added is {timestamp}"
                );
                (value + last_v) / 2.0 * seconds(timestamp - last_t)
            }
            None => 0.0,
        };

        self.last = Some((timestamp, value));
        self.samples.push_back((timestamp, area));
        self.sum += area;
        self.expire(timestamp);
        self.sum
    }

    fn expire(&mut self, now: Timestamp) {
        let Some(cutoff) = now.checked_sub_signed(self.span) else {
            return;
        };
        while self.samples.front().is_some_and(|(t, _)| *t < cutoff) {
            self.samples.pop_front();
            // The segment leading into the new oldest sample now starts outside the window
            if let Some(front) = self.samples.front_mut() {
                self.sum -= front.1;
                front.1 = 0.0;
            }
        }
    }

    pub fn integral(&self) -> f64 {
        self.sum
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.last = None;
        self.sum = 0.0;
    }
}

/// Average slope over a sliding time window.
///
/// The two most recent samples are always kept, so a window shorter than the
/// sampling interval degrades to a two-point difference.
#[derive(Debug, Clone)]
pub struct SlidingDerivative {
    span: TimeDelta,
    samples: VecDeque<(Timestamp, f64)>,
}

impl SlidingDerivative {
    pub fn new(span: Duration) -> Self {
        Self {
            span: span_of(span),
            samples: VecDeque::new(),
        }
    }

    /// Add a sample and return the slope over the window, per second.
    ///
    /// Zero until two samples are known. Two samples with equal timestamps
    /// produce a non-finite result, which the caller is expected to discard.
    pub fn append(&mut self, timestamp: Timestamp, value: f64) -> f64 {
        self.samples.push_back((timestamp, value));
        if let Some(cutoff) = timestamp.checked_sub_signed(self.span) {
            while self.samples.len() > 2 && self.samples.front().is_some_and(|(t, _)| *t < cutoff) {
                self.samples.pop_front();
            }
        }
        self.derivative()
    }

    pub fn derivative(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() > 1 => {
                (last.1 - first.1) / seconds(last.0 - first.0)
            }
            _ => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
