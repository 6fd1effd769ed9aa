//! Median across the latest readings of several sources.

use crate::median::{Average, reduce};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tracing::{debug, trace};
use zf_core::{Signal, SignalProcessor, mean};

/// Keeps the latest signal per payload and emits the median across them.
///
/// With fewer than two known sources the input passes through untouched.
/// Readings older than `max_stale` relative to the incoming signal are
/// forgotten; a zero `max_stale` never expires anything.
#[derive(Debug, Clone)]
pub struct MedianSetFilter<T, P> {
    average: Average<T>,
    max_stale: Duration,
    last_known: HashMap<Option<P>, Signal<T, P>>,
}

impl<T, P> MedianSetFilter<T, P>
where
    T: PartialOrd + Clone,
    P: Eq + Hash + Clone,
{
    pub fn new(average: Average<T>) -> Self {
        Self {
            average,
            max_stale: Duration::ZERO,
            last_known: HashMap::new(),
        }
    }

    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    /// Number of sources currently contributing.
    pub fn sources(&self) -> usize {
        self.last_known.len()
    }

    pub fn filter(&mut self, input: Signal<T, P>) -> Signal<T, P> {
        self.expire(&input);

        let key = input.payload().cloned();
        self.last_known.insert(key, input.clone());

        if self.last_known.len() < 2 {
            trace!(sources = self.last_known.len(), "not enough sources, passing through");
            return input;
        }

        let timestamp = input.timestamp();
        let payload = input.payload().cloned();
        reduce(self.last_known.values(), self.average).into_signal(timestamp, payload)
    }

    fn expire(&mut self, input: &Signal<T, P>) {
        if self.max_stale.is_zero() {
            return;
        }
        let Ok(max_stale) = chrono::TimeDelta::from_std(self.max_stale) else {
            return;
        };
        let retire = input.timestamp() - max_stale;
        let before = self.last_known.len();
        self.last_known.retain(|_, s| s.timestamp() >= retire);
        if self.last_known.len() != before {
            debug!(expired = before - self.last_known.len(), %retire, "stale readings dropped");
        }
    }
}

impl<P: Eq + Hash + Clone> MedianSetFilter<f64, P> {
    pub fn arithmetic() -> Self {
        Self::new(mean)
    }
}

impl<T, P> SignalProcessor for MedianSetFilter<T, P>
where
    T: PartialOrd + Clone + Send + 'static,
    P: Eq + Hash + Clone + Send + 'static,
{
    type Input = Signal<T, P>;
    type Output = Signal<T, P>;

    fn process(&mut self, input: Signal<T, P>) -> Option<Signal<T, P>> {
        Some(self.filter(input))
    }
}
