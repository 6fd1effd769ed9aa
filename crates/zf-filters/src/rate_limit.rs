//! Suppress repeated signals arriving faster than allowed.

use std::fmt;
use std::time::Duration;
use tracing::trace;
use zf_core::{Signal, SignalProcessor};

/// Decides whether two signals carry the same information.
pub type SignalEquals<T, P> = fn(&Signal<T, P>, &Signal<T, P>) -> bool;

/// Same value and same status; timestamps and payloads are ignored.
pub fn same_value<T: PartialEq, P>(a: &Signal<T, P>, b: &Signal<T, P>) -> bool {
    a.status() == b.status() && a.value() == b.value()
}

/// Drops a signal only when it equals the last emitted one *and* arrives
/// sooner than `min_interval` after it. Anything else passes.
#[derive(Clone)]
pub struct RateLimiter<T, P = ()> {
    min_interval: Duration,
    equals: SignalEquals<T, P>,
    last: Option<Signal<T, P>>,
}

impl<T, P> fmt::Debug for RateLimiter<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("min_interval", &self.min_interval)
            .field("primed", &self.last.is_some())
            .finish()
    }
}

impl<T: Clone, P: Clone> RateLimiter<T, P> {
    pub fn new(min_interval: Duration, equals: SignalEquals<T, P>) -> Self {
        Self {
            min_interval,
            equals,
            last: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn filter(&mut self, input: Signal<T, P>) -> Option<Signal<T, P>> {
        if let Some(last) = &self.last {
            let elapsed = (input.timestamp() - last.timestamp()).to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.min_interval && (self.equals)(last, &input) {
                trace!(?elapsed, "duplicate within interval, dropped");
                return None;
            }
        }
        self.last = Some(input.clone());
        Some(input)
    }
}

impl<T: PartialEq + Clone, P: Clone> RateLimiter<T, P> {
    /// Limiter comparing value and status.
    pub fn by_value(min_interval: Duration) -> Self {
        Self::new(min_interval, same_value)
    }
}

impl<T, P> SignalProcessor for RateLimiter<T, P>
where
    T: Clone + Send + 'static,
    P: Clone + Send + 'static,
{
    type Input = Signal<T, P>;
    type Output = Signal<T, P>;

    fn process(&mut self, input: Signal<T, P>) -> Option<Signal<T, P>> {
        self.filter(input)
    }
}
