//! Sliding-window median over a single source.

use crate::error::{FilterError, FilterResult};
use std::cmp::Ordering;
use std::collections::VecDeque;
use tracing::trace;
use zf_core::{Signal, SignalError, SignalProcessor, Timestamp, mean};

/// Combines the two middle values of an even-sized set.
pub type Average<T> = fn(&T, &T) -> T;

/// Outcome of reducing a set of signals to their median.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reduced<T> {
    pub value: Option<T>,
    pub error: Option<SignalError>,
}

impl<T> Reduced<T> {
    /// Wrap the outcome into a signal carrying the given timestamp and payload.
    ///
    /// No usable value means total failure; any error next to a value means
    /// partial failure.
    pub fn into_signal<P>(self, timestamp: Timestamp, payload: Option<P>) -> Signal<T, P> {
        match (self.value, self.error) {
            (Some(value), None) => Signal::<T, ()>::new(timestamp, value).replace_payload(payload),
            (Some(value), Some(error)) => Signal::partial(timestamp, value, payload, error),
            (None, error) => Signal::failure(
                timestamp,
                payload,
                error.unwrap_or_else(|| SignalError::Missing {
                    what: "median input".into(),
                }),
            ),
        }
    }
}

/// Median of every value-bearing signal, plus the most recent error seen.
///
/// Partial failures contribute their best-effort value. Errors are ranked by
/// timestamp; on equal timestamps the later one in iteration order wins.
pub(crate) fn reduce<'a, T, P>(
    signals: impl IntoIterator<Item = &'a Signal<T, P>>,
    average: Average<T>,
) -> Reduced<T>
where
    T: PartialOrd + Clone + 'a,
    P: 'a,
{
    let mut values: Vec<&T> = Vec::new();
    let mut latest_error: Option<(Timestamp, &SignalError)> = None;

    for signal in signals {
        if let Some(value) = signal.value() {
            values.push(value);
        }
        if let Some(error) = signal.error() {
            match latest_error {
                Some((at, _)) if at > signal.timestamp() => {}
                _ => latest_error = Some((signal.timestamp(), error)),
            }
        }
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let n = values.len();
    let value = match n {
        0 => None,
        _ if n % 2 == 1 => Some(values[n / 2].clone()),
        _ => Some(average(values[n / 2 - 1], values[n / 2])),
    };

    Reduced {
        value,
        error: latest_error.map(|(_, e)| e.clone()),
    }
}

/// Median over the last `depth` signals of one stream.
///
/// Until the window fills, the median is taken over whatever has arrived.
/// The output keeps the timestamp and payload of the signal that triggered it.
#[derive(Debug, Clone)]
pub struct MedianFilter<T, P = ()> {
    depth: usize,
    average: Average<T>,
    buffer: VecDeque<Signal<T, P>>,
}

impl<T, P> MedianFilter<T, P>
where
    T: PartialOrd + Clone,
    P: Clone,
{
    /// # Arguments
    ///
    /// * `depth` - Window size, at least 1
    /// * `average` - Combines the two middle values when the count is even
    pub fn new(depth: usize, average: Average<T>) -> FilterResult<Self> {
        if depth < 1 {
            return Err(FilterError::InvalidArg {
                what: "median depth must be at least 1",
            });
        }
        Ok(Self {
            depth,
            average,
            buffer: VecDeque::with_capacity(depth),
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Push one signal and compute the median of the window.
    pub fn filter(&mut self, input: Signal<T, P>) -> Signal<T, P> {
        if self.buffer.len() == self.depth {
            self.buffer.pop_front();
        }
        let timestamp = input.timestamp();
        let payload = input.payload().cloned();
        self.buffer.push_back(input);

        let reduced = reduce(self.buffer.iter(), self.average);
        trace!(depth = self.depth, buffered = self.buffer.len(), "median computed");
        reduced.into_signal(timestamp, payload)
    }
}

impl<P: Clone> MedianFilter<f64, P> {
    /// Median over plain numbers, even counts averaged arithmetically.
    pub fn arithmetic(depth: usize) -> FilterResult<Self> {
        Self::new(depth, mean)
    }
}

impl<T, P> SignalProcessor for MedianFilter<T, P>
where
    T: PartialOrd + Clone + Send + 'static,
    P: Clone + Send + 'static,
{
    type Input = Signal<T, P>;
    type Output = Signal<T, P>;

    fn process(&mut self, input: Signal<T, P>) -> Option<Signal<T, P>> {
        Some(self.filter(input))
    }
}
