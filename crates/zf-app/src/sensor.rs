//! Sensor chains: raw readings in, one conditioned temperature stream out.
//!
//! A chain is fallback → median → order guard → timeout guard. Readings are
//! tagged with their source name, which is what the fallback stage keys on.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use zf_config::SensorDef;
use zf_core::stream::{channel, pipe};
use zf_core::{Clock, Signal, SignalProcessor, Timestamp};
use zf_filters::{FallbackFilter, MedianFilter, TimeoutGuard};

use crate::error::AppResult;

/// A temperature reading tagged with its source name.
pub type SensorReading = Signal<f64, String>;

/// Drops healthy readings that are not newer than the last healthy one.
///
/// Sources are independent, so a reading that lost the race against another
/// source can arrive late. Controllers downstream need strictly increasing
/// sample times; failures carry no sample and always pass.
#[derive(Debug, Clone)]
pub struct OrderGuard {
    name: String,
    last: Option<Timestamp>,
}

impl OrderGuard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last: None,
        }
    }

    pub fn filter(&mut self, input: SensorReading) -> Option<SensorReading> {
        if input.is_error() {
            return Some(input);
        }
        let timestamp = input.timestamp();
        if let Some(last) = self.last
            && timestamp <= last
        {
            warn!(chain = %self.name, %timestamp, %last, "out of order reading dropped");
            return None;
        }
        self.last = Some(timestamp);
        Some(input)
    }
}

impl SignalProcessor for OrderGuard {
    type Input = SensorReading;
    type Output = SensorReading;

    fn process(&mut self, input: SensorReading) -> Option<SensorReading> {
        self.filter(input)
    }
}

/// The filters between a set of sensors and a zone (or the economizers).
#[derive(Debug, Clone)]
pub struct SensorChain {
    name: String,
    fallback: FallbackFilter<f64, String>,
    median: MedianFilter<f64, String>,
    order: OrderGuard,
    guard: TimeoutGuard<f64, String>,
}

impl SensorChain {
    pub fn new(name: impl Into<String>, def: &SensorDef) -> AppResult<Self> {
        let name = name.into();
        Ok(Self {
            fallback: FallbackFilter::new(def.sources.iter().cloned())?,
            median: MedianFilter::arithmetic(def.median_depth)?,
            order: OrderGuard::new(&name),
            guard: TimeoutGuard::new(&name, Duration::from_millis(def.timeout_ms), def.repeat)?,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sources(&self) -> impl Iterator<Item = &String> {
        self.fallback.sources()
    }

    /// Timeout failure if the chain has been silent for too long at `now`.
    pub fn check(&mut self, now: Timestamp) -> Option<SensorReading> {
        self.guard.check(now)
    }

    /// Run the stages on their own tasks. Timeouts follow the tokio timer and
    /// are stamped by `clock`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self, rx: mpsc::Receiver<SensorReading>, clock: Arc<dyn Clock>) -> (mpsc::Receiver<SensorReading>, Vec<AbortHandle>) {
        let Self {
            name,
            fallback,
            median,
            order,
            guard,
        } = self;

        let (fallen_back, h1) = pipe(format!("{name} fallback"), fallback, rx);
        let (smoothed, h2) = pipe(format!("{name} median"), median, fallen_back);
        let (ordered, h3) = pipe(format!("{name} order"), order, smoothed);
        let (tx, out) = channel();
        let h4 = tokio::spawn(guard.run(ordered, tx, clock));

        debug!(chain = %name, "spawned");
        (
            out,
            vec![h1.abort_handle(), h2.abort_handle(), h3.abort_handle(), h4.abort_handle()],
        )
    }
}

impl SignalProcessor for SensorChain {
    type Input = SensorReading;
    type Output = SensorReading;

    /// All stages in one go. The timeout guard only records traffic here;
    /// drive [`SensorChain::check`] for the silence failures.
    fn process(&mut self, input: SensorReading) -> Option<SensorReading> {
        let input = self.fallback.filter(input)?;
        let input = self.median.filter(input);
        let input = self.order.filter(input)?;
        self.guard.process(input)
    }
}
