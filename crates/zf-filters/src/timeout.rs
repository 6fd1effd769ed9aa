//! Synthesize a failure when a stream goes quiet.

use crate::error::{FilterError, FilterResult};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace};
use zf_core::{Clock, Signal, SignalError, SignalProcessor, Timestamp};

/// Watches the time since the last input and emits a total failure carrying
/// [`SignalError::Timeout`] once the silence exceeds `timeout`.
///
/// With `repeat` off, one failure is emitted per silence period; with it on,
/// one per elapsed `timeout` until traffic resumes.
///
/// The guard can be driven two ways: [`observe`](Self::observe) plus
/// [`check`](Self::check) against signal timestamps (replay), or
/// [`run`](Self::run) as a task against the tokio timer.
#[derive(Debug, Clone)]
pub struct TimeoutGuard<T, P = ()> {
    marker: String,
    timeout: Duration,
    repeat: bool,
    in_timeout: bool,
    last_seen: Option<Timestamp>,
    _marker: PhantomData<fn() -> Signal<T, P>>,
}

impl<T, P> TimeoutGuard<T, P> {
    /// # Arguments
    ///
    /// * `marker` - Name used in logs and in the timeout error
    /// * `timeout` - Silence to tolerate, at least 1ms
    /// * `repeat` - Keep emitting every `timeout` while silent
    pub fn new(marker: impl Into<String>, timeout: Duration, repeat: bool) -> FilterResult<Self> {
        if timeout < Duration::from_millis(1) {
            return Err(FilterError::TimeoutTooShort { timeout });
        }
        Ok(Self {
            marker: marker.into(),
            timeout,
            repeat,
            in_timeout: false,
            last_seen: None,
            _marker: PhantomData,
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_in_timeout(&self) -> bool {
        self.in_timeout
    }

    /// Record traffic at the signal's timestamp.
    pub fn observe(&mut self, signal: &Signal<T, P>) {
        self.last_seen = Some(signal.timestamp());
        self.in_timeout = false;
    }

    /// Emit a failure if `now` is a full timeout past the last activity.
    ///
    /// The guard counts as touched whenever the timeout elapses, so in repeat
    /// mode the next failure is due one more timeout later.
    pub fn check(&mut self, now: Timestamp) -> Option<Signal<T, P>> {
        let last_seen = *self.last_seen.get_or_insert(now);
        let elapsed = (now - last_seen).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.timeout {
            return None;
        }
        self.last_seen = Some(now);
        self.expire(now)
    }

    fn expire(&mut self, now: Timestamp) -> Option<Signal<T, P>> {
        trace!(marker = %self.marker, in_timeout = self.in_timeout, repeat = self.repeat, "timeout elapsed");
        if self.in_timeout && !self.repeat {
            return None;
        }
        info!(marker = %self.marker, timeout = ?self.timeout, "timeout exceeded");
        self.in_timeout = true;
        Some(Signal::failure(now, None, SignalError::timeout(&self.marker, self.timeout)))
    }

    /// Forward `rx` to `tx`, interleaving timeout failures stamped by `clock`.
    ///
    /// Silence is measured on the tokio timer from the moment of arrival, so
    /// paused test time drives it. Returns when the input closes or nobody
    /// listens to the output any more.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Signal<T, P>>,
        tx: mpsc::Sender<Signal<T, P>>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        T: Send,
        P: Send,
    {
        let mut deadline = Instant::now() + self.timeout;
        loop {
            tokio::select! {
                input = rx.recv() => {
                    let Some(signal) = input else { break };
                    self.observe(&signal);
                    deadline = Instant::now() + self.timeout;
                    if tx.send(signal).await.is_err() {
                        break;
                    }
                }
                _ = sleep_until(deadline) => {
                    deadline = Instant::now() + self.timeout;
                    let now = clock.now();
                    self.last_seen = Some(now);
                    if let Some(failure) = self.expire(now) {
                        if tx.send(failure).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        debug!(marker = %self.marker, "completed");
        self
    }
}

impl<T, P> SignalProcessor for TimeoutGuard<T, P>
where
    T: Send + 'static,
    P: Send + 'static,
{
    type Input = Signal<T, P>;
    type Output = Signal<T, P>;

    /// Pass-through that only records traffic; failures come from
    /// [`TimeoutGuard::check`] or [`TimeoutGuard::run`].
    fn process(&mut self, input: Signal<T, P>) -> Option<Signal<T, P>> {
        self.observe(&input);
        Some(input)
    }
}
