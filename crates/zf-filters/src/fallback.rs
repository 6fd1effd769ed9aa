//! Ordered source chain: the first healthy source wins.

use crate::error::{FilterError, FilterResult};
use std::fmt;
use tracing::{debug, trace, warn};
use zf_core::{Signal, SignalProcessor};

/// Remembers the last signal of every source in a fixed priority order.
///
/// On every arrival the chain is walked from the top; the first source whose
/// last signal is not a total failure wins. The arriving signal is emitted
/// only if its source is the winner, so a lower-priority reading never
/// overrides a healthy higher-priority one. When every known source is failing
/// the arriving failure is emitted as is. A healthy winner sitting below a
/// failing source is emitted as a partial failure carrying the oldest error
/// among the sources ahead of it.
#[derive(Debug, Clone)]
pub struct FallbackFilter<T, P> {
    chain: Vec<(P, Option<Signal<T, P>>)>,
}

impl<T, P> FallbackFilter<T, P>
where
    T: Clone,
    P: Clone + PartialEq + fmt::Display,
{
    /// # Arguments
    ///
    /// * `sources` - Source identifiers, highest priority first
    pub fn new(sources: impl IntoIterator<Item = P>) -> FilterResult<Self> {
        let mut chain: Vec<(P, Option<Signal<T, P>>)> = Vec::new();
        for source in sources {
            if chain.iter().any(|(known, _)| *known == source) {
                return Err(FilterError::DuplicateSource {
                    source_id: source.to_string(),
                });
            }
            chain.push((source, None));
        }
        if chain.is_empty() {
            return Err(FilterError::EmptyChain);
        }
        Ok(Self { chain })
    }

    pub fn sources(&self) -> impl Iterator<Item = &P> {
        self.chain.iter().map(|(p, _)| p)
    }

    /// Last signal seen from `source`, if any.
    pub fn last(&self, source: &P) -> Option<&Signal<T, P>> {
        self.chain
            .iter()
            .find(|(p, _)| p == source)
            .and_then(|(_, s)| s.as_ref())
    }

    pub fn filter(&mut self, input: Signal<T, P>) -> Option<Signal<T, P>> {
        let Some(index) = input
            .payload()
            .and_then(|p| self.chain.iter().position(|(known, _)| known == p))
        else {
            warn!(
                source = %input.payload().map(|p| p.to_string()).unwrap_or_default(),
                "signal from unknown source, dropped"
            );
            return None;
        };

        self.chain[index].1 = Some(input.clone());

        let winner = self
            .chain
            .iter()
            .position(|(_, s)| s.as_ref().is_some_and(|s| !s.is_error()));

        match winner {
            None => {
                debug!(source = %self.chain[index].0, "every source is failing");
                Some(input)
            }
            Some(w) if w != index => {
                trace!(
                    source = %self.chain[index].0,
                    winner = %self.chain[w].0,
                    "superseded by higher priority source"
                );
                None
            }
            Some(w) => {
                let oldest_error = self.chain[..w]
                    .iter()
                    .filter_map(|(_, s)| s.as_ref())
                    .filter(|s| s.is_error())
                    .min_by_key(|s| s.timestamp())
                    .and_then(|s| s.error().cloned());

                match oldest_error {
                    None => Some(input),
                    Some(error) => Some(input.degrade(error)),
                }
            }
        }
    }
}

impl<T, P> SignalProcessor for FallbackFilter<T, P>
where
    T: Clone + Send + 'static,
    P: Clone + PartialEq + fmt::Display + Send + 'static,
{
    type Input = Signal<T, P>;
    type Output = Signal<T, P>;

    fn process(&mut self, input: Signal<T, P>) -> Option<Signal<T, P>> {
        self.filter(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use zf_core::{SignalError, SignalStatus, Timestamp};

    fn ts(secs: i64) -> Timestamp {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn chain() -> FallbackFilter<f64, &'static str> {
        FallbackFilter::new(["A", "B", "C"]).unwrap()
    }

    #[test]
    fn construction_errors() {
        assert_eq!(
            FallbackFilter::<f64, &str>::new([]).unwrap_err(),
            FilterError::EmptyChain
        );
        assert!(matches!(
            FallbackFilter::<f64, &str>::new(["A", "A"]),
            Err(FilterError::DuplicateSource { .. })
        ));
    }

    #[test]
    fn healthy_primary_suppresses_the_rest() {
        let mut f = chain();
        assert!(f.filter(Signal::with_payload(ts(0), 1.0, "A")).is_some());
        assert!(f.filter(Signal::with_payload(ts(1), 2.0, "B")).is_none());
        assert!(f.filter(Signal::with_payload(ts(2), 3.0, "C")).is_none());
    }

    #[test]
    fn failing_primary_promotes_secondary() {
        let mut f = chain();
        f.filter(Signal::with_payload(ts(0), 1.0, "A"));
        let failed = f.filter(Signal::failure(ts(1), Some("A"), SignalError::sensor("A down")));
        // B and C have not reported, so A's failure is all there is
        assert!(failed.unwrap().is_error());

        let out = f.filter(Signal::with_payload(ts(2), 2.0, "B")).unwrap();
        assert_eq!(out.status(), SignalStatus::FailurePartial);
        assert_eq!(out.value(), Some(&2.0));
        assert_eq!(out.payload(), Some(&"B"));
        assert_eq!(out.error(), Some(&SignalError::sensor("A down")));
    }

    #[test]
    fn unknown_source_dropped() {
        let mut f = chain();
        assert!(f.filter(Signal::with_payload(ts(0), 1.0, "Z")).is_none());
        assert!(f.filter(Signal::new(ts(1), 1.0)).is_none());
    }

    #[test]
    fn unseen_higher_priority_does_not_block() {
        let mut f = chain();
        let out = f.filter(Signal::with_payload(ts(0), 2.0, "B")).unwrap();
        assert!(out.is_ok());
    }

    #[test]
    fn all_failing_emits_arriving_failure() {
        let mut f = chain();
        f.filter(Signal::failure(ts(0), Some("A"), SignalError::sensor("a")));
        f.filter(Signal::failure(ts(1), Some("B"), SignalError::sensor("b")));
        let out = f
            .filter(Signal::failure(ts(2), Some("C"), SignalError::sensor("c")))
            .unwrap();
        assert!(out.is_error());
        assert_eq!(out.error(), Some(&SignalError::sensor("c")));
        assert_eq!(out.payload(), Some(&"C"));
    }
}
