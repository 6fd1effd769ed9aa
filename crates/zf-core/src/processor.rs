//! The contract shared by every filter and controller stage.

use std::marker::PhantomData;

/// A stateful transformer of one stream item into at most one output item.
///
/// Stages are driven either synchronously (tests, replay) or by
/// [`crate::stream::spawn_stage`] on a tokio task.
pub trait SignalProcessor: Send {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Consume one input. `None` means nothing is emitted for it.
    fn process(&mut self, input: Self::Input) -> Option<Self::Output>;
}

/// Stateless stage built from a closure.
pub struct FnProcessor<F, I, O> {
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

/// Wrap a closure as a [`SignalProcessor`].
pub fn from_fn<F, I, O>(f: F) -> FnProcessor<F, I, O>
where
    F: FnMut(I) -> Option<O> + Send,
{
    FnProcessor {
        f,
        _marker: PhantomData,
    }
}

impl<F, I, O> SignalProcessor for FnProcessor<F, I, O>
where
    F: FnMut(I) -> Option<O> + Send,
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    fn process(&mut self, input: I) -> Option<O> {
        (self.f)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_stage() {
        let mut evens = from_fn(|v: u32| (v % 2 == 0).then_some(v * 10));
        assert_eq!(evens.process(1), None);
        assert_eq!(evens.process(2), Some(20));
    }
}
