//! Bounded channel plumbing between stages.
//!
//! A pipeline is a chain of tokio tasks, each owning one [`SignalProcessor`]
//! and connected by bounded mpsc channels. Dropping the head sender drains and
//! stops the chain in order.

use crate::processor::SignalProcessor;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Queue depth between two stages.
pub const DEFAULT_CAPACITY: usize = 64;

pub fn channel<T>() -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(DEFAULT_CAPACITY)
}

/// Run `stage` on its own task, reading `rx` and writing `tx`.
///
/// The task ends when the input closes or the output has no receiver left,
/// and hands the stage back so its final state can be inspected.
pub fn spawn_stage<S>(
    name: impl Into<String>,
    mut stage: S,
    mut rx: mpsc::Receiver<S::Input>,
    tx: mpsc::Sender<S::Output>,
) -> JoinHandle<S>
where
    S: SignalProcessor + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        while let Some(input) = rx.recv().await {
            let Some(output) = stage.process(input) else {
                trace!(stage = %name, "nothing emitted");
                continue;
            };
            if tx.send(output).await.is_err() {
                debug!(stage = %name, "downstream closed");
                break;
            }
        }
        debug!(stage = %name, "completed");
        stage
    })
}

/// Like [`spawn_stage`], allocating the output channel.
pub fn pipe<S>(
    name: impl Into<String>,
    stage: S,
    rx: mpsc::Receiver<S::Input>,
) -> (mpsc::Receiver<S::Output>, JoinHandle<S>)
where
    S: SignalProcessor + 'static,
{
    let (tx, out) = channel();
    let handle = spawn_stage(name, stage, rx, tx);
    (out, handle)
}

/// Fan several streams into one. The result closes once every input has closed.
pub fn merge<T: Send + 'static>(inputs: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T> {
    let (tx, out) = channel();
    for mut rx in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::from_fn;

    #[tokio::test]
    async fn stage_forwards_and_filters() {
        let (tx, rx) = channel();
        let (mut out, handle) = pipe("double-odd", from_fn(|v: i32| (v % 2 != 0).then_some(v * 2)), rx);

        for v in 1..=5 {
            tx.send(v).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(v) = out.recv().await {
            seen.push(v);
        }
        assert_eq!(seen, vec![2, 6, 10]);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn merge_closes_after_all_inputs() {
        let (a_tx, a_rx) = channel();
        let (b_tx, b_rx) = channel();
        let mut merged = merge(vec![a_rx, b_rx]);

        a_tx.send(1).await.unwrap();
        b_tx.send(2).await.unwrap();
        drop(a_tx);
        drop(b_tx);

        let mut seen = Vec::new();
        while let Some(v) = merged.recv().await {
            seen.push(v);
        }
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
    }
}
