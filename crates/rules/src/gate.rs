//! One-shot completion latch.
//!
//! Any number of code paths may try to finish a pipeline; the first to call
//! [`CompletionGate::succeed`] or [`CompletionGate::fail`] wins and every
//! later call is a no-op.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

struct Inner<T, E> {
    claimed: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<Result<T, E>>>>,
}

/// Sending half; clone it into every path that may finish the pipeline.
pub struct CompletionGate<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for CompletionGate<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Receiving half. Resolves to `None` only if every gate was dropped
/// without completing.
pub struct CompletionReceiver<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> CompletionGate<T, E> {
    pub fn new() -> (Self, CompletionReceiver<T, E>) {
        let (tx, rx) = oneshot::channel();
        let gate = Self {
            inner: Arc::new(Inner {
                claimed: AtomicBool::new(false),
                sender: Mutex::new(Some(tx)),
            }),
        };
        (gate, CompletionReceiver { rx })
    }

    /// Returns `true` if this call delivered the outcome.
    pub fn succeed(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Returns `true` if this call delivered the outcome.
    pub fn fail(&self, error: E) -> bool {
        self.complete(Err(error))
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.claimed.load(Ordering::Acquire)
    }

    /// The receiver was dropped; nobody is waiting for the outcome.
    pub fn is_abandoned(&self) -> bool {
        let guard = self.inner.sender.lock().expect("gate sender lock poisoned");
        guard.as_ref().map(|tx| tx.is_closed()).unwrap_or(false)
    }

    fn complete(&self, outcome: Result<T, E>) -> bool {
        if self
            .inner
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let sender = self.inner.sender.lock().expect("gate sender lock poisoned").take();
        if let Some(tx) = sender {
            // Receiver may already be gone.
            let _ = tx.send(outcome);
        }
        true
    }
}

impl<T, E> Future for CompletionReceiver<T, E> {
    type Output = Option<Result<T, E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_completion_wins() {
        let (gate, rx) = CompletionGate::<u32, String>::new();
        assert!(!gate.is_resolved());
        assert!(gate.succeed(1));
        assert!(!gate.fail("late".into()));
        assert!(!gate.succeed(2));
        assert!(gate.is_resolved());
        assert_eq!(rx.await, Some(Ok(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_completions_deliver_exactly_once() {
        let (gate, rx) = CompletionGate::<usize, usize>::new();
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let gate = gate.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        gate.succeed(i)
                    } else {
                        gate.fail(i)
                    }
                })
            })
            .collect();

        let wins = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().expect("task panicked"))
            .count();
        assert_eq!(wins, 1);
        assert!(rx.await.is_some());
    }

    #[tokio::test]
    async fn dropped_receiver_is_abandoned() {
        let (gate, rx) = CompletionGate::<(), ()>::new();
        assert!(!gate.is_abandoned());
        drop(rx);
        assert!(gate.is_abandoned());
        assert!(gate.succeed(()));
    }

    #[tokio::test]
    async fn dropped_gates_resolve_to_none() {
        let (gate, rx) = CompletionGate::<(), ()>::new();
        drop(gate);
        assert_eq!(rx.await, None);
    }
}
