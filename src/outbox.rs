//! Hand-off channels between job pollers and the dispatcher.
//!
//! Two primitives live here: the bounded outbox queue that carries scrape
//! records, and the one-slot restart signal used to request a reconnect.
//! Both wrap tokio channels behind small clone-able facades so producers
//! never touch the receiving side.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::record::Scrape;

/// Default outbox capacity when the configuration does not override it.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1000;

/// Error returned when the pipeline has terminated and the queue is gone.
#[derive(Debug, Error)]
#[error("scrape pipeline has shut down")]
pub struct EnqueueError;

/// Producer-side facade over the bounded scrape queue.
///
/// `enqueue` suspends the caller while the queue is full: a slow or down
/// transport throttles the job pollers instead of growing memory without
/// bound. Records are delivered to the dispatcher in arrival order.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Scrape>,
}

impl Outbox {
    /// Create a queue with the given capacity, returning the producer
    /// facade and the receiver consumed by the dispatcher.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Scrape>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a record for publishing, waiting for a free slot if needed.
    pub async fn enqueue(&self, scrape: Scrape) -> Result<(), EnqueueError> {
        self.tx.send(scrape).await.map_err(|_| EnqueueError)
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("capacity", &self.tx.max_capacity())
            .finish_non_exhaustive()
    }
}

/// One-slot notification requesting a reconnect attempt.
///
/// `notify` never blocks: if a restart is already pending the new signal is
/// dropped, so bursts of disconnect notifications coalesce into at most one
/// reconnect. Safe to call from any task, including the transport client's
/// own reader task.
#[derive(Clone)]
pub struct RestartSignal {
    tx: mpsc::Sender<()>,
}

impl RestartSignal {
    /// Create the signal and the receiver consumed by the dispatcher.
    pub fn new() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Request a reconnect. Coalesces with any pending request.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

impl std::fmt::Debug for RestartSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartSignal").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn record(n: usize) -> Scrape {
        Scrape {
            job: "test".to_string(),
            instance: format!("target-{n}"),
            timestamp: 1_700_000_000,
            publisher: "relay-test".to_string(),
            scrape: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_within_capacity_never_blocks() {
        let (outbox, _rx) = Outbox::bounded(4);

        for i in 0..4 {
            timeout(Duration::from_millis(100), outbox.enqueue(record(i)))
                .await
                .expect("enqueue within capacity must not block")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_enqueue_blocks_when_full_until_dequeue() {
        let (outbox, mut rx) = Outbox::bounded(2);
        outbox.enqueue(record(0)).await.unwrap();
        outbox.enqueue(record(1)).await.unwrap();

        // Third enqueue on a full, undrained queue must suspend.
        let blocked = timeout(Duration::from_millis(100), outbox.enqueue(record(2))).await;
        assert!(blocked.is_err(), "enqueue on a full queue must block");

        // A single dequeue unblocks it.
        let pending = tokio::spawn({
            let outbox = outbox.clone();
            async move { outbox.enqueue(record(2)).await }
        });
        let first = rx.recv().await.unwrap();
        assert_eq!(first.instance, "target-0");

        timeout(Duration::from_secs(1), pending)
            .await
            .expect("enqueue must complete after a dequeue")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let (outbox, mut rx) = Outbox::bounded(8);
        for i in 0..5 {
            outbox.enqueue(record(i)).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap().instance, format!("target-{i}"));
        }
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped() {
        let (outbox, rx) = Outbox::bounded(2);
        drop(rx);
        assert!(outbox.enqueue(record(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_restart_signal_coalesces() {
        let (signal, mut rx) = RestartSignal::new();

        for _ in 0..5 {
            signal.notify();
        }

        // Exactly one pending notification survives the burst.
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restart_signal_fires_again_after_consumption() {
        let (signal, mut rx) = RestartSignal::new();

        signal.notify();
        rx.recv().await.unwrap();

        signal.notify();
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
