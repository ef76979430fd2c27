//! Channel carrying raw reply frames from the transport to the link service.
//!
//! The transport's reply-delivery context holds a [`CompletionSender`]; the
//! task running [`LinkService::run_completions`](crate::link::LinkService::run_completions)
//! drains the paired [`CompletionQueue`].

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Errors returned when delivering a reply frame.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CompletionError {
    /// The queue was at capacity.
    #[error("completion queue full")]
    QueueFull,
    /// The receiving end of the queue has been dropped.
    #[error("completion queue closed")]
    Closed,
}

/// Receiving end of the completion channel.
#[derive(Debug)]
pub struct CompletionQueue {
    rx: mpsc::Receiver<Bytes>,
}

/// Cloneable handle used by the transport to hand over reply frames.
#[derive(Clone, Debug)]
pub struct CompletionSender {
    tx: mpsc::Sender<Bytes>,
}

impl CompletionQueue {
    /// Create a queue holding at most `depth` undelivered frames.
    ///
    /// # Panics
    ///
    /// Panics if `depth` is zero. [`LinkConfig`](crate::config::LinkConfig)
    /// rejects a zero depth before it gets here.
    #[must_use]
    pub fn bounded(depth: usize) -> (CompletionSender, Self) {
        let (tx, rx) = mpsc::channel(depth);
        (CompletionSender { tx }, Self { rx })
    }

    /// Receive the next reply frame.
    ///
    /// Returns `None` once every sender has been dropped and the queue is
    /// drained.
    pub async fn recv(&mut self) -> Option<Bytes> { self.rx.recv().await }

    /// Stop accepting frames while keeping those already queued.
    pub fn close(&mut self) { self.rx.close(); }
}

impl CompletionSender {
    /// Deliver a reply frame, waiting for queue capacity.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::Closed`] if the queue has been dropped.
    pub async fn deliver(&self, frame: Bytes) -> Result<(), CompletionError> {
        let len = frame.len();
        self.tx
            .send(frame)
            .await
            .map_err(|_| CompletionError::Closed)?;
        debug!(len, "reply frame queued");
        Ok(())
    }

    /// Deliver a reply frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::QueueFull`] when the queue is at capacity
    /// and [`CompletionError::Closed`] if it has been dropped.
    pub fn try_deliver(&self, frame: Bytes) -> Result<(), CompletionError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CompletionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => CompletionError::Closed,
        })
    }

    /// Report whether the queue has been dropped or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_arrive_in_delivery_order() {
        let (tx, mut queue) = CompletionQueue::bounded(4);
        tx.deliver(Bytes::from_static(b"one")).await.expect("open");
        tx.deliver(Bytes::from_static(b"two")).await.expect("open");

        assert_eq!(queue.recv().await.as_deref(), Some(&b"one"[..]));
        assert_eq!(queue.recv().await.as_deref(), Some(&b"two"[..]));
    }

    #[tokio::test]
    async fn try_deliver_reports_full_queue() {
        let (tx, _queue) = CompletionQueue::bounded(1);
        tx.try_deliver(Bytes::from_static(b"a")).expect("room");

        assert_eq!(
            tx.try_deliver(Bytes::from_static(b"b")),
            Err(CompletionError::QueueFull)
        );
    }

    #[tokio::test]
    async fn queue_ends_when_senders_drop() {
        let (tx, mut queue) = CompletionQueue::bounded(1);
        drop(tx);

        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn delivery_to_dropped_queue_fails() {
        let (tx, queue) = CompletionQueue::bounded(1);
        drop(queue);

        assert!(tx.is_closed());
        assert_eq!(
            tx.deliver(Bytes::from_static(b"late")).await,
            Err(CompletionError::Closed)
        );
    }
}
