//! In-memory transport that records submitted requests.

use std::{
    io,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use linkframe::{message::Request, token::ExchangeToken, transport::Transport};

/// Transport standing in for the controller's request queue.
///
/// Every accepted frame is kept for inspection. [`LoopbackTransport::fail_next`]
/// makes the following submissions fail, which exercises rollback paths.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    sent: Mutex<Vec<Bytes>>,
    failures: AtomicUsize,
}

impl LoopbackTransport {
    /// Create a transport that accepts every frame.
    pub fn new() -> Self { Self::default() }

    /// Refuse the next `count` submissions.
    pub fn fail_next(&self, count: usize) { self.failures.store(count, Ordering::SeqCst); }

    /// Frames accepted so far, oldest first.
    pub fn sent(&self) -> Vec<Bytes> { self.frames().clone() }

    /// Number of frames accepted so far.
    pub fn len(&self) -> usize { self.frames().len() }

    /// Report whether no frame was accepted.
    pub fn is_empty(&self) -> bool { self.frames().is_empty() }

    /// Decode every accepted frame.
    ///
    /// # Panics
    ///
    /// Panics if a recorded frame does not decode.
    pub fn requests(&self) -> Vec<(ExchangeToken, Request)> {
        self.frames()
            .iter()
            .map(|frame| Request::decode(frame).expect("recorded frame decodes"))
            .collect()
    }

    /// Decode the most recently accepted frame.
    ///
    /// # Panics
    ///
    /// Panics if no frame was accepted or it does not decode.
    pub fn last_request(&self) -> (ExchangeToken, Request) {
        let frames = self.frames();
        let frame = frames.last().expect("a frame was submitted");
        Request::decode(frame).expect("recorded frame decodes")
    }

    /// Forget every recorded frame.
    pub fn clear(&self) { self.frames().clear(); }

    fn frames(&self) -> MutexGuard<'_, Vec<Bytes>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn submit(&self, frame: Bytes) -> io::Result<()> {
        let refuse = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "controller request queue unavailable",
            ));
        }
        self.frames().push(frame);
        Ok(())
    }
}
