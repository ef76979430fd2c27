//! Hand-off of encoded requests to the controller.
//!
//! How frames reach the controller (doorbells, DMA, a simulator) is the
//! implementor's concern. Replies travel back separately through a
//! [`CompletionSender`](crate::completion::CompletionSender).

use std::{io, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;

/// Destination for encoded request frames.
///
/// `submit` resolves once the controller has accepted the frame, not when
/// the operation completes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand one request frame to the controller.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the frame could not be queued.
    async fn submit(&self, frame: Bytes) -> io::Result<()>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn submit(&self, frame: Bytes) -> io::Result<()> { (**self).submit(frame).await }
}
