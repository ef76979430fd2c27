//! Errors raised by the buffer pool.

use thiserror::Error;

use super::{BufferIndex, BufferState};
use crate::token::PortId;

/// Failure of a buffer pool operation.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Every slot of the pool is already in use.
    #[error("buffer pool for {port} is full ({capacity} buffers)")]
    PoolFull {
        /// Port owning the pool.
        port: PortId,
        /// Fixed capacity of the pool.
        capacity: usize,
    },

    /// The index does not name a slot of this pool.
    #[error("{port} has no buffer {index}")]
    UnknownBuffer {
        /// Port owning the pool.
        port: PortId,
        /// Index that was looked up.
        index: BufferIndex,
    },

    /// The slot is not in a state the operation can start from.
    #[error("buffer {index} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// Buffer being moved.
        index: BufferIndex,
        /// Its current state.
        from: BufferState,
        /// The state requested.
        to: BufferState,
    },

    /// No pool is configured for the port.
    #[error("no buffer pool configured for {port}")]
    UnknownPort {
        /// Port that was looked up.
        port: PortId,
    },
}
