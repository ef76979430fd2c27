//! Canonical error and result types for the crate.
//!
//! Each component reports its own error type; `LinkError` gathers them into
//! the single surface returned by [`LinkService`](crate::link::LinkService)
//! and delivered to exchange waiters.

use std::io;

use thiserror::Error;

use crate::{
    exchange::UnknownToken,
    message::{CatalogError, IocStatus, ReplyOutcome},
    pool::PoolError,
    token::ExchangeToken,
};

/// Top-level error type exposed by `linkframe`.
///
/// No variant leaves the layer unusable: decoding and pool errors are local
/// and recoverable, controller statuses are the outcome of one operation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LinkError {
    /// A frame could not be interpreted.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// No open exchange carries the token.
    #[error(transparent)]
    UnknownToken(#[from] UnknownToken),

    /// A buffer pool operation failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The controller completed the operation with a non-success status.
    #[error("controller reported {status} (log info {log_info:#010x})")]
    ControllerStatus {
        /// Status from the reply header.
        status: IocStatus,
        /// Diagnostic code from the reply header.
        log_info: u32,
    },

    /// The exchange was removed by an abort before its reply arrived.
    #[error("exchange {token} was cancelled")]
    Cancelled {
        /// Token of the cancelled exchange.
        token: ExchangeToken,
    },

    /// The transport refused the request.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
}

impl LinkError {
    /// Surface a reply outcome as the operation's result.
    ///
    /// Successful outcomes pass through; any other status becomes
    /// [`LinkError::ControllerStatus`] verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ControllerStatus`] for non-success statuses.
    pub fn check(outcome: ReplyOutcome) -> Result<ReplyOutcome> {
        if outcome.is_success() {
            Ok(outcome)
        } else {
            Err(Self::ControllerStatus {
                status: outcome.status(),
                log_info: outcome.log_info(),
            })
        }
    }

    /// Returns true if the error reports a controller status.
    #[must_use]
    pub fn is_controller_status(&self) -> bool { matches!(self, Self::ControllerStatus { .. }) }
}

/// Canonical result alias used by `linkframe` public APIs.
pub type Result<T> = std::result::Result<T, LinkError>;
