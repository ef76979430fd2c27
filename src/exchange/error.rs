//! Error raised by the exchange tracker.

use thiserror::Error;

use crate::token::ExchangeToken;

/// No open exchange carries the token.
///
/// This is expected after an abort races with the aborted operation's own
/// reply; callers treat it as a no-op.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no open exchange for token {token}")]
pub struct UnknownToken {
    /// The token that was looked up.
    pub token: ExchangeToken,
}
