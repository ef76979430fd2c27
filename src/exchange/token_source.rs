//! Monotonic issue of message-context values.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU32, Ordering};

use crate::token::ExchangeToken;

/// Issues candidate tokens in increasing order, wrapping past `u32::MAX`.
///
/// Zero is never issued so that a zeroed message context can't be mistaken
/// for a live exchange. Uniqueness among open exchanges is the tracker's
/// job: it skips candidates that are still in use.
#[derive(Debug)]
pub struct TokenSource {
    next: AtomicU32,
}

impl Default for TokenSource {
    fn default() -> Self { Self::starting_at(1) }
}

impl TokenSource {
    /// Start issuing at `first`.
    #[must_use]
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Return the next candidate token.
    pub fn next_token(&self) -> ExchangeToken {
        loop {
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if raw != 0 {
                return ExchangeToken::new(raw);
            }
        }
    }
}
