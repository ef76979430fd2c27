//! Token table for outstanding exchanges.

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::{Exchange, ExchangeKind, TokenSource, TrackerEvent, UnknownToken};
use crate::{
    error::LinkError,
    message::ReplyOutcome,
    token::{ExchangeToken, PortId},
};

/// Final result delivered to an exchange's waiter.
pub type ExchangeResult = Result<ReplyOutcome, LinkError>;

/// Receiving half of an exchange's completion notification.
pub type CompletionReceiver = oneshot::Receiver<ExchangeResult>;

#[derive(Debug)]
struct OpenExchange {
    exchange: Exchange,
    notify: Option<oneshot::Sender<ExchangeResult>>,
}

/// Concurrent table of open exchanges keyed by [`ExchangeToken`].
///
/// Entries are sharded, so resolving one token never waits on work for an
/// unrelated token.
#[derive(Debug, Default)]
pub struct ExchangeTracker {
    open: DashMap<ExchangeToken, OpenExchange>,
    tokens: TokenSource,
}

impl ExchangeTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a tracker whose first issued token is `first`.
    #[must_use]
    pub fn starting_at(first: u32) -> Self {
        Self {
            open: DashMap::new(),
            tokens: TokenSource::starting_at(first),
        }
    }

    /// Open an exchange of `kind` on `port` without a waiter.
    pub fn open(&self, kind: ExchangeKind, port: PortId) -> ExchangeToken {
        self.insert(Exchange::new(kind, port), None)
    }

    /// Open `exchange` and return its token with a receiver for its result.
    pub fn open_exchange(&self, exchange: Exchange) -> (ExchangeToken, CompletionReceiver) {
        let (tx, rx) = oneshot::channel();
        (self.insert(exchange, Some(tx)), rx)
    }

    /// Issue a token not held by any open exchange and store the entry.
    fn insert(
        &self,
        exchange: Exchange,
        notify: Option<oneshot::Sender<ExchangeResult>>,
    ) -> ExchangeToken {
        let entry = OpenExchange { exchange, notify };
        loop {
            let token = self.tokens.next_token();
            // An occupied entry means the counter wrapped onto a live token.
            if let Entry::Vacant(slot) = self.open.entry(token) {
                slot.insert(entry);
                trace!(%token, kind = ?exchange.kind, port = %exchange.port, "exchange opened");
                crate::metrics::set_outstanding(self.open.len());
                return token;
            }
        }
    }

    /// Remove `token` and hand `result` to its waiter.
    fn finish(
        &self,
        token: ExchangeToken,
        result: impl FnOnce(&Exchange) -> ExchangeResult,
    ) -> Result<Exchange, UnknownToken> {
        let Some((_, open)) = self.open.remove(&token) else {
            debug!(%token, "no open exchange for token");
            return Err(UnknownToken { token });
        };
        crate::metrics::set_outstanding(self.open.len());
        if let Some(notify) = open.notify {
            // The waiter may have stopped listening; the exchange is closed
            // either way.
            let _ = notify.send(result(&open.exchange));
        }
        Ok(open.exchange)
    }

    /// Close `token` with the controller's `outcome`.
    ///
    /// Non-success statuses reach the waiter as
    /// [`LinkError::ControllerStatus`].
    ///
    /// # Errors
    ///
    /// Returns [`UnknownToken`] if the exchange is not open, for example
    /// because an abort already cancelled it.
    pub fn resolve(
        &self,
        token: ExchangeToken,
        outcome: ReplyOutcome,
    ) -> Result<Exchange, UnknownToken> {
        let exchange = self.finish(token, |_| LinkError::check(outcome))?;
        debug!(%token, kind = ?exchange.kind, status = %outcome.status(), "exchange resolved");
        Ok(exchange)
    }

    /// Close `token` because an abort took effect.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownToken`] if the exchange is not open, for example
    /// because its reply already resolved it.
    pub fn cancel(&self, token: ExchangeToken) -> Result<Exchange, UnknownToken> {
        let exchange = self.finish(token, |_| Err(LinkError::Cancelled { token }))?;
        debug!(%token, kind = ?exchange.kind, "exchange cancelled");
        Ok(exchange)
    }

    /// Apply one reply-side event.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownToken`] when the event's token is not open.
    pub fn apply(&self, event: TrackerEvent) -> Result<Exchange, UnknownToken> {
        match event {
            TrackerEvent::Resolve { token, outcome } => self.resolve(token, outcome),
            TrackerEvent::Cancel { token } => self.cancel(token),
        }
    }

    /// Metadata of an open exchange.
    #[must_use]
    pub fn get(&self, token: ExchangeToken) -> Option<Exchange> {
        self.open.get(&token).map(|open| open.exchange)
    }

    /// Report whether `token` is open.
    #[must_use]
    pub fn contains(&self, token: ExchangeToken) -> bool { self.open.contains_key(&token) }

    /// Number of open exchanges.
    #[must_use]
    pub fn len(&self) -> usize { self.open.len() }

    /// Report whether no exchange is open.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.open.is_empty() }

    /// Tokens of open exchanges of `kind` on `port`, in ascending order.
    #[must_use]
    pub fn matching(&self, port: PortId, kind: ExchangeKind) -> Vec<ExchangeToken> {
        self.collect(|_, exchange| exchange.port == port && exchange.kind == kind)
    }

    /// Tokens of open exchanges on `port` that an exact abort naming
    /// `context` would reach.
    #[must_use]
    pub fn matching_context(&self, port: PortId, context: u32) -> Vec<ExchangeToken> {
        self.collect(|token, exchange| {
            exchange.port == port && exchange.transaction_context.unwrap_or(token.get()) == context
        })
    }

    /// Tokens of open exchanges carrying the given OXID/RXID pair.
    ///
    /// The identifiers wrap, so more than one token may match.
    #[must_use]
    pub fn find_by_exchange_ids(&self, ox_id: u16, rx_id: u16) -> Vec<ExchangeToken> {
        self.collect(|_, exchange| exchange.ox_id == Some(ox_id) && exchange.rx_id == Some(rx_id))
    }

    fn collect(&self, keep: impl Fn(ExchangeToken, &Exchange) -> bool) -> Vec<ExchangeToken> {
        let mut tokens: Vec<_> = self
            .open
            .iter()
            .filter(|entry| keep(*entry.key(), &entry.exchange))
            .map(|entry| *entry.key())
            .collect();
        tokens.sort_unstable();
        tokens
    }
}
