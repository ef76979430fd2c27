//! Abort coordination.
//!
//! An abort is itself a request with its own token. Building one never
//! touches host state; only a successful abort reply cancels the targeted
//! exchanges and reclaims the affected buffers. The targeted operation's own
//! reply may still arrive afterwards, and the tracker turns it into
//! [`UnknownToken`](crate::exchange::UnknownToken).

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::{
    exchange::{ExchangeKind, ExchangeTracker},
    message::{AbortRequestMessage, AbortScope, ReplyOutcome},
    pool::{BufferIndex, PortPools},
    token::{ExchangeToken, PortId},
};

/// An abort ready to be sent, with the exchange it targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbortRequest {
    /// Port the aborted work runs on.
    pub port: PortId,
    /// Work to abort.
    pub scope: AbortScope,
    /// Exchange named by an exact abort built from its token.
    pub target: Option<ExchangeToken>,
}

impl AbortRequest {
    /// Wire form of the abort.
    #[must_use]
    pub const fn message(&self) -> AbortRequestMessage {
        AbortRequestMessage {
            port: self.port,
            scope: self.scope,
        }
    }
}

/// Builds abort requests and applies their replies.
#[derive(Debug)]
pub struct AbortCoordinator {
    tracker: Arc<ExchangeTracker>,
    pools: Arc<PortPools>,
    pending: DashMap<ExchangeToken, AbortRequest>,
}

impl AbortCoordinator {
    /// Coordinate aborts over `tracker` and `pools`.
    #[must_use]
    pub fn new(tracker: Arc<ExchangeTracker>, pools: Arc<PortPools>) -> Self {
        Self {
            tracker,
            pools,
            pending: DashMap::new(),
        }
    }

    /// Build an abort for the single exchange holding `token`.
    ///
    /// Returns `None` when the exchange is no longer open; aborting
    /// something already finished is a successful no-op. The request names
    /// the exchange's transaction context, or the token value when the
    /// exchange has none.
    #[must_use]
    pub fn abort_exact(&self, token: ExchangeToken) -> Option<AbortRequest> {
        let Some(exchange) = self.tracker.get(token) else {
            debug!(%token, "abort of finished exchange ignored");
            return None;
        };
        let context = exchange.transaction_context.unwrap_or(token.get());
        Some(AbortRequest {
            port: exchange.port,
            scope: AbortScope::Exact(context),
            target: Some(token),
        })
    }

    /// Build an abort covering every operation of `scope` on `port`.
    #[must_use]
    pub fn abort_class(&self, port: PortId, scope: AbortScope) -> AbortRequest {
        AbortRequest {
            port,
            scope,
            target: None,
        }
    }

    /// Remember `request` until the reply for `abort_token` arrives.
    pub fn register(&self, abort_token: ExchangeToken, request: AbortRequest) {
        self.pending.insert(abort_token, request);
    }

    /// Forget and return the request sent under `abort_token`.
    pub fn take(&self, abort_token: ExchangeToken) -> Option<AbortRequest> {
        self.pending.remove(&abort_token).map(|(_, request)| request)
    }

    /// Number of aborts awaiting their reply.
    #[must_use]
    pub fn pending(&self) -> usize { self.pending.len() }

    /// Apply the controller's reply to `request`.
    ///
    /// On success every targeted exchange still open is cancelled and the
    /// buffers they posted are reclaimed; the controller takes no further
    /// action on them. A late reply returning such a buffer no longer
    /// matches its slot. Targets that already finished are skipped. Returns
    /// the cancelled tokens in ascending order.
    pub fn on_abort_reply(
        &self,
        request: &AbortRequest,
        outcome: &ReplyOutcome,
    ) -> Vec<ExchangeToken> {
        if !outcome.is_success() {
            warn!(
                port = %request.port,
                scope = ?request.scope,
                status = %outcome.status(),
                "abort refused by controller"
            );
            return Vec::new();
        }

        let mut cancelled: Vec<_> = self
            .targets(request)
            .into_iter()
            .filter(|token| self.cancel_one(*token))
            .collect();
        cancelled.sort_unstable();

        if request.scope == AbortScope::AllBuffers
            && let Some(pool) = self.pools.get(request.port)
        {
            // Buffers restored without a new post carry no open exchange.
            let aborted = pool.abort_all();
            pool.reclaim_aborted(aborted);
        }

        if request.target.is_none() {
            info!(
                port = %request.port,
                scope = ?request.scope,
                cancelled = cancelled.len(),
                "class abort applied"
            );
        }
        cancelled
    }

    fn targets(&self, request: &AbortRequest) -> Vec<ExchangeToken> {
        if let Some(token) = request.target {
            return vec![token];
        }
        match request.scope {
            AbortScope::Exact(context) => self.tracker.matching_context(request.port, context),
            AbortScope::AllBuffers => self.tracker.matching(request.port, ExchangeKind::BufferPost),
            AbortScope::CtSends => self.tracker.matching(request.port, ExchangeKind::CtSend),
            AbortScope::ElsSends => self.tracker.matching(request.port, ExchangeKind::ElsSend),
        }
    }

    fn cancel_one(&self, token: ExchangeToken) -> bool {
        let Ok(exchange) = self.tracker.cancel(token) else {
            debug!(%token, "abort target already finished");
            return false;
        };
        if exchange.kind == ExchangeKind::BufferPost
            && let Some(context) = exchange.transaction_context
            && let Some(pool) = self.pools.get(exchange.port)
        {
            let index = BufferIndex::new(context);
            if pool.abort_bound(index, token) {
                pool.reclaim_aborted([index]);
            }
        }
        true
    }
}
