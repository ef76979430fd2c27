//! Reply handling for [`LinkService`].

use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::LinkService;
use crate::{
    completion::CompletionQueue,
    error::Result,
    exchange::ExchangeKind,
    message::{BufferPostReply, Reply, ReplyOutcome, ReplyPayload, UnsolicitedFrame},
    pool::{BufferIndex, BufferPool, ReplenishDecision},
    token::{ExchangeToken, PortId},
    transport::Transport,
};

/// What handling one reply did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The reply closed an open exchange.
    Resolved {
        token: ExchangeToken,
        kind: ExchangeKind,
    },
    /// A posted buffer received an unsolicited frame.
    Consumed {
        port: PortId,
        index: BufferIndex,
        token: ExchangeToken,
        decision: ReplenishDecision,
        /// Token of the request that posted the buffer again, if one was
        /// sent.
        reposted: Option<ExchangeToken>,
    },
    /// The controller gave a posted buffer back unfilled.
    Reclaimed {
        port: PortId,
        index: BufferIndex,
        token: ExchangeToken,
    },
    /// An abort completed; `cancelled` lists the exchanges it closed.
    Aborted {
        token: ExchangeToken,
        cancelled: Vec<ExchangeToken>,
    },
    /// No open exchange carried the token, typically because an abort won
    /// the race against this reply.
    Stale { token: ExchangeToken },
}

/// An unsolicited frame delivered into a posted buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Port the frame arrived on.
    pub port: PortId,
    /// Buffer holding the frame.
    pub index: BufferIndex,
    /// The controller does not expect a link-service response.
    pub no_response_needed: bool,
    /// Frame header and sender details.
    pub frame: UnsolicitedFrame,
}

impl<T: Transport> LinkService<T> {
    /// Apply one raw reply frame.
    ///
    /// Buffer-post replies update the pool, forward the frame and, when
    /// automatic replenishment is on, post the buffer again. Abort replies
    /// cancel their targets before the abort's own waiter is told. Replies
    /// for tokens no longer open are reported as [`Disposition::Stale`].
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Catalog`](crate::error::LinkError::Catalog) for
    /// frames that do not decode, [`LinkError::Pool`](crate::error::LinkError::Pool)
    /// for buffer replies naming an unknown port or slot, and
    /// [`LinkError::Transport`](crate::error::LinkError::Transport) if a
    /// replenishing post could not be submitted.
    pub async fn handle_reply(&self, frame: &[u8]) -> Result<Disposition> {
        let reply = match Reply::decode(frame) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(%error, len = frame.len(), "unrecognized reply frame");
                crate::metrics::inc_errors();
                return Err(error.into());
            }
        };
        crate::metrics::inc_replies(reply.function());
        let token = reply.message_context();
        let outcome = reply.outcome();
        match reply {
            Reply::BufferPost(reply) => self.buffer_consumed(token, &reply, outcome).await,
            Reply::Abort(_) => Ok(self.abort_completed(token, outcome)),
            Reply::LinkServiceResponse(_)
            | Reply::ElsSend(_)
            | Reply::CtSend(_)
            | Reply::PrimitiveSend(_) => Ok(self.resolve(token, outcome)),
        }
    }

    /// Apply reply frames from `queue` until it closes or `shutdown` fires.
    ///
    /// Failures are logged and do not stop the loop.
    pub async fn run_completions(&self, mut queue: CompletionQueue, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    debug!("completion loop cancelled");
                    break;
                }

                frame = queue.recv() => {
                    let Some(frame) = frame else {
                        debug!("completion queue closed");
                        break;
                    };
                    if let Err(error) = self.handle_reply(&frame).await {
                        warn!(%error, "reply not applied");
                    }
                }
            }
        }
    }

    fn resolve(&self, token: ExchangeToken, outcome: ReplyOutcome) -> Disposition {
        match self.tracker.resolve(token, outcome) {
            Ok(exchange) => Disposition::Resolved {
                token,
                kind: exchange.kind,
            },
            Err(_) => Self::stale(token),
        }
    }

    fn abort_completed(&self, token: ExchangeToken, outcome: ReplyOutcome) -> Disposition {
        let Some(request) = self.aborts.take(token) else {
            return Self::stale(token);
        };
        let cancelled = self.aborts.on_abort_reply(&request, &outcome);
        // Waiters of the abort observe its targets already cancelled.
        let _ = self.tracker.resolve(token, outcome);
        Disposition::Aborted { token, cancelled }
    }

    async fn buffer_consumed(
        &self,
        token: ExchangeToken,
        reply: &BufferPostReply,
        outcome: ReplyOutcome,
    ) -> Result<Disposition> {
        let port = reply.port();
        let index = BufferIndex::new(reply.transaction_context);
        let pool = self.pools.require(port)?;
        // A buffer restored without a new post keeps replying under the
        // token of its last post, which is already closed.
        let _ = self.tracker.resolve(token, outcome);

        let consumed = if outcome.is_success() {
            pool.consume_bound(index, token, reply.no_response_needed())?
        } else {
            None
        };
        let Some(decision) = consumed else {
            // Unfilled, or caught by an abort that has not yet reclaimed it.
            if pool.reclaim_bound(index, token) {
                return Ok(Disposition::Reclaimed { port, index, token });
            }
            return Ok(Self::stale(token));
        };
        if let ReplyPayload::Unsolicited(frame) = *outcome.payload() {
            self.forward(ReceivedFrame {
                port,
                index,
                no_response_needed: reply.no_response_needed(),
                frame,
            });
        }

        let reposted = match decision {
            ReplenishDecision::None => {
                pool.replenish(index)?;
                None
            }
            ReplenishDecision::Replenish(_) if self.config.auto_replenish() => {
                Some(self.repost(&pool, index).await?)
            }
            ReplenishDecision::Replenish(_) => None,
        };
        Ok(Disposition::Consumed {
            port,
            index,
            token,
            decision,
            reposted,
        })
    }

    async fn repost(&self, pool: &BufferPool, index: BufferIndex) -> Result<ExchangeToken> {
        let descriptor = pool.replenish(index)?;
        // Nobody waits on automatic posts; their replies reach the frame sink.
        let submission = self.submit_post(pool, index, descriptor).await?;
        Ok(submission.token)
    }

    fn forward(&self, received: ReceivedFrame) {
        let Some(sink) = &self.frames else {
            return;
        };
        match sink.try_send(received) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(port = %dropped.port, index = %dropped.index, "frame sink full; frame dropped");
                crate::metrics::inc_errors();
            }
            Err(TrySendError::Closed(_)) => {
                debug!("frame sink closed");
            }
        }
    }

    fn stale(token: ExchangeToken) -> Disposition {
        warn!(%token, "reply for exchange no longer open");
        crate::metrics::inc_stale_replies();
        Disposition::Stale { token }
    }
}
