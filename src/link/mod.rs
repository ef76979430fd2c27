//! The link service handle.
//!
//! [`LinkService`] owns the exchange tracker, the per-port buffer pools and
//! the abort coordinator, and wires them to a [`Transport`]. Callers issue
//! requests through it from any task; a single task runs
//! [`LinkService::run_completions`] to apply replies.
//!
//! ```text
//! caller -> LinkService -> Request::to_bytes -> Transport::submit
//! controller -> CompletionSender -> run_completions -> handle_reply
//!            -> tracker / pools / abort coordinator -> CompletionReceiver
//! ```

mod dispatch;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use dispatch::{Disposition, ReceivedFrame};

use crate::{
    abort::{AbortCoordinator, AbortRequest},
    completion::{CompletionQueue, CompletionSender},
    config::LinkConfig,
    error::{LinkError, Result},
    exchange::{CompletionReceiver, Exchange, ExchangeKind, ExchangeTracker},
    message::{
        AbortScope,
        BufferPost,
        CtSend,
        ElsSend,
        LinkServiceResponse,
        PostedBuffer,
        PrimitiveSend,
        Request,
        SgeDescriptor,
    },
    pool::{BufferIndex, BufferPool, PortPools},
    token::{ExchangeToken, PortId},
    transport::Transport,
};

/// A request accepted by the transport.
#[derive(Debug)]
pub struct Submission {
    /// Token the reply will carry.
    pub token: ExchangeToken,
    /// Resolves with the reply outcome, a controller status or a
    /// cancellation.
    pub completion: CompletionReceiver,
}

/// Host-side endpoint of the link-service message interface.
#[derive(Debug)]
pub struct LinkService<T> {
    config: LinkConfig,
    transport: T,
    tracker: Arc<ExchangeTracker>,
    pools: Arc<PortPools>,
    aborts: AbortCoordinator,
    frames: Option<mpsc::Sender<ReceivedFrame>>,
}

impl<T: Transport> LinkService<T> {
    /// Create a service for `config` submitting through `transport`.
    ///
    /// Every configured port starts with an empty pool.
    #[must_use]
    pub fn new(config: LinkConfig, transport: T) -> Self {
        let tracker = Arc::new(ExchangeTracker::new());
        let pools = Arc::new(PortPools::with_ports(
            config.ports().iter().copied(),
            config.pool_capacity(),
        ));
        let aborts = AbortCoordinator::new(Arc::clone(&tracker), Arc::clone(&pools));
        Self {
            config,
            transport,
            tracker,
            pools,
            aborts,
            frames: None,
        }
    }

    /// Forward every unsolicited frame delivered into a posted buffer to
    /// `sink`.
    ///
    /// Frames are dropped with a warning when the sink is full.
    #[must_use]
    pub fn with_frame_sink(mut self, sink: mpsc::Sender<ReceivedFrame>) -> Self {
        self.frames = Some(sink);
        self
    }

    /// Create a completion channel sized by the configuration.
    #[must_use]
    pub fn completion_channel(&self) -> (CompletionSender, CompletionQueue) {
        CompletionQueue::bounded(self.config.completion_depth())
    }

    /// Settings the service was built with.
    #[must_use]
    pub fn config(&self) -> &LinkConfig { &self.config }

    /// Transport requests are submitted through.
    #[must_use]
    pub fn transport(&self) -> &T { &self.transport }

    /// Table of open exchanges.
    #[must_use]
    pub fn tracker(&self) -> &ExchangeTracker { &self.tracker }

    /// Buffer pool of `port`.
    #[must_use]
    pub fn pool(&self, port: PortId) -> Option<Arc<BufferPool>> { self.pools.get(port) }

    /// Number of open exchanges.
    #[must_use]
    pub fn outstanding(&self) -> usize { self.tracker.len() }

    /// Post one receive buffer described by `descriptor` on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Pool`] if the port is unknown or its pool is
    /// full, and [`LinkError::Transport`] if the request could not be
    /// submitted, in which case the slot is released again.
    pub async fn post_buffer(
        &self,
        port: PortId,
        descriptor: SgeDescriptor,
    ) -> Result<(BufferIndex, Submission)> {
        let pool = self.pools.require(port)?;
        let index = pool.post(descriptor)?;
        let submission = self.submit_post(&pool, index, descriptor).await?;
        Ok((index, submission))
    }

    /// Post one receive buffer of the configured size at `address`.
    ///
    /// # Errors
    ///
    /// As for [`LinkService::post_buffer`].
    pub async fn post_buffer_at(
        &self,
        port: PortId,
        address: u64,
    ) -> Result<(BufferIndex, Submission)> {
        let descriptor = SgeDescriptor::inbound(address, self.config.buffer_size());
        self.post_buffer(port, descriptor).await
    }

    /// Post a consumed buffer again.
    ///
    /// Used when automatic replenishment is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Pool`] unless the buffer is consumed, and
    /// [`LinkError::Transport`] if the request could not be submitted.
    pub async fn replenish(&self, port: PortId, index: BufferIndex) -> Result<Submission> {
        let pool = self.pools.require(port)?;
        let descriptor = pool.replenish(index)?;
        self.submit_post(&pool, index, descriptor).await
    }

    /// Send an extended link-service request.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Pool`] for an unserved port and
    /// [`LinkError::Transport`] if the request could not be submitted.
    pub async fn send_els(&self, send: ElsSend) -> Result<Submission> {
        let exchange = Exchange::new(ExchangeKind::ElsSend, send.port)
            .with_destination(send.destination);
        self.open_and_submit(exchange, Request::ElsSend(send)).await
    }

    /// Send a common-transport request.
    ///
    /// # Errors
    ///
    /// As for [`LinkService::send_els`].
    pub async fn send_ct(&self, send: CtSend) -> Result<Submission> {
        let exchange = Exchange::new(ExchangeKind::CtSend, send.port)
            .with_destination(send.destination);
        self.open_and_submit(exchange, Request::CtSend(send)).await
    }

    /// Send a primitive sequence.
    ///
    /// # Errors
    ///
    /// As for [`LinkService::send_els`].
    pub async fn send_primitive(&self, send: PrimitiveSend) -> Result<Submission> {
        let exchange = Exchange::new(ExchangeKind::PrimitiveSend, send.port);
        self.open_and_submit(exchange, Request::PrimitiveSend(send)).await
    }

    /// Answer an unsolicited link-service request.
    ///
    /// # Errors
    ///
    /// As for [`LinkService::send_els`].
    pub async fn send_response(&self, response: LinkServiceResponse) -> Result<Submission> {
        let frame = response.frame;
        let mut exchange = Exchange::new(ExchangeKind::LinkServiceResponse, response.port)
            .with_destination(frame.routing.d_id)
            .with_exchange_ids(frame.ox_id, frame.rx_id);
        exchange.seq_cnt = frame.seq_cnt;
        self.open_and_submit(exchange, Request::LinkServiceResponse(response))
            .await
    }

    /// Abort the single exchange holding `token`.
    ///
    /// Returns `Ok(None)` when the exchange already finished. Otherwise the
    /// returned submission tracks the abort itself; the target is cancelled
    /// only once the controller confirms the abort.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Transport`] if the abort could not be submitted.
    pub async fn abort_exact(&self, token: ExchangeToken) -> Result<Option<Submission>> {
        match self.aborts.abort_exact(token) {
            Some(request) => self.send_abort(request).await.map(Some),
            None => Ok(None),
        }
    }

    /// Abort every operation of `scope` on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Pool`] for an unserved port and
    /// [`LinkError::Transport`] if the abort could not be submitted.
    pub async fn abort_class(&self, port: PortId, scope: AbortScope) -> Result<Submission> {
        let request = self.aborts.abort_class(port, scope);
        self.send_abort(request).await
    }

    /// Reclaim every buffer on every port without waiting for the
    /// controller, returning the number reclaimed.
    ///
    /// Only call this once the controller has stopped using the buffers.
    pub fn teardown(&self) -> usize {
        let reclaimed = self.pools.teardown();
        debug!(reclaimed, "link service torn down");
        reclaimed
    }

    async fn send_abort(&self, request: AbortRequest) -> Result<Submission> {
        self.pools.require(request.port)?;
        let (token, completion) = self
            .tracker
            .open_exchange(Exchange::new(ExchangeKind::Abort, request.port));
        self.aborts.register(token, request);
        if let Err(error) = self.submit(token, &Request::Abort(request.message())).await {
            self.aborts.take(token);
            let _ = self.tracker.cancel(token);
            return Err(error);
        }
        Ok(Submission { token, completion })
    }

    async fn submit_post(
        &self,
        pool: &BufferPool,
        index: BufferIndex,
        descriptor: SgeDescriptor,
    ) -> Result<Submission> {
        let exchange = Exchange::new(ExchangeKind::BufferPost, pool.port())
            .with_transaction_context(index.get());
        let (token, completion) = self.tracker.open_exchange(exchange);
        let request = Request::BufferPost(BufferPost::single(
            pool.port(),
            PostedBuffer {
                transaction_context: index.get(),
                descriptor,
            },
        ));
        let submitted = match pool.bind(index, token) {
            Ok(()) => self.submit(token, &request).await,
            Err(error) => Err(error.into()),
        };
        if let Err(error) = submitted {
            let _ = self.tracker.cancel(token);
            if let Err(release) = pool.release(index) {
                warn!(port = %pool.port(), %index, error = %release, "claimed buffer not released");
            }
            return Err(error);
        }
        Ok(Submission { token, completion })
    }

    async fn open_and_submit(&self, exchange: Exchange, request: Request) -> Result<Submission> {
        self.pools.require(exchange.port)?;
        let (token, completion) = self.tracker.open_exchange(exchange);
        if let Err(error) = self.submit(token, &request).await {
            let _ = self.tracker.cancel(token);
            return Err(error);
        }
        Ok(Submission { token, completion })
    }

    async fn submit(&self, token: ExchangeToken, request: &Request) -> Result<()> {
        let function = request.function();
        let frame = request.to_bytes(token);
        let len = frame.len();
        if let Err(error) = self.transport.submit(frame).await {
            warn!(%token, %function, %error, "transport refused request");
            crate::metrics::inc_errors();
            return Err(LinkError::Transport(error));
        }
        crate::metrics::inc_requests(function);
        debug!(%token, %function, port = %request.port(), len, "request submitted");
        Ok(())
    }
}
