#![doc(html_root_url = "https://docs.rs/linkframe/latest")]
//! Public API for the `linkframe` library.
//!
//! This crate implements the host side of a Fibre Channel link-service
//! message interface: typed request and reply frames, receive buffer pools,
//! token-keyed exchange tracking and abort coordination, joined together by
//! [`LinkService`].

pub mod abort;
pub mod completion;
pub mod config;
pub mod error;
pub mod exchange;
pub mod field;
pub mod link;
pub mod message;
pub mod metrics;
pub mod pool;
pub mod token;
pub mod transport;

pub use abort::{AbortCoordinator, AbortRequest};
pub use completion::{CompletionError, CompletionQueue, CompletionSender};
pub use config::{ConfigError, LinkConfig, LinkConfigBuilder};
pub use error::LinkError;
/// Result type alias re-exported for convenience when driving a
/// [`LinkService`].
pub use error::Result;
pub use exchange::{Exchange, ExchangeKind, ExchangeTracker, UnknownToken};
pub use field::{CompositeWord, pack_composite, unpack_composite};
pub use link::{Disposition, LinkService, ReceivedFrame, Submission};
pub use message::{CatalogError, FunctionCode, IocStatus, Reply, ReplyOutcome, Request};
pub use metrics::{ERRORS_TOTAL, EXCHANGES_OUTSTANDING, REPLIES_PROCESSED, REQUESTS_SUBMITTED};
pub use pool::{BufferIndex, BufferPool, BufferState, PoolError, PortPools, ReplenishDecision};
pub use token::{ExchangeToken, PortId};
pub use transport::Transport;
