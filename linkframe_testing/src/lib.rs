//! Utilities for driving a [`LinkService`](linkframe::link::LinkService)
//! against a simulated controller during tests.
//!
//! [`LoopbackTransport`] records every submitted request, and the
//! [`replies`] builders produce the frames a controller would send back.
//!
//! ```rust
//! use linkframe::{config::LinkConfig, link::LinkService};
//! use linkframe_testing::LoopbackTransport;
//!
//! let service = LinkService::new(LinkConfig::default(), LoopbackTransport::new());
//! assert_eq!(service.outstanding(), 0);
//! ```

pub mod logging;
pub mod replies;
pub mod transport;

pub use logging::{LoggerHandle, logger};
pub use replies::{
    abort_reply,
    buffer_consumed,
    buffer_returned,
    els_reply,
    status_reply,
};
pub use transport::LoopbackTransport;
