//! Metric helpers for `linkframe`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::{message::FunctionCode, token::PortId};

/// Name of the counter tracking requests handed to the transport.
pub const REQUESTS_SUBMITTED: &str = "linkframe_requests_submitted_total";
/// Name of the counter tracking decoded replies.
pub const REPLIES_PROCESSED: &str = "linkframe_replies_processed_total";
/// Name of the counter tracking replies whose token was no longer open.
pub const STALE_REPLIES: &str = "linkframe_stale_replies_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "linkframe_errors_total";
/// Name of the gauge tracking open exchanges.
pub const EXCHANGES_OUTSTANDING: &str = "linkframe_exchanges_outstanding";
/// Name of the gauge tracking buffers owned by the controller per port.
pub const POOL_OCCUPANCY: &str = "linkframe_pool_occupancy";

/// Record a request submitted to the transport.
pub fn inc_requests(function: FunctionCode) {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_SUBMITTED, "function" => function.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = function;
}

/// Record a decoded reply.
pub fn inc_replies(function: FunctionCode) {
    #[cfg(feature = "metrics")]
    counter!(REPLIES_PROCESSED, "function" => function.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = function;
}

/// Record a reply for a token that was no longer open.
pub fn inc_stale_replies() {
    #[cfg(feature = "metrics")]
    counter!(STALE_REPLIES).increment(1);
}

/// Record an error occurrence.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}

/// Publish the number of open exchanges.
#[cfg_attr(
    feature = "metrics",
    expect(clippy::cast_precision_loss, reason = "gauges are f64")
)]
pub fn set_outstanding(open: usize) {
    #[cfg(feature = "metrics")]
    gauge!(EXCHANGES_OUTSTANDING).set(open as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = open;
}

/// Publish the number of buffers the controller owns on `port`.
#[cfg_attr(
    feature = "metrics",
    expect(clippy::cast_precision_loss, reason = "gauges are f64")
)]
pub fn set_pool_occupancy(port: PortId, posted: usize) {
    #[cfg(feature = "metrics")]
    gauge!(POOL_OCCUPANCY, "port" => port.to_string()).set(posted as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = (port, posted);
}
