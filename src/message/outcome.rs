//! Parsed result of a reply.

use super::{FrameHeader, IocStatus, Wwn};

/// What the controller reported for one request.
///
/// The outcome is immutable once built: it is produced by
/// [`Reply::outcome`](super::Reply::outcome) and handed to the waiter of the
/// matching exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplyOutcome {
    status: IocStatus,
    log_info: u32,
    payload: ReplyPayload,
}

impl ReplyOutcome {
    /// Assemble an outcome.
    #[must_use]
    pub const fn new(status: IocStatus, log_info: u32, payload: ReplyPayload) -> Self {
        Self {
            status,
            log_info,
            payload,
        }
    }

    /// A successful outcome without payload.
    #[must_use]
    pub const fn success() -> Self { Self::new(IocStatus::SUCCESS, 0, ReplyPayload::None) }

    /// Controller completion status.
    #[must_use]
    pub const fn status(&self) -> IocStatus { self.status }

    /// Controller diagnostic code.
    #[must_use]
    pub const fn log_info(&self) -> u32 { self.log_info }

    /// Operation-specific payload.
    #[must_use]
    pub const fn payload(&self) -> &ReplyPayload { &self.payload }

    /// Report whether the controller completed the request successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool { self.status.is_success() }
}

/// Operation-specific part of a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyPayload {
    /// Status-only replies (primitive sends and aborts).
    None,
    /// Bytes of peer response received by an ELS or CT send.
    ResponseLength(u32),
    /// Initiator index reported for a link-service response.
    InitiatorIndex(u32),
    /// An unsolicited frame delivered into a posted buffer.
    Unsolicited(UnsolicitedFrame),
}

/// Description of a frame the controller wrote into a posted buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnsolicitedFrame {
    /// Bytes written into the buffer.
    pub transfer_length: u32,
    /// Context of the consumed buffer.
    pub transaction_context: u32,
    /// Header of the received frame.
    pub frame: FrameHeader,
    /// Names of the sending port and node.
    pub wwn: Wwn,
}

impl UnsolicitedFrame {
    /// Parameter word of the received frame.
    #[must_use]
    pub const fn parameter(&self) -> u32 { self.frame.parameter }
}
