//! Outstanding operations keyed by their host-assigned token.
//!
//! The tracker owns every open [`Exchange`]. A reply resolves its exchange by
//! the echoed message context; an abort cancels it. Whichever arrives first
//! removes the entry, and the loser sees [`UnknownToken`]. That is how the
//! race between an abort and the aborted operation's own reply is absorbed.
//!
//! OXID/RXID values are recorded for diagnostics only. They are 16 bits wide
//! and wrap under load, so they never serve as the lookup key.

mod error;
mod token_source;
mod tracker;

#[cfg(test)]
mod tests;

pub use error::UnknownToken;
pub use token_source::TokenSource;
pub use tracker::{CompletionReceiver, ExchangeResult, ExchangeTracker};

use crate::{
    message::{AbortScope, FunctionCode, ReplyOutcome},
    token::{ExchangeToken, PortId},
};

/// Kind of operation an exchange tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// A receive buffer posted for unsolicited frames.
    BufferPost,
    /// A response to an unsolicited link-service request.
    LinkServiceResponse,
    /// An extended link-service send.
    ElsSend,
    /// A common-transport send.
    CtSend,
    /// A primitive sequence send.
    PrimitiveSend,
    /// An abort of other exchanges.
    Abort,
}

impl ExchangeKind {
    /// Kind of exchange opened for a request with `function`.
    #[must_use]
    pub const fn for_function(function: FunctionCode) -> Self {
        match function {
            FunctionCode::LinkServiceBufferPost => Self::BufferPost,
            FunctionCode::LinkServiceResponse => Self::LinkServiceResponse,
            FunctionCode::ExLinkServiceSend => Self::ElsSend,
            FunctionCode::CommonTransportSend => Self::CtSend,
            FunctionCode::PrimitiveSend => Self::PrimitiveSend,
            FunctionCode::FcAbort => Self::Abort,
        }
    }

    /// Function code of the request that opens this kind of exchange.
    #[must_use]
    pub const fn function(self) -> FunctionCode {
        match self {
            Self::BufferPost => FunctionCode::LinkServiceBufferPost,
            Self::LinkServiceResponse => FunctionCode::LinkServiceResponse,
            Self::ElsSend => FunctionCode::ExLinkServiceSend,
            Self::CtSend => FunctionCode::CommonTransportSend,
            Self::PrimitiveSend => FunctionCode::PrimitiveSend,
            Self::Abort => FunctionCode::FcAbort,
        }
    }

    /// Report whether a class-wide abort of `scope` covers this kind.
    #[must_use]
    pub const fn in_scope(self, scope: AbortScope) -> bool {
        matches!(
            (self, scope),
            (Self::BufferPost, AbortScope::AllBuffers)
                | (Self::CtSend, AbortScope::CtSends)
                | (Self::ElsSend, AbortScope::ElsSends)
        )
    }
}

/// Metadata of one outstanding operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Exchange {
    /// Operation the exchange tracks.
    pub kind: ExchangeKind,
    /// Port the operation runs on.
    pub port: PortId,
    /// Destination port identifier for sends.
    pub destination: Option<u32>,
    /// Originator exchange identifier, when known.
    pub ox_id: Option<u16>,
    /// Responder exchange identifier, when known.
    pub rx_id: Option<u16>,
    /// Sequence count of the frame being answered.
    pub seq_cnt: u16,
    /// Context an exact abort names; the token value when unset.
    pub transaction_context: Option<u32>,
}

impl Exchange {
    /// Describe a new operation of `kind` on `port`.
    #[must_use]
    pub const fn new(kind: ExchangeKind, port: PortId) -> Self {
        Self {
            kind,
            port,
            destination: None,
            ox_id: None,
            rx_id: None,
            seq_cnt: 0,
            transaction_context: None,
        }
    }

    /// Record the destination of a send.
    #[must_use]
    pub const fn with_destination(mut self, destination: u32) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Record the Fibre Channel exchange identifiers.
    #[must_use]
    pub const fn with_exchange_ids(mut self, ox_id: u16, rx_id: u16) -> Self {
        self.ox_id = Some(ox_id);
        self.rx_id = Some(rx_id);
        self
    }

    /// Record the context an exact abort must name.
    #[must_use]
    pub const fn with_transaction_context(mut self, context: u32) -> Self {
        self.transaction_context = Some(context);
        self
    }
}

/// An input to the tracker from the reply-delivery side.
///
/// Feeding events in a chosen order makes the abort/reply race
/// reproducible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A reply for `token` arrived.
    Resolve {
        token: ExchangeToken,
        outcome: ReplyOutcome,
    },
    /// An abort took effect for `token`.
    Cancel { token: ExchangeToken },
}
