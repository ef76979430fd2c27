//! Reply messages delivered by the controller.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use static_assertions::const_assert_eq;

use super::{
    CatalogError,
    FRAME_HEADER_LEN,
    FrameHeader,
    FunctionCode,
    REPLY_HEADER_LEN,
    ReplyHeader,
    ReplyOutcome,
    ReplyPayload,
    UnsolicitedFrame,
    WWN_LEN,
    Wwn,
    ensure_len,
};
use crate::token::{ExchangeToken, PortId};

/// Encoded length of a buffer-post reply.
pub const BUFFER_POST_REPLY_LEN: usize = REPLY_HEADER_LEN + 8 + FRAME_HEADER_LEN + WWN_LEN;
const WORD_REPLY_LEN: usize = REPLY_HEADER_LEN + 4;

const_assert_eq!(BUFFER_POST_REPLY_LEN, 0x44);
const_assert_eq!(WORD_REPLY_LEN, 0x18);

/// Buffer-post reply flag: no link-service response is owed for the frame.
pub const NO_RESPONSE_NEEDED: u8 = 0x80;

/// Reply reporting that a posted buffer was consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferPostReply {
    /// Common reply header.
    pub header: ReplyHeader,
    /// Bytes the controller wrote into the buffer.
    pub transfer_length: u32,
    /// Context of the consumed buffer.
    pub transaction_context: u32,
    /// Header of the received frame.
    pub frame: FrameHeader,
    /// Port and node names of the sender.
    pub wwn: Wwn,
}

impl BufferPostReply {
    /// Report whether the no-response-needed flag is set.
    #[must_use]
    pub const fn no_response_needed(&self) -> bool {
        self.header.flags & NO_RESPONSE_NEEDED != 0
    }

    /// Port the buffer was posted on.
    #[must_use]
    pub const fn port(&self) -> PortId { PortId::new(self.header.port_or_index) }
}

/// Reply to a link-service response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkServiceResponseReply {
    /// Common reply header.
    pub header: ReplyHeader,
    /// Controller index of the initiator that was answered.
    pub initiator_index: u32,
}

/// Reply to an ELS or CT send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendReply {
    /// Common reply header.
    pub header: ReplyHeader,
    /// Bytes of peer response written to the response buffer.
    pub response_length: u32,
}

/// Status-only reply to a primitive send or an abort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusReply {
    /// Common reply header.
    pub header: ReplyHeader,
}

/// Every reply the controller can deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    /// A posted buffer was consumed or returned.
    BufferPost(BufferPostReply),
    /// A link-service response completed.
    LinkServiceResponse(LinkServiceResponseReply),
    /// An extended link-service send completed.
    ElsSend(SendReply),
    /// A common-transport send completed.
    CtSend(SendReply),
    /// A primitive send completed.
    PrimitiveSend(StatusReply),
    /// An abort completed.
    Abort(StatusReply),
}

impl Reply {
    /// Common header of the reply.
    #[must_use]
    pub const fn header(&self) -> &ReplyHeader {
        match self {
            Self::BufferPost(reply) => &reply.header,
            Self::LinkServiceResponse(reply) => &reply.header,
            Self::ElsSend(reply) | Self::CtSend(reply) => &reply.header,
            Self::PrimitiveSend(reply) | Self::Abort(reply) => &reply.header,
        }
    }

    /// Function code of the reply.
    #[must_use]
    pub const fn function(&self) -> FunctionCode { self.header().function }

    /// Token echoed from the request.
    #[must_use]
    pub const fn message_context(&self) -> ExchangeToken { self.header().message_context }

    /// Encoded length in bytes.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        match self {
            Self::BufferPost(_) => BUFFER_POST_REPLY_LEN,
            Self::LinkServiceResponse(_) | Self::ElsSend(_) | Self::CtSend(_) => WORD_REPLY_LEN,
            Self::PrimitiveSend(_) | Self::Abort(_) => REPLY_HEADER_LEN,
        }
    }

    /// Build the outcome handed to the exchange's waiter.
    #[must_use]
    pub const fn outcome(&self) -> ReplyOutcome {
        let header = self.header();
        let payload = match self {
            Self::BufferPost(reply) => ReplyPayload::Unsolicited(UnsolicitedFrame {
                transfer_length: reply.transfer_length,
                transaction_context: reply.transaction_context,
                frame: reply.frame,
                wwn: reply.wwn,
            }),
            Self::LinkServiceResponse(reply) => ReplyPayload::InitiatorIndex(reply.initiator_index),
            Self::ElsSend(reply) | Self::CtSend(reply) => {
                ReplyPayload::ResponseLength(reply.response_length)
            }
            Self::PrimitiveSend(_) | Self::Abort(_) => ReplyPayload::None,
        };
        ReplyOutcome::new(header.status, header.log_info, payload)
    }

    /// Parse a reply frame.
    ///
    /// A non-success status is not a decoding failure; it is carried in the
    /// header and the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnrecognizedMessage`] for function codes
    /// outside the catalogue and [`CatalogError::Truncated`] for frames
    /// shorter than their layout.
    pub fn decode(bytes: &[u8]) -> Result<Self, CatalogError> {
        let header = ReplyHeader::decode(bytes)?;
        let mut body = &bytes[REPLY_HEADER_LEN..];
        let reply = match header.function {
            FunctionCode::LinkServiceBufferPost => {
                ensure_len(bytes, BUFFER_POST_REPLY_LEN)?;
                let transfer_length = body.get_u32_le();
                let transaction_context = body.get_u32_le();
                let frame = FrameHeader::decode(&mut body)?;
                let wwn = Wwn::decode(&mut body)?;
                Self::BufferPost(BufferPostReply {
                    header,
                    transfer_length,
                    transaction_context,
                    frame,
                    wwn,
                })
            }
            FunctionCode::LinkServiceResponse => {
                ensure_len(bytes, WORD_REPLY_LEN)?;
                Self::LinkServiceResponse(LinkServiceResponseReply {
                    header,
                    initiator_index: body.get_u32_le(),
                })
            }
            FunctionCode::ExLinkServiceSend | FunctionCode::CommonTransportSend => {
                ensure_len(bytes, WORD_REPLY_LEN)?;
                let reply = SendReply {
                    header,
                    response_length: body.get_u32_le(),
                };
                if header.function == FunctionCode::ExLinkServiceSend {
                    Self::ElsSend(reply)
                } else {
                    Self::CtSend(reply)
                }
            }
            FunctionCode::PrimitiveSend => Self::PrimitiveSend(StatusReply { header }),
            FunctionCode::FcAbort => Self::Abort(StatusReply { header }),
        };
        Ok(reply)
    }

    /// Append the reply to `dst`.
    ///
    /// Hosts never send replies; this exists so tests and tools can stand in
    /// for the controller.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        self.header().encode(dst);
        match self {
            Self::BufferPost(reply) => {
                dst.put_u32_le(reply.transfer_length);
                dst.put_u32_le(reply.transaction_context);
                reply.frame.encode(dst);
                reply.wwn.encode(dst);
            }
            Self::LinkServiceResponse(reply) => dst.put_u32_le(reply.initiator_index),
            Self::ElsSend(reply) | Self::CtSend(reply) => dst.put_u32_le(reply.response_length),
            Self::PrimitiveSend(_) | Self::Abort(_) => {}
        }
    }

    /// Encode the reply into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut dst);
        dst.freeze()
    }
}
