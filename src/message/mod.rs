//! Typed request and reply messages exchanged with the controller.
//!
//! Each request kind has a fixed little-endian layout that begins with the
//! common 12-byte request header; each reply begins with the common 20-byte
//! reply header. Layouts are encoded and decoded field by field rather than
//! through native struct layouts so the wire image is byte exact.
//!
//! The catalogue is closed: [`Request`] and [`Reply`] have one variant per
//! function code, and decoding an unknown function code fails with
//! [`CatalogError::UnrecognizedMessage`].

mod error;
mod frame_header;
mod header;
mod outcome;
mod reply;
mod request;
mod sgl;
mod status;


pub use error::CatalogError;
pub use frame_header::{FRAME_HEADER_LEN, FrameHeader, WWN_LEN, Wwn};
pub use header::{REPLY_HEADER_LEN, REQUEST_HEADER_LEN, ReplyHeader, RequestHeader};
pub use outcome::{ReplyOutcome, ReplyPayload, UnsolicitedFrame};
pub use reply::{
    BUFFER_POST_REPLY_LEN,
    BufferPostReply,
    LinkServiceResponseReply,
    NO_RESPONSE_NEEDED,
    Reply,
    SendReply,
    StatusReply,
};
pub use request::{
    AbortRequestMessage,
    AbortScope,
    BufferPost,
    CtSend,
    ElsSend,
    LinkServiceResponse,
    PORT_FLAG_MASK,
    PostedBuffer,
    PrimitiveSend,
    PrimitiveSendFlags,
    Request,
};
pub use sgl::{SgeDescriptor, SgeFlags, SIMPLE_SGE_LEN, TRANSACTION_SGE_LEN};
pub use status::IocStatus;

/// Function codes understood by the link-service message layer.
#[repr(u8)]
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// Post receive buffers for unsolicited link-service frames.
    LinkServiceBufferPost = 0x09,
    /// Answer a received link-service frame.
    LinkServiceResponse = 0x0A,
    /// Send an extended link-service command.
    ExLinkServiceSend = 0x0B,
    /// Abort outstanding buffers or sends.
    FcAbort = 0x0C,
    /// Transmit a primitive sequence.
    PrimitiveSend = 0x0D,
    /// Send a common-transport request.
    CommonTransportSend = 0x13,
}

impl FunctionCode {
    /// Return the wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 { self as u8 }

    /// Short lowercase name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinkServiceBufferPost => "buffer_post",
            Self::LinkServiceResponse => "link_service_response",
            Self::ExLinkServiceSend => "els_send",
            Self::FcAbort => "abort",
            Self::PrimitiveSend => "primitive_send",
            Self::CommonTransportSend => "ct_send",
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = CatalogError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let code = match value {
            0x09 => Self::LinkServiceBufferPost,
            0x0A => Self::LinkServiceResponse,
            0x0B => Self::ExLinkServiceSend,
            0x0C => Self::FcAbort,
            0x0D => Self::PrimitiveSend,
            0x13 => Self::CommonTransportSend,
            function => return Err(CatalogError::UnrecognizedMessage { function }),
        };
        Ok(code)
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#04x})", self.as_str(), self.as_u8())
    }
}

/// Fail with [`CatalogError::Truncated`] unless `bytes` holds `need` bytes.
pub(crate) fn ensure_len(bytes: &[u8], need: usize) -> Result<(), CatalogError> {
    if bytes.len() < need {
        return Err(CatalogError::Truncated {
            have: bytes.len(),
            need,
        });
    }
    Ok(())
}
