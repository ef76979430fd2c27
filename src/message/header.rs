//! Common request and reply headers.

use bytes::{Buf, BufMut};

use super::{CatalogError, FunctionCode, IocStatus, ensure_len};
use crate::{field::FlaggedDestination, token::ExchangeToken};

/// Length of the common request header in bytes.
pub const REQUEST_HEADER_LEN: usize = 12;
/// Length of the common reply header in bytes.
pub const REPLY_HEADER_LEN: usize = 20;

/// Header shared by every request.
///
/// Bytes 4..8 are reserved in most requests with the message flags in byte 7.
/// Extended link-service and common-transport sends reuse the same word for
/// the destination identifier. Because the word is little-endian, the high
/// byte of the composite lands in byte 7 either way, so both shapes are one
/// [`FlaggedDestination`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestHeader {
    /// Per-kind flags in byte 0.
    pub flags: u8,
    /// Buffer count, alias index, length or abort type in byte 1.
    pub count_or_type: u8,
    /// Offset of a chain element in 32-bit words, zero when unchained.
    pub chain_offset: u8,
    /// Function code in byte 3.
    pub function: FunctionCode,
    /// Message flags and, for sends, the destination identifier.
    pub word1: FlaggedDestination,
    /// Host-chosen correlation token echoed in the reply.
    pub message_context: ExchangeToken,
}

impl RequestHeader {
    /// Start a header for `function` with every other field zeroed.
    #[must_use]
    pub const fn new(function: FunctionCode, message_context: ExchangeToken) -> Self {
        Self {
            flags: 0,
            count_or_type: 0,
            chain_offset: 0,
            function,
            word1: FlaggedDestination::new(0, 0),
            message_context,
        }
    }

    /// Append the header to `dst`.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(self.flags);
        dst.put_u8(self.count_or_type);
        dst.put_u8(self.chain_offset);
        dst.put_u8(self.function.as_u8());
        dst.put_u32_le(self.word1.pack());
        dst.put_u32_le(self.message_context.get());
    }

    /// Parse the header at the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Truncated`] for short input and
    /// [`CatalogError::UnrecognizedMessage`] for unknown function codes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CatalogError> {
        ensure_len(bytes, REQUEST_HEADER_LEN)?;
        let mut buf = bytes;
        let flags = buf.get_u8();
        let count_or_type = buf.get_u8();
        let chain_offset = buf.get_u8();
        let function = FunctionCode::try_from(buf.get_u8())?;
        let word1 = FlaggedDestination::unpack(buf.get_u32_le());
        let message_context = ExchangeToken::new(buf.get_u32_le());
        Ok(Self {
            flags,
            count_or_type,
            chain_offset,
            function,
            word1,
            message_context,
        })
    }
}

/// Header shared by every reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplyHeader {
    /// Per-kind flags in byte 0.
    pub flags: u8,
    /// Alias index in byte 1, reserved for most kinds.
    pub alias_index: u8,
    /// Reply length in 32-bit words.
    pub msg_length: u8,
    /// Function code echoed from the request.
    pub function: FunctionCode,
    /// Port number or initiator index in byte 6.
    pub port_or_index: u8,
    /// Message flags in byte 7.
    pub msg_flags: u8,
    /// Token echoed from the request.
    pub message_context: ExchangeToken,
    /// Controller completion status.
    pub status: IocStatus,
    /// Controller diagnostic code.
    pub log_info: u32,
}

impl ReplyHeader {
    /// Build a header for a reply of `len` bytes.
    #[must_use]
    pub fn new(function: FunctionCode, message_context: ExchangeToken, len: usize) -> Self {
        Self {
            flags: 0,
            alias_index: 0,
            msg_length: u8::try_from(len / 4).unwrap_or(u8::MAX),
            function,
            port_or_index: 0,
            msg_flags: 0,
            message_context,
            status: IocStatus::SUCCESS,
            log_info: 0,
        }
    }

    /// Append the header to `dst`.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(self.flags);
        dst.put_u8(self.alias_index);
        dst.put_u8(self.msg_length);
        dst.put_u8(self.function.as_u8());
        dst.put_u16_le(0);
        dst.put_u8(self.port_or_index);
        dst.put_u8(self.msg_flags);
        dst.put_u32_le(self.message_context.get());
        dst.put_u16_le(0);
        dst.put_u16_le(self.status.to_wire());
        dst.put_u32_le(self.log_info);
    }

    /// Parse the header at the start of `bytes`.
    ///
    /// The function code is checked before the length so that foreign
    /// messages are reported as unrecognized rather than truncated.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnrecognizedMessage`] for unknown function
    /// codes and [`CatalogError::Truncated`] for short input.
    pub fn decode(bytes: &[u8]) -> Result<Self, CatalogError> {
        ensure_len(bytes, 4)?;
        let function = FunctionCode::try_from(bytes[3])?;
        ensure_len(bytes, REPLY_HEADER_LEN)?;
        let mut buf = bytes;
        let flags = buf.get_u8();
        let alias_index = buf.get_u8();
        let msg_length = buf.get_u8();
        buf.advance(1);
        buf.advance(2);
        let port_or_index = buf.get_u8();
        let msg_flags = buf.get_u8();
        let message_context = ExchangeToken::new(buf.get_u32_le());
        buf.advance(2);
        let status = IocStatus::from_wire(buf.get_u16_le());
        let log_info = buf.get_u32_le();
        Ok(Self {
            flags,
            alias_index,
            msg_length,
            function,
            port_or_index,
            msg_flags,
            message_context,
            status,
            log_info,
        })
    }
}
