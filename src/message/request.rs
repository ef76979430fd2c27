//! Request messages sent from the host to the controller.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{
    CatalogError,
    FRAME_HEADER_LEN,
    FrameHeader,
    FunctionCode,
    REQUEST_HEADER_LEN,
    RequestHeader,
    SIMPLE_SGE_LEN,
    SgeDescriptor,
    SgeFlags,
    TRANSACTION_SGE_LEN,
    ensure_len,
    sgl::{decode_transaction, encode_transaction},
};
use crate::{
    field::FlaggedDestination,
    token::{ExchangeToken, PortId},
};

/// Port-select bit shared by the flags byte of every request.
pub const PORT_FLAG_MASK: u8 = 0x01;
const IMMEDIATE_RESPONSE: u8 = 0x80;

const ABORT_ALL_BUFFERS: u8 = 0x00;
const ABORT_EXACT: u8 = 0x01;
const ABORT_CT_SENDS: u8 = 0x02;
const ABORT_ELS_SENDS: u8 = 0x03;

fn port_flag(port: PortId) -> u8 { port.get() & PORT_FLAG_MASK }

fn port_from_flags(flags: u8) -> PortId { PortId::new(flags & PORT_FLAG_MASK) }

/// One receive buffer offered to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostedBuffer {
    /// Context echoed by the controller when it consumes the buffer.
    pub transaction_context: u32,
    /// Memory the controller fills.
    pub descriptor: SgeDescriptor,
}

/// Offer receive buffers for unsolicited link-service frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferPost {
    port: PortId,
    buffers: Vec<PostedBuffer>,
}

impl BufferPost {
    /// Post `buffers` on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidField`] when the list is empty or longer
    /// than the one-byte buffer count allows.
    pub fn new(port: PortId, buffers: Vec<PostedBuffer>) -> Result<Self, CatalogError> {
        if buffers.is_empty() || buffers.len() > usize::from(u8::MAX) {
            return Err(CatalogError::InvalidField {
                field: "buffer count",
                value: u32::try_from(buffers.len()).unwrap_or(u32::MAX),
            });
        }
        Ok(Self { port, buffers })
    }

    /// Post a single buffer.
    #[must_use]
    pub fn single(port: PortId, buffer: PostedBuffer) -> Self {
        Self {
            port,
            buffers: vec![buffer],
        }
    }

    /// Port the buffers are posted on.
    #[must_use]
    pub fn port(&self) -> PortId { self.port }

    /// The posted buffers in wire order.
    #[must_use]
    pub fn buffers(&self) -> &[PostedBuffer] { &self.buffers }
}

/// Send a link-service response for a received frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkServiceResponse {
    /// Port the request frame arrived on.
    pub port: PortId,
    /// The payload is carried as immediate data.
    pub immediate: bool,
    /// Length of the response payload in bytes.
    pub response_length: u8,
    /// Frame header of the response.
    pub frame: FrameHeader,
    /// Response payload.
    pub payload: SgeDescriptor,
}

/// Send an extended link-service command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElsSend {
    /// Port to send from.
    pub port: PortId,
    /// Alias identity the command is sent under.
    pub alias_index: u8,
    /// 24-bit destination port identifier.
    pub destination: u32,
    /// ELS command code, first word of the payload.
    pub els_command: u32,
    /// Command payload.
    pub payload: SgeDescriptor,
    /// Buffer receiving the peer's response.
    pub response: Option<SgeDescriptor>,
}

/// Send a common-transport request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CtSend {
    /// Port to send from.
    pub port: PortId,
    /// Alias identity the request is sent under.
    pub alias_index: u8,
    /// 24-bit destination port identifier.
    pub destination: u32,
    /// CT command code.
    pub ct_command: u16,
    /// Fibre Channel service type (FC-4 type of the directory service).
    pub fs_type: u8,
    /// Command payload.
    pub payload: SgeDescriptor,
    /// Buffer receiving the peer's response.
    pub response: Option<SgeDescriptor>,
}

bitflags! {
    /// Options of a primitive send.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PrimitiveSendFlags: u8 {
        /// Reset the link through the multi-loop path.
        const ML_RESET_LINK = 0x02;
        /// Reset the link before sending.
        const RESET_LINK = 0x04;
        /// Stop a primitive sent with `FOREVER`.
        const STOP_SEND = 0x08;
        /// Send the primitive a single time.
        const SEND_ONCE = 0x10;
        /// Send until the primitive comes back around the loop.
        const SEND_AROUND = 0x20;
        /// Send until the receive buffer fills.
        const UNTIL_FULL = 0x40;
        /// Send until told to stop.
        const FOREVER = 0x80;
    }
}

/// Transmit an ordered set on the link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimitiveSend {
    /// Port to send on.
    pub port: PortId,
    /// How and for how long to send.
    pub flags: PrimitiveSendFlags,
    /// The four bytes of the ordered set.
    pub primitive: [u8; 4],
}

/// Which outstanding work an abort targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AbortScope {
    /// The single operation with this transaction context.
    Exact(u32),
    /// Every buffer posted on the port.
    AllBuffers,
    /// Every common-transport send on the port.
    CtSends,
    /// Every extended link-service send on the port.
    ElsSends,
}

impl AbortScope {
    /// Wire value of the abort type byte.
    #[must_use]
    pub const fn abort_type(self) -> u8 {
        match self {
            Self::Exact(_) => ABORT_EXACT,
            Self::AllBuffers => ABORT_ALL_BUFFERS,
            Self::CtSends => ABORT_CT_SENDS,
            Self::ElsSends => ABORT_ELS_SENDS,
        }
    }

    /// Transaction context placed in the request; zero for class scopes.
    #[must_use]
    pub const fn transaction_context(self) -> u32 {
        match self {
            Self::Exact(context) => context,
            Self::AllBuffers | Self::CtSends | Self::ElsSends => 0,
        }
    }

    fn from_wire(abort_type: u8, context: u32) -> Result<Self, CatalogError> {
        let scope = match abort_type {
            ABORT_EXACT => Self::Exact(context),
            ABORT_ALL_BUFFERS => Self::AllBuffers,
            ABORT_CT_SENDS => Self::CtSends,
            ABORT_ELS_SENDS => Self::ElsSends,
            other => {
                return Err(CatalogError::InvalidField {
                    field: "abort type",
                    value: u32::from(other),
                });
            }
        };
        Ok(scope)
    }
}

/// Cancel outstanding work on a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AbortRequestMessage {
    /// Port the aborted work runs on.
    pub port: PortId,
    /// Work to abort.
    pub scope: AbortScope,
}

/// Every request the host can send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Hand receive buffers to the controller.
    BufferPost(BufferPost),
    /// Answer an unsolicited link-service request.
    LinkServiceResponse(LinkServiceResponse),
    /// Send an extended link-service command.
    ElsSend(ElsSend),
    /// Send a common-transport request.
    CtSend(CtSend),
    /// Transmit a primitive sequence.
    PrimitiveSend(PrimitiveSend),
    /// Abort outstanding work.
    Abort(AbortRequestMessage),
}

impl Request {
    /// Function code of the request.
    #[must_use]
    pub fn function(&self) -> FunctionCode {
        match self {
            Self::BufferPost(_) => FunctionCode::LinkServiceBufferPost,
            Self::LinkServiceResponse(_) => FunctionCode::LinkServiceResponse,
            Self::ElsSend(_) => FunctionCode::ExLinkServiceSend,
            Self::CtSend(_) => FunctionCode::CommonTransportSend,
            Self::PrimitiveSend(_) => FunctionCode::PrimitiveSend,
            Self::Abort(_) => FunctionCode::FcAbort,
        }
    }

    /// Port the request addresses.
    #[must_use]
    pub fn port(&self) -> PortId {
        match self {
            Self::BufferPost(post) => post.port,
            Self::LinkServiceResponse(rsp) => rsp.port,
            Self::ElsSend(send) => send.port,
            Self::CtSend(send) => send.port,
            Self::PrimitiveSend(send) => send.port,
            Self::Abort(abort) => abort.port,
        }
    }

    /// Encoded length in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let sends = |response: Option<SgeDescriptor>| {
            REQUEST_HEADER_LEN + 4 + SIMPLE_SGE_LEN * (1 + usize::from(response.is_some()))
        };
        match self {
            Self::BufferPost(post) => {
                REQUEST_HEADER_LEN + post.buffers.len() * (TRANSACTION_SGE_LEN + SIMPLE_SGE_LEN)
            }
            Self::LinkServiceResponse(_) => REQUEST_HEADER_LEN + FRAME_HEADER_LEN + SIMPLE_SGE_LEN,
            Self::ElsSend(send) => sends(send.response),
            Self::CtSend(send) => sends(send.response),
            Self::PrimitiveSend(_) | Self::Abort(_) => REQUEST_HEADER_LEN + 4,
        }
    }

    fn header(&self, context: ExchangeToken) -> RequestHeader {
        let mut header = RequestHeader::new(self.function(), context);
        header.flags = port_flag(self.port());
        match self {
            Self::BufferPost(post) => {
                header.count_or_type = u8::try_from(post.buffers.len()).unwrap_or(u8::MAX);
            }
            Self::LinkServiceResponse(rsp) => {
                if rsp.immediate {
                    header.flags |= IMMEDIATE_RESPONSE;
                }
                header.count_or_type = rsp.response_length;
            }
            Self::ElsSend(send) => {
                header.count_or_type = send.alias_index;
                header.word1 = FlaggedDestination::new(0, send.destination);
            }
            Self::CtSend(send) => {
                header.count_or_type = send.alias_index;
                header.word1 = FlaggedDestination::new(0, send.destination);
            }
            Self::PrimitiveSend(send) => header.flags |= send.flags.bits(),
            Self::Abort(abort) => header.count_or_type = abort.scope.abort_type(),
        }
        header
    }

    /// Append the request, stamped with `context`, to `dst`.
    pub fn encode<B: BufMut>(&self, context: ExchangeToken, dst: &mut B) {
        self.header(context).encode(dst);
        match self {
            Self::BufferPost(post) => {
                let last = post.buffers.len() - 1;
                for (i, buffer) in post.buffers.iter().enumerate() {
                    encode_transaction(buffer.transaction_context, dst);
                    buffer.descriptor.encode(i == last, dst);
                }
            }
            Self::LinkServiceResponse(rsp) => {
                rsp.frame.encode(dst);
                rsp.payload.encode(true, dst);
            }
            Self::ElsSend(send) => {
                dst.put_u32_le(send.els_command);
                encode_send_sgl(send.payload, send.response, dst);
            }
            Self::CtSend(send) => {
                dst.put_u16_le(send.ct_command);
                dst.put_u8(send.fs_type);
                dst.put_u8(0);
                encode_send_sgl(send.payload, send.response, dst);
            }
            Self::PrimitiveSend(send) => dst.put_slice(&send.primitive),
            Self::Abort(abort) => dst.put_u32_le(abort.scope.transaction_context()),
        }
    }

    /// Encode the request into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self, context: ExchangeToken) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode(context, &mut dst);
        dst.freeze()
    }

    /// Parse a request, returning its message context and body.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if the frame is short, carries an unknown
    /// function code or holds an out-of-range field.
    pub fn decode(bytes: &[u8]) -> Result<(ExchangeToken, Self), CatalogError> {
        let header = RequestHeader::decode(bytes)?;
        let mut body = &bytes[REQUEST_HEADER_LEN..];
        let port = port_from_flags(header.flags);
        let request = match header.function {
            FunctionCode::LinkServiceBufferPost => {
                let mut buffers = Vec::with_capacity(usize::from(header.count_or_type));
                for _ in 0..header.count_or_type {
                    let transaction_context = decode_transaction(&mut body)?;
                    let (descriptor, _) = SgeDescriptor::decode(&mut body)?;
                    buffers.push(PostedBuffer {
                        transaction_context,
                        descriptor,
                    });
                }
                Self::BufferPost(BufferPost::new(port, buffers)?)
            }
            FunctionCode::LinkServiceResponse => {
                let frame = FrameHeader::decode(&mut body)?;
                let (payload, _) = SgeDescriptor::decode(&mut body)?;
                Self::LinkServiceResponse(LinkServiceResponse {
                    port,
                    immediate: header.flags & IMMEDIATE_RESPONSE != 0,
                    response_length: header.count_or_type,
                    frame,
                    payload,
                })
            }
            FunctionCode::ExLinkServiceSend => {
                ensure_len(body, 4)?;
                let els_command = body.get_u32_le();
                let (payload, response) = decode_send_sgl(&mut body)?;
                Self::ElsSend(ElsSend {
                    port,
                    alias_index: header.count_or_type,
                    destination: header.word1.d_id,
                    els_command,
                    payload,
                    response,
                })
            }
            FunctionCode::CommonTransportSend => {
                ensure_len(body, 4)?;
                let ct_command = body.get_u16_le();
                let fs_type = body.get_u8();
                body.advance(1);
                let (payload, response) = decode_send_sgl(&mut body)?;
                Self::CtSend(CtSend {
                    port,
                    alias_index: header.count_or_type,
                    destination: header.word1.d_id,
                    ct_command,
                    fs_type,
                    payload,
                    response,
                })
            }
            FunctionCode::PrimitiveSend => {
                ensure_len(body, 4)?;
                let mut primitive = [0; 4];
                body.copy_to_slice(&mut primitive);
                Self::PrimitiveSend(PrimitiveSend {
                    port,
                    flags: PrimitiveSendFlags::from_bits_truncate(header.flags),
                    primitive,
                })
            }
            FunctionCode::FcAbort => {
                ensure_len(body, 4)?;
                let context = body.get_u32_le();
                Self::Abort(AbortRequestMessage {
                    port,
                    scope: AbortScope::from_wire(header.count_or_type, context)?,
                })
            }
        };
        Ok((header.message_context, request))
    }
}

fn encode_send_sgl<B: BufMut>(
    payload: SgeDescriptor,
    response: Option<SgeDescriptor>,
    dst: &mut B,
) {
    payload.encode(response.is_none(), dst);
    if let Some(response) = response {
        response.encode(true, dst);
    }
}

fn decode_send_sgl(
    body: &mut &[u8],
) -> Result<(SgeDescriptor, Option<SgeDescriptor>), CatalogError> {
    let (payload, flags) = SgeDescriptor::decode(body)?;
    if flags.contains(SgeFlags::END_OF_LIST) {
        return Ok((payload, None));
    }
    let (response, _) = SgeDescriptor::decode(body)?;
    Ok((payload, Some(response)))
}
