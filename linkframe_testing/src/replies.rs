//! Reply frames as the controller would send them.

use bytes::Bytes;
use linkframe::{
    message::{
        BUFFER_POST_REPLY_LEN,
        BufferPostReply,
        FrameHeader,
        FunctionCode,
        IocStatus,
        NO_RESPONSE_NEEDED,
        REPLY_HEADER_LEN,
        Reply,
        ReplyHeader,
        SendReply,
        StatusReply,
        Wwn,
    },
    pool::BufferIndex,
    token::{ExchangeToken, PortId},
};

fn header(
    function: FunctionCode,
    token: ExchangeToken,
    len: usize,
    status: IocStatus,
) -> ReplyHeader {
    let mut header = ReplyHeader::new(function, token, len);
    header.status = status;
    header
}

/// Reply reporting that `frame` landed in buffer `index` of `port`.
pub fn buffer_consumed(
    token: ExchangeToken,
    port: PortId,
    index: BufferIndex,
    no_response_needed: bool,
    frame: FrameHeader,
) -> Bytes {
    let mut header = header(
        FunctionCode::LinkServiceBufferPost,
        token,
        BUFFER_POST_REPLY_LEN,
        IocStatus::SUCCESS,
    );
    header.port_or_index = port.get();
    if no_response_needed {
        header.flags |= NO_RESPONSE_NEEDED;
    }
    Reply::BufferPost(BufferPostReply {
        header,
        transfer_length: 64,
        transaction_context: index.get(),
        frame,
        wwn: Wwn {
            port_name_high: 0x2000_0000,
            port_name_low: 0xC9AB_CDEF,
            node_name_high: 0x1000_0000,
            node_name_low: 0xC9AB_CDEF,
        },
    })
    .to_bytes()
}

/// Reply giving buffer `index` of `port` back unfilled with `status`.
pub fn buffer_returned(
    token: ExchangeToken,
    port: PortId,
    index: BufferIndex,
    status: IocStatus,
) -> Bytes {
    let mut header = header(
        FunctionCode::LinkServiceBufferPost,
        token,
        BUFFER_POST_REPLY_LEN,
        status,
    );
    header.port_or_index = port.get();
    Reply::BufferPost(BufferPostReply {
        header,
        transfer_length: 0,
        transaction_context: index.get(),
        frame: FrameHeader::default(),
        wwn: Wwn::default(),
    })
    .to_bytes()
}

/// Reply to an ELS send with `status` and `response_length` bytes of
/// peer response.
pub fn els_reply(token: ExchangeToken, status: IocStatus, response_length: u32) -> Bytes {
    Reply::ElsSend(SendReply {
        header: header(
            FunctionCode::ExLinkServiceSend,
            token,
            REPLY_HEADER_LEN + 4,
            status,
        ),
        response_length,
    })
    .to_bytes()
}

/// Status-only reply to a primitive send.
pub fn status_reply(token: ExchangeToken, status: IocStatus) -> Bytes {
    Reply::PrimitiveSend(StatusReply {
        header: header(FunctionCode::PrimitiveSend, token, REPLY_HEADER_LEN, status),
    })
    .to_bytes()
}

/// Reply to an abort request.
pub fn abort_reply(token: ExchangeToken, status: IocStatus) -> Bytes {
    Reply::Abort(StatusReply {
        header: header(FunctionCode::FcAbort, token, REPLY_HEADER_LEN, status),
    })
    .to_bytes()
}
