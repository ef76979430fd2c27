//! Fibre Channel frame header and world-wide-name blocks.

use bytes::{Buf, BufMut};

use super::{CatalogError, ensure_len};
use crate::field::{ClassedSource, RoutedId, TypedControl};

/// Encoded length of [`FrameHeader`].
pub const FRAME_HEADER_LEN: usize = 24;
/// Encoded length of [`Wwn`].
pub const WWN_LEN: usize = 16;

/// The fields of a Fibre Channel frame header as the controller lays them
/// out in link-service messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Routing control and destination identifier.
    pub routing: RoutedId,
    /// Class-specific control and source identifier.
    pub source: ClassedSource,
    /// Frame type and frame control.
    pub control: TypedControl,
    /// Sequence count.
    pub seq_cnt: u16,
    /// Data-field control.
    pub df_ctl: u8,
    /// Sequence identifier.
    pub seq_id: u8,
    /// Responder exchange identifier.
    pub rx_id: u16,
    /// Originator exchange identifier.
    pub ox_id: u16,
    /// Frame parameter word.
    pub parameter: u32,
}

impl FrameHeader {
    /// Build the header of a reply to `received`: identifiers are swapped
    /// and the exchange identifiers are kept so the peer can correlate.
    #[must_use]
    pub fn reply_to(received: &Self, r_ctl: u8, f_ctl: u32) -> Self {
        Self {
            routing: RoutedId::new(r_ctl, received.source.s_id),
            source: ClassedSource::new(received.source.cs_ctl, received.routing.d_id),
            control: TypedControl::new(received.control.frame_type, f_ctl),
            seq_cnt: 0,
            df_ctl: 0,
            seq_id: received.seq_id,
            rx_id: received.rx_id,
            ox_id: received.ox_id,
            parameter: 0,
        }
    }

    /// Append the header to `dst`.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u32_le(self.routing.pack());
        dst.put_u32_le(self.source.pack());
        dst.put_u32_le(self.control.pack());
        dst.put_u16_le(self.seq_cnt);
        dst.put_u8(self.df_ctl);
        dst.put_u8(self.seq_id);
        dst.put_u16_le(self.rx_id);
        dst.put_u16_le(self.ox_id);
        dst.put_u32_le(self.parameter);
    }

    /// Parse a header from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Truncated`] for short input.
    pub fn decode(buf: &mut &[u8]) -> Result<Self, CatalogError> {
        ensure_len(buf, FRAME_HEADER_LEN)?;
        Ok(Self {
            routing: RoutedId::unpack(buf.get_u32_le()),
            source: ClassedSource::unpack(buf.get_u32_le()),
            control: TypedControl::unpack(buf.get_u32_le()),
            seq_cnt: buf.get_u16_le(),
            df_ctl: buf.get_u8(),
            seq_id: buf.get_u8(),
            rx_id: buf.get_u16_le(),
            ox_id: buf.get_u16_le(),
            parameter: buf.get_u32_le(),
        })
    }
}

/// Port and node world-wide names reported with an unsolicited frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Wwn {
    /// High word of the port name.
    pub port_name_high: u32,
    /// Low word of the port name.
    pub port_name_low: u32,
    /// High word of the node name.
    pub node_name_high: u32,
    /// Low word of the node name.
    pub node_name_low: u32,
}

impl Wwn {
    /// Return the 64-bit port name.
    #[must_use]
    pub const fn port_name(&self) -> u64 {
        ((self.port_name_high as u64) << 32) | self.port_name_low as u64
    }

    /// Return the 64-bit node name.
    #[must_use]
    pub const fn node_name(&self) -> u64 {
        ((self.node_name_high as u64) << 32) | self.node_name_low as u64
    }

    /// Append the names to `dst`.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u32_le(self.port_name_high);
        dst.put_u32_le(self.port_name_low);
        dst.put_u32_le(self.node_name_high);
        dst.put_u32_le(self.node_name_low);
    }

    /// Parse the names from the front of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Truncated`] for short input.
    pub fn decode(buf: &mut &[u8]) -> Result<Self, CatalogError> {
        ensure_len(buf, WWN_LEN)?;
        Ok(Self {
            port_name_high: buf.get_u32_le(),
            port_name_low: buf.get_u32_le(),
            node_name_high: buf.get_u32_le(),
            node_name_low: buf.get_u32_le(),
        })
    }
}
