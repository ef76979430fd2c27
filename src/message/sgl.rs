//! Scatter/gather elements describing host memory.
//!
//! Simple elements use the 64-bit address form: a flags/length composite
//! word followed by the address as two little-endian words. Buffer posts
//! precede each simple element with a transaction element naming the
//! buffer's transaction context.

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use super::{CatalogError, ensure_len};
use crate::field::{CompositeWord, LOW_MASK};

/// Encoded length of a 64-bit simple element.
pub const SIMPLE_SGE_LEN: usize = 12;
/// Encoded length of a transaction element with a one-word context.
pub const TRANSACTION_SGE_LEN: usize = 8;

const ELEMENT_TYPE_MASK: u8 = 0x30;
const ELEMENT_TYPE_SIMPLE: u8 = 0x10;
const ELEMENT_TYPE_TRANSACTION: u8 = 0x00;
const CONTEXT_SIZE: u8 = 4;

bitflags! {
    /// Flags carried in the high byte of an element's flags/length word.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SgeFlags: u8 {
        const LAST_ELEMENT = 0x80;
        const END_OF_BUFFER = 0x40;
        const SIMPLE_ELEMENT = 0x10;
        const LOCAL_ADDRESS = 0x08;
        const HOST_TO_IOC = 0x04;
        const ADDRESS_64 = 0x02;
        const END_OF_LIST = 0x01;
    }
}

/// A host memory region handed to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SgeDescriptor {
    /// Bus address of the region.
    pub address: u64,
    /// Length of the region in bytes; only the low 24 bits reach the wire.
    pub length: u32,
    /// Whether the controller reads from (`true`) or writes to the region.
    pub host_to_ioc: bool,
}

impl SgeDescriptor {
    /// Describe a region the controller fills.
    #[must_use]
    pub const fn inbound(address: u64, length: u32) -> Self {
        Self {
            address,
            length: length & LOW_MASK,
            host_to_ioc: false,
        }
    }

    /// Describe a region the controller reads.
    #[must_use]
    pub const fn outbound(address: u64, length: u32) -> Self {
        Self {
            address,
            length: length & LOW_MASK,
            host_to_ioc: true,
        }
    }

    fn flags(self, last: bool) -> SgeFlags {
        let mut flags = SgeFlags::SIMPLE_ELEMENT | SgeFlags::ADDRESS_64 | SgeFlags::END_OF_BUFFER;
        if self.host_to_ioc {
            flags |= SgeFlags::HOST_TO_IOC;
        }
        if last {
            flags |= SgeFlags::LAST_ELEMENT | SgeFlags::END_OF_LIST;
        }
        flags
    }

    /// Append the descriptor as a simple element.
    pub fn encode<B: BufMut>(&self, last: bool, dst: &mut B) {
        let word = CompositeWord::new(self.flags(last).bits(), self.length);
        dst.put_u32_le(word.get());
        // Low address word first, then the high word.
        dst.put_u64_le(self.address);
    }

    /// Parse a simple element, returning it with its flags.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Truncated`] for short input and
    /// [`CatalogError::InvalidField`] if the element is not a simple one.
    pub fn decode(buf: &mut &[u8]) -> Result<(Self, SgeFlags), CatalogError> {
        ensure_len(buf, SIMPLE_SGE_LEN)?;
        let word = CompositeWord::from(buf.get_u32_le());
        if word.high() & ELEMENT_TYPE_MASK != ELEMENT_TYPE_SIMPLE {
            return Err(CatalogError::InvalidField {
                field: "sge element type",
                value: u32::from(word.high()),
            });
        }
        let address = buf.get_u64_le();
        let flags = SgeFlags::from_bits_truncate(word.high());
        let descriptor = Self {
            address,
            length: word.low(),
            host_to_ioc: flags.contains(SgeFlags::HOST_TO_IOC),
        };
        Ok((descriptor, flags))
    }
}

/// Append a transaction element carrying `context`.
pub(crate) fn encode_transaction<B: BufMut>(context: u32, dst: &mut B) {
    dst.put_u8(0);
    dst.put_u8(CONTEXT_SIZE);
    dst.put_u8(0);
    dst.put_u8(ELEMENT_TYPE_TRANSACTION);
    dst.put_u32_le(context);
}

/// Parse a transaction element, returning its context.
pub(crate) fn decode_transaction(buf: &mut &[u8]) -> Result<u32, CatalogError> {
    ensure_len(buf, TRANSACTION_SGE_LEN)?;
    buf.advance(1);
    let context_size = buf.get_u8();
    let details_length = buf.get_u8();
    let flags = buf.get_u8();
    if flags & ELEMENT_TYPE_MASK != ELEMENT_TYPE_TRANSACTION {
        return Err(CatalogError::InvalidField {
            field: "sge element type",
            value: u32::from(flags),
        });
    }
    if context_size != CONTEXT_SIZE || details_length != 0 {
        return Err(CatalogError::InvalidField {
            field: "transaction context size",
            value: u32::from(context_size),
        });
    }
    Ok(buf.get_u32_le())
}
