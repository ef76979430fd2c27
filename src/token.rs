//! Host-assigned correlation tokens.
//!
//! Every request carries a 32-bit message context that the controller echoes
//! in its reply. The host chooses these values, so they are the authoritative
//! key for matching replies to outstanding exchanges.

use derive_more::{Display, From, Into};

/// Message-context token identifying one outstanding exchange.
///
/// # Examples
///
/// ```
/// use linkframe::token::ExchangeToken;
///
/// let token = ExchangeToken::new(42);
/// assert_eq!(token.get(), 42);
/// assert_eq!(token.to_string(), "0x0000002a");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0:#010x}")]
pub struct ExchangeToken(u32);

impl ExchangeToken {
    /// Create a token from its raw message-context value.
    #[must_use]
    pub const fn new(value: u32) -> Self { Self(value) }

    /// Return the raw message-context value.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }
}

/// Identifier of a controller port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("port{_0}")]
pub struct PortId(u8);

impl PortId {
    /// Create a port identifier.
    #[must_use]
    pub const fn new(port: u8) -> Self { Self(port) }

    /// Return the raw port number.
    #[must_use]
    pub const fn get(self) -> u8 { self.0 }
}
