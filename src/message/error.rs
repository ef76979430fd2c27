//! Errors raised while decoding catalogue messages.

use thiserror::Error;

/// Failure to interpret a request or reply frame.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The function code is not part of the link-service catalogue.
    #[error("unrecognized message function {function:#04x}")]
    UnrecognizedMessage {
        /// Function byte found at offset 3.
        function: u8,
    },

    /// The frame ended before the fixed layout did.
    #[error("truncated message: have {have} bytes, need {need}")]
    Truncated {
        /// Bytes available.
        have: usize,
        /// Bytes required by the layout.
        need: usize,
    },

    /// A field held a value outside its defined set.
    #[error("invalid {field}: {value:#x}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Raw value found on the wire.
        value: u32,
    },
}
