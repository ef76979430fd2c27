//! Packing helpers for composite 32-bit protocol words.
//!
//! Several words in the controller's message layouts carry an 8-bit field in
//! bits 31..24 and a 24-bit field in bits 23..0. The Fibre Channel frame
//! header words (`R_CTL`/`D_ID`, `CS_CTL`/`S_ID`, `TYPE`/`F_CTL`), the
//! message-flags/destination word of send requests and the flags/length word
//! of scatter/gather elements all share this layout, so it lives here once.

/// Mask selecting the 8-bit high field.
pub const HIGH_MASK: u32 = 0xFF00_0000;
/// Shift of the 8-bit high field.
pub const HIGH_SHIFT: u32 = 24;
/// Mask selecting the 24-bit low field.
pub const LOW_MASK: u32 = 0x00FF_FFFF;
/// Shift of the 24-bit low field.
pub const LOW_SHIFT: u32 = 0;

/// Pack an 8-bit high field and a 24-bit low field into one word.
///
/// Bits of `low24` above bit 23 are discarded, mirroring the hardware field
/// width.
///
/// # Examples
///
/// ```
/// use linkframe::field::pack_composite;
///
/// assert_eq!(pack_composite(0x22, 0x00AB_CDEF), 0x22AB_CDEF);
/// assert_eq!(pack_composite(0x00, 0x1FF_FFFF), 0x00FF_FFFF);
/// ```
#[must_use]
pub const fn pack_composite(high: u8, low24: u32) -> u32 {
    #[expect(clippy::cast_lossless, reason = "`u32::from` is not const")]
    let high = high as u32;
    ((high << HIGH_SHIFT) & HIGH_MASK) | ((low24 << LOW_SHIFT) & LOW_MASK)
}

/// Split a word into its 8-bit high field and 24-bit low field.
///
/// # Examples
///
/// ```
/// use linkframe::field::unpack_composite;
///
/// assert_eq!(unpack_composite(0x22AB_CDEF), (0x22, 0x00AB_CDEF));
/// ```
#[must_use]
pub const fn unpack_composite(word: u32) -> (u8, u32) {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the shifted value is masked to eight bits"
    )]
    let high = ((word & HIGH_MASK) >> HIGH_SHIFT) as u8;
    (high, (word & LOW_MASK) >> LOW_SHIFT)
}

/// A 32-bit word holding an 8-bit and a 24-bit field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CompositeWord(u32);

impl CompositeWord {
    /// Build a word from its two fields.
    #[must_use]
    pub const fn new(high: u8, low24: u32) -> Self { Self(pack_composite(high, low24)) }

    /// Return the 8-bit high field.
    #[must_use]
    pub const fn high(self) -> u8 { unpack_composite(self.0).0 }

    /// Return the 24-bit low field.
    #[must_use]
    pub const fn low(self) -> u32 { unpack_composite(self.0).1 }

    /// Return the raw packed value.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }
}

impl From<u32> for CompositeWord {
    fn from(word: u32) -> Self { Self(word) }
}

impl From<CompositeWord> for u32 {
    fn from(word: CompositeWord) -> Self { word.0 }
}

macro_rules! composite_view {
    (
        $(#[$docs:meta])*
        $name:ident { $high:ident, $low:ident }
    ) => {
        $(#[$docs])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name {
            #[doc = concat!("8-bit `", stringify!($high), "` field.")]
            pub $high: u8,
            #[doc = concat!("24-bit `", stringify!($low), "` field.")]
            pub $low: u32,
        }

        impl $name {
            /// Build the view, truncating the 24-bit field.
            #[must_use]
            pub const fn new($high: u8, $low: u32) -> Self {
                Self { $high, $low: $low & LOW_MASK }
            }

            /// Pack the view into its wire word.
            #[must_use]
            pub const fn pack(self) -> u32 { pack_composite(self.$high, self.$low) }

            /// Unpack a wire word into the view.
            #[must_use]
            pub const fn unpack(word: u32) -> Self {
                let ($high, $low) = unpack_composite(word);
                Self { $high, $low }
            }
        }

        impl From<u32> for $name {
            fn from(word: u32) -> Self { Self::unpack(word) }
        }

        impl From<$name> for u32 {
            fn from(view: $name) -> Self { view.pack() }
        }
    };
}

composite_view! {
    /// Routing control paired with a destination identifier.
    RoutedId { r_ctl, d_id }
}

composite_view! {
    /// Class-specific control paired with a source identifier.
    ClassedSource { cs_ctl, s_id }
}

composite_view! {
    /// Frame data-structure type paired with frame control.
    TypedControl { frame_type, f_ctl }
}

composite_view! {
    /// Message flags paired with the destination of a send request.
    FlaggedDestination { msg_flags, d_id }
}
