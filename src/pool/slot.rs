//! Per-buffer ownership state.

use derive_more::{Display, From, Into};

use crate::{message::SgeDescriptor, token::ExchangeToken};

/// Position of a buffer within its port's pool.
///
/// The index doubles as the transaction context of the posted buffer, so the
/// controller names it back in the buffer-post reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("#{_0}")]
pub struct BufferIndex(u32);

impl BufferIndex {
    /// Create an index.
    #[must_use]
    pub const fn new(index: u32) -> Self { Self(index) }

    /// Return the raw index.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }
}

/// Ownership state of one receive buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Owned by the host and free to post.
    Available,
    /// Owned by the controller, waiting for an unsolicited frame.
    Posted,
    /// Filled by the controller; must be posted again.
    ConsumedAwaitingReplenish,
    /// Filled by the controller; no new post request is needed.
    ConsumedNoReplenishNeeded,
    /// The controller was told to give the buffer back.
    Aborted,
    /// Returned to the host after an abort or teardown.
    Reclaimed,
}

impl BufferState {
    /// Report whether the controller currently owns the buffer.
    #[must_use]
    pub const fn is_posted(self) -> bool { matches!(self, Self::Posted) }

    /// Report whether the host may claim the slot for a new post.
    #[must_use]
    pub const fn is_claimable(self) -> bool { matches!(self, Self::Available | Self::Reclaimed) }

    /// Report whether the buffer holds a frame the host has not handed back.
    #[must_use]
    pub const fn is_consumed(self) -> bool {
        matches!(
            self,
            Self::ConsumedAwaitingReplenish | Self::ConsumedNoReplenishNeeded
        )
    }

    /// Report whether moving to `to` is a legal transition.
    #[must_use]
    pub const fn can_move_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Available | Self::Reclaimed, Self::Posted)
                | (
                    Self::Posted,
                    Self::ConsumedAwaitingReplenish
                        | Self::ConsumedNoReplenishNeeded
                        | Self::Aborted
                        | Self::Available
                )
                | (
                    Self::ConsumedAwaitingReplenish | Self::ConsumedNoReplenishNeeded,
                    Self::Posted | Self::Reclaimed
                )
                | (Self::Aborted, Self::Reclaimed)
        )
    }
}

/// One entry of a pool.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BufferSlot {
    pub(crate) state: BufferState,
    pub(crate) descriptor: Option<SgeDescriptor>,
    /// Exchange of the post request currently holding the buffer.
    pub(crate) token: Option<ExchangeToken>,
}

impl BufferSlot {
    pub(crate) const fn empty() -> Self {
        Self {
            state: BufferState::Available,
            descriptor: None,
            token: None,
        }
    }
}
