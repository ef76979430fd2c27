//! Receive buffers posted to the controller for unsolicited frames.
//!
//! Each port owns a [`BufferPool`] with a fixed number of slots. Posting
//! claims a free slot and hands the buffer to the controller; a buffer-post
//! reply marks it consumed and yields a [`ReplenishDecision`]. Slots live in
//! a sharded map so replies for different buffers never wait on each other,
//! and occupancy is tracked with an atomic counter rather than a pool-wide
//! lock.
//!
//! ```text
//! Available/Reclaimed -> Posted -> ConsumedAwaitingReplenish -> Posted
//!                               -> ConsumedNoReplenishNeeded -> Posted
//!                               -> Aborted -> Reclaimed
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

mod error;
mod registry;
mod slot;


pub use error::PoolError;
pub use registry::PortPools;
pub use slot::{BufferIndex, BufferState};
use slot::BufferSlot;

use crate::{
    message::SgeDescriptor,
    token::{ExchangeToken, PortId},
};

/// What the host must do after a buffer was consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplenishDecision {
    /// Post the buffer again before the pool counts as healthy.
    Replenish(BufferIndex),
    /// The buffer needs no new post request.
    None,
}

/// Fixed-capacity pool of receive buffers for one port.
#[derive(Debug)]
pub struct BufferPool {
    port: PortId,
    capacity: usize,
    slots: DashMap<BufferIndex, BufferSlot>,
    posted: AtomicUsize,
    awaiting_replenish: AtomicUsize,
}

impl BufferPool {
    /// Create a pool of `capacity` free slots for `port`.
    #[must_use]
    pub fn new(port: PortId, capacity: u32) -> Self {
        let slots = (0..capacity)
            .map(|i| (BufferIndex::new(i), BufferSlot::empty()))
            .collect();
        Self {
            port,
            capacity: capacity as usize,
            slots,
            posted: AtomicUsize::new(0),
            awaiting_replenish: AtomicUsize::new(0),
        }
    }

    /// Port the pool belongs to.
    #[must_use]
    pub fn port(&self) -> PortId { self.port }

    /// Number of slots fixed at construction.
    #[must_use]
    pub fn capacity(&self) -> usize { self.capacity }

    /// Number of buffers the controller currently owns.
    #[must_use]
    pub fn occupancy(&self) -> usize { self.posted.load(Ordering::Acquire) }

    /// Report whether no consumed buffer is waiting to be posted again.
    #[must_use]
    pub fn is_healthy(&self) -> bool { self.awaiting_replenish.load(Ordering::Acquire) == 0 }

    /// Current state of a slot.
    #[must_use]
    pub fn state(&self, index: BufferIndex) -> Option<BufferState> {
        self.slots.get(&index).map(|slot| slot.state)
    }

    /// Memory last posted in a slot.
    #[must_use]
    pub fn descriptor(&self, index: BufferIndex) -> Option<SgeDescriptor> {
        self.slots.get(&index).and_then(|slot| slot.descriptor)
    }

    /// Exchange of the post request currently holding a slot.
    #[must_use]
    pub fn token(&self, index: BufferIndex) -> Option<ExchangeToken> {
        self.slots.get(&index).and_then(|slot| slot.token)
    }

    /// Indices of every slot in `state`.
    #[must_use]
    pub fn indices_in(&self, state: BufferState) -> Vec<BufferIndex> {
        let mut indices: Vec<_> = self
            .slots
            .iter()
            .filter(|entry| entry.state == state)
            .map(|entry| *entry.key())
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Claim the lowest free slot for `descriptor` and mark it posted.
    ///
    /// The call never waits for a slot to free up.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolFull`] when every slot is in use.
    pub fn post(&self, descriptor: SgeDescriptor) -> Result<BufferIndex, PoolError> {
        for i in 0..self.slot_count() {
            let index = BufferIndex::new(i);
            let Some(mut slot) = self.slots.get_mut(&index) else {
                continue;
            };
            if !slot.state.is_claimable() {
                continue;
            }
            slot.descriptor = Some(descriptor);
            slot.token = None;
            let from = std::mem::replace(&mut slot.state, BufferState::Posted);
            drop(slot);
            self.account(from, BufferState::Posted);
            trace!(port = %self.port, %index, "buffer posted");
            return Ok(index);
        }
        Err(PoolError::PoolFull {
            port: self.port,
            capacity: self.capacity,
        })
    }

    /// Record the exchange that carried the post of `index`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownBuffer`] for an index outside the pool.
    pub fn bind(&self, index: BufferIndex, token: ExchangeToken) -> Result<(), PoolError> {
        let mut slot = self.slot_mut(index)?;
        slot.token = Some(token);
        Ok(())
    }

    /// Process the consumption of a posted buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownBuffer`] for an index outside the pool and
    /// [`PoolError::InvalidTransition`] if the buffer was not posted.
    pub fn on_reply(
        &self,
        index: BufferIndex,
        no_response_needed: bool,
    ) -> Result<ReplenishDecision, PoolError> {
        let (to, decision) = consumption(index, no_response_needed);
        self.transition(index, to)?;
        debug!(port = %self.port, %index, ?decision, "buffer consumed");
        Ok(decision)
    }

    /// Process the consumption of `index` if it is still posted under
    /// `token`.
    ///
    /// The binding check and the move happen under one slot lock, so an
    /// abort or another reply cannot slip in between. Returns `None` and
    /// leaves the slot alone when it is held by another request or is no
    /// longer posted.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownBuffer`] for an index outside the pool.
    pub fn consume_bound(
        &self,
        index: BufferIndex,
        token: ExchangeToken,
        no_response_needed: bool,
    ) -> Result<Option<ReplenishDecision>, PoolError> {
        let mut slot = self.slot_mut(index)?;
        if slot.token != Some(token) || !slot.state.is_posted() {
            return Ok(None);
        }
        let (to, decision) = consumption(index, no_response_needed);
        slot.state = to;
        drop(slot);
        self.account(BufferState::Posted, to);
        debug!(port = %self.port, %index, %token, ?decision, "buffer consumed");
        Ok(Some(decision))
    }

    /// Hand a consumed buffer back to the controller.
    ///
    /// Returns the descriptor to place in the new post request.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidTransition`] unless the buffer is
    /// consumed, which keeps a re-post ordered after its consumption.
    pub fn replenish(&self, index: BufferIndex) -> Result<SgeDescriptor, PoolError> {
        let slot = self.transition_if(index, BufferState::is_consumed, BufferState::Posted)?;
        slot.descriptor.ok_or(PoolError::UnknownBuffer {
            port: self.port,
            index,
        })
    }

    /// Return a freshly posted buffer to the host after its post request
    /// could not be submitted.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidTransition`] unless the buffer is posted.
    pub fn release(&self, index: BufferIndex) -> Result<(), PoolError> {
        self.transition(index, BufferState::Available).map(drop)
    }

    /// Mark a posted buffer as being aborted.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidTransition`] unless the buffer is posted.
    pub fn abort(&self, index: BufferIndex) -> Result<(), PoolError> {
        self.transition(index, BufferState::Aborted).map(drop)
    }

    /// Mark `index` as being aborted if it is still posted under `token`.
    ///
    /// A slot already reclaimed and posted again by a later request is left
    /// alone. Returns whether the slot moved.
    pub fn abort_bound(&self, index: BufferIndex, token: ExchangeToken) -> bool {
        let Ok(mut slot) = self.slot_mut(index) else {
            return false;
        };
        if slot.token != Some(token) || !slot.state.is_posted() {
            return false;
        }
        slot.state = BufferState::Aborted;
        drop(slot);
        self.account(BufferState::Posted, BufferState::Aborted);
        true
    }

    /// Take back a buffer the controller returned unfilled under `token`.
    ///
    /// A posted slot passes through `Aborted`; an aborted one is reclaimed
    /// directly. Slots held by another request are left alone. Returns
    /// whether the slot was reclaimed.
    pub fn reclaim_bound(&self, index: BufferIndex, token: ExchangeToken) -> bool {
        let Ok(mut slot) = self.slot_mut(index) else {
            return false;
        };
        let from = slot.state;
        if slot.token != Some(token) || !(from.is_posted() || from == BufferState::Aborted) {
            return false;
        }
        slot.state = BufferState::Reclaimed;
        slot.token = None;
        drop(slot);
        self.account(from, BufferState::Reclaimed);
        debug!(port = %self.port, %index, %token, "buffer returned by controller");
        true
    }

    /// Mark every posted buffer as being aborted, returning their indices.
    pub fn abort_all(&self) -> Vec<BufferIndex> {
        self.indices_in(BufferState::Posted)
            .into_iter()
            .filter(|index| self.abort(*index).is_ok())
            .collect()
    }

    /// Take back every buffer in `indices` that is still aborted, returning
    /// how many were reclaimed.
    ///
    /// Slots a returned-buffer reply already reclaimed, or that were posted
    /// again since, are skipped.
    pub fn reclaim_aborted(&self, indices: impl IntoIterator<Item = BufferIndex>) -> usize {
        let reclaimed = indices
            .into_iter()
            .filter(|index| self.reclaim(*index).is_ok())
            .count();
        if reclaimed > 0 {
            debug!(port = %self.port, reclaimed, "aborted buffers reclaimed");
        }
        reclaimed
    }

    /// Take back an aborted buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidTransition`] unless the buffer is aborted.
    pub fn reclaim(&self, index: BufferIndex) -> Result<(), PoolError> {
        self.transition(index, BufferState::Reclaimed).map(drop)
    }

    /// Reclaim every buffer the host does not already own.
    ///
    /// Posted buffers pass through `Aborted`. Returns the number of buffers
    /// reclaimed.
    pub fn teardown(&self) -> usize {
        let mut reclaimed = 0;
        for i in 0..self.slot_count() {
            let index = BufferIndex::new(i);
            let Some(state) = self.state(index) else {
                continue;
            };
            if state.is_posted() && self.abort(index).is_err() {
                continue;
            }
            if !state.is_claimable() && self.reclaim(index).is_ok() {
                reclaimed += 1;
            }
        }
        debug!(port = %self.port, reclaimed, "buffer pool torn down");
        reclaimed
    }

    fn slot_count(&self) -> u32 { u32::try_from(self.capacity).unwrap_or(u32::MAX) }

    fn slot_mut(
        &self,
        index: BufferIndex,
    ) -> Result<dashmap::mapref::one::RefMut<'_, BufferIndex, BufferSlot>, PoolError> {
        self.slots.get_mut(&index).ok_or(PoolError::UnknownBuffer {
            port: self.port,
            index,
        })
    }

    /// Move one slot to `to`, keeping the counters in step.
    fn transition(&self, index: BufferIndex, to: BufferState) -> Result<BufferSlot, PoolError> {
        self.transition_if(index, |_| true, to)
    }

    /// Move one slot to `to` if its current state also satisfies `allowed`.
    ///
    /// The check and the move happen under the slot's shard lock. Returns a
    /// copy of the slot after the move.
    fn transition_if(
        &self,
        index: BufferIndex,
        allowed: impl Fn(BufferState) -> bool,
        to: BufferState,
    ) -> Result<BufferSlot, PoolError> {
        let mut slot = self.slot_mut(index)?;
        let from = slot.state;
        if !allowed(from) || !from.can_move_to(to) {
            return Err(PoolError::InvalidTransition { index, from, to });
        }
        slot.state = to;
        if to.is_claimable() {
            slot.token = None;
        }
        let moved = *slot;
        drop(slot);
        self.account(from, to);
        Ok(moved)
    }

    /// Keep the occupancy and replenish counters in step with one move.
    fn account(&self, from: BufferState, to: BufferState) {
        if from.is_posted() {
            self.posted.fetch_sub(1, Ordering::AcqRel);
        }
        if to.is_posted() {
            self.posted.fetch_add(1, Ordering::AcqRel);
        }
        if from == BufferState::ConsumedAwaitingReplenish {
            self.awaiting_replenish.fetch_sub(1, Ordering::AcqRel);
        }
        if to == BufferState::ConsumedAwaitingReplenish {
            self.awaiting_replenish.fetch_add(1, Ordering::AcqRel);
        }
        crate::metrics::set_pool_occupancy(self.port, self.occupancy());
    }
}

/// Target state and host action for one consumed buffer.
fn consumption(index: BufferIndex, no_response_needed: bool) -> (BufferState, ReplenishDecision) {
    if no_response_needed {
        (BufferState::ConsumedNoReplenishNeeded, ReplenishDecision::None)
    } else {
        (
            BufferState::ConsumedAwaitingReplenish,
            ReplenishDecision::Replenish(index),
        )
    }
}
