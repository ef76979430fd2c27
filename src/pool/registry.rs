//! Per-port pool lookup.
//!
//! `PortPools` maps each configured port to its [`BufferPool`]. Pools are
//! shared through `Arc`, so a reply for one port never contends with work on
//! another beyond the brief shard lock taken by the lookup itself.

use std::sync::Arc;

use dashmap::DashMap;

use super::{BufferPool, PoolError};
use crate::token::PortId;

/// Concurrent registry of buffer pools keyed by [`PortId`].
#[derive(Debug, Default)]
pub struct PortPools(DashMap<PortId, Arc<BufferPool>>);

impl PortPools {
    /// Create one pool of `capacity` buffers for each of `ports`.
    #[must_use]
    pub fn with_ports(ports: impl IntoIterator<Item = PortId>, capacity: u32) -> Self {
        let pools = Self::default();
        for port in ports {
            pools.insert(Arc::new(BufferPool::new(port, capacity)));
        }
        pools
    }

    /// Register `pool`, replacing any pool already held for its port.
    pub fn insert(&self, pool: Arc<BufferPool>) { self.0.insert(pool.port(), pool); }

    /// Retrieve the pool for `port`.
    pub fn get(&self, port: PortId) -> Option<Arc<BufferPool>> {
        self.0.get(&port).map(|pool| Arc::clone(pool.value()))
    }

    /// Retrieve the pool for `port` or fail with [`PoolError::UnknownPort`].
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UnknownPort`] when no pool is registered.
    pub fn require(&self, port: PortId) -> Result<Arc<BufferPool>, PoolError> {
        self.get(port).ok_or(PoolError::UnknownPort { port })
    }

    /// Remove the pool for `port`, typically after tearing it down.
    pub fn remove(&self, port: PortId) -> Option<Arc<BufferPool>> {
        self.0.remove(&port).map(|(_, pool)| pool)
    }

    /// Ports with a registered pool, in ascending order.
    #[must_use]
    pub fn ports(&self) -> Vec<PortId> {
        let mut ports: Vec<_> = self.0.iter().map(|entry| *entry.key()).collect();
        ports.sort_unstable();
        ports
    }

    /// Total buffers currently owned by the controller across all ports.
    #[must_use]
    pub fn occupancy(&self) -> usize { self.0.iter().map(|pool| pool.occupancy()).sum() }

    /// Tear down every pool, returning the number of buffers reclaimed.
    pub fn teardown(&self) -> usize {
        let pools: Vec<_> = self.0.iter().map(|entry| Arc::clone(entry.value())).collect();
        pools.iter().map(|pool| pool.teardown()).sum()
    }
}
