//! Link service configuration.
//!
//! [`LinkConfig`] fixes the ports served, the size of each port's buffer
//! pool and the depth of the completion queue. Values are validated once,
//! when [`LinkConfigBuilder::build`] runs.

use thiserror::Error;

use crate::token::PortId;

/// Highest port number the request port flag can address.
pub const MAX_PORT: u8 = crate::message::PORT_FLAG_MASK;
/// Largest number of buffers a single port's pool may hold.
pub const MAX_POOL_CAPACITY: u32 = 4096;
/// Default number of buffers per port.
pub const DEFAULT_POOL_CAPACITY: u32 = 32;
/// Default completion queue depth.
pub const DEFAULT_COMPLETION_DEPTH: usize = 64;
/// Default size of each receive buffer in bytes.
pub const DEFAULT_BUFFER_SIZE: u32 = 2048;

/// Errors returned when building a [`LinkConfig`].
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No port was configured.
    #[error("at least one port must be configured")]
    NoPorts,
    /// A port number exceeds [`MAX_PORT`].
    #[error("{port} is out of range; ports 0..={max} are addressable", max = MAX_PORT)]
    PortOutOfRange {
        /// The offending port.
        port: PortId,
    },
    /// The same port was listed twice.
    #[error("{port} configured more than once")]
    DuplicatePort {
        /// The repeated port.
        port: PortId,
    },
    /// Pool capacity was zero or exceeded [`MAX_POOL_CAPACITY`].
    #[error("invalid pool capacity {0}; must be between 1 and {max}", max = MAX_POOL_CAPACITY)]
    InvalidCapacity(u32),
    /// Completion queue depth was zero.
    #[error("completion queue depth must be >= 1")]
    InvalidCompletionDepth,
    /// Receive buffer size was zero.
    #[error("receive buffer size must be >= 1")]
    InvalidBufferSize,
}

/// Validated settings for a [`LinkService`](crate::link::LinkService).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    ports: Vec<PortId>,
    pool_capacity: u32,
    completion_depth: usize,
    buffer_size: u32,
    auto_replenish: bool,
}

impl LinkConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> LinkConfigBuilder { LinkConfigBuilder::default() }

    /// Ports served, in ascending order.
    #[must_use]
    pub fn ports(&self) -> &[PortId] { &self.ports }

    /// Buffers per port pool.
    #[must_use]
    pub fn pool_capacity(&self) -> u32 { self.pool_capacity }

    /// Capacity of the completion queue.
    #[must_use]
    pub fn completion_depth(&self) -> usize { self.completion_depth }

    /// Size of each receive buffer in bytes.
    #[must_use]
    pub fn buffer_size(&self) -> u32 { self.buffer_size }

    /// Whether consumed buffers are posted again as soon as their reply is
    /// handled.
    #[must_use]
    pub fn auto_replenish(&self) -> bool { self.auto_replenish }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ports: vec![PortId::new(0)],
            pool_capacity: DEFAULT_POOL_CAPACITY,
            completion_depth: DEFAULT_COMPLETION_DEPTH,
            buffer_size: DEFAULT_BUFFER_SIZE,
            auto_replenish: true,
        }
    }
}

/// Builder for [`LinkConfig`].
///
/// Defaults serve port 0 with [`DEFAULT_POOL_CAPACITY`] buffers of
/// [`DEFAULT_BUFFER_SIZE`] bytes and a completion queue of
/// [`DEFAULT_COMPLETION_DEPTH`] frames, replenishing automatically.
///
/// # Examples
///
/// ```
/// use linkframe::{config::LinkConfig, token::PortId};
///
/// let config = LinkConfig::builder()
///     .ports([PortId::new(0), PortId::new(1)])
///     .pool_capacity(8)
///     .build()
///     .expect("valid configuration");
/// assert_eq!(config.ports().len(), 2);
/// assert_eq!(config.pool_capacity(), 8);
/// ```
#[derive(Clone, Debug)]
pub struct LinkConfigBuilder {
    ports: Vec<PortId>,
    pool_capacity: u32,
    completion_depth: usize,
    buffer_size: u32,
    auto_replenish: bool,
}

impl Default for LinkConfigBuilder {
    fn default() -> Self {
        let LinkConfig {
            ports,
            pool_capacity,
            completion_depth,
            buffer_size,
            auto_replenish,
        } = LinkConfig::default();
        Self {
            ports,
            pool_capacity,
            completion_depth,
            buffer_size,
            auto_replenish,
        }
    }
}

impl LinkConfigBuilder {
    /// Set the ports to serve.
    #[must_use]
    pub fn ports(mut self, ports: impl IntoIterator<Item = PortId>) -> Self {
        self.ports = ports.into_iter().collect();
        self
    }

    /// Set the number of buffers in each port's pool.
    #[must_use]
    pub fn pool_capacity(mut self, capacity: u32) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Set the capacity of the completion queue.
    #[must_use]
    pub fn completion_depth(mut self, depth: usize) -> Self {
        self.completion_depth = depth;
        self
    }

    /// Set the size of each receive buffer in bytes.
    #[must_use]
    pub fn buffer_size(mut self, size: u32) -> Self {
        self.buffer_size = size;
        self
    }

    /// Choose whether consumed buffers are posted again automatically.
    #[must_use]
    pub fn auto_replenish(mut self, enabled: bool) -> Self {
        self.auto_replenish = enabled;
        self
    }

    /// Validate the settings and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when no port is listed, a port is listed
    /// twice or is not addressable, or a size is zero or too large.
    pub fn build(self) -> Result<LinkConfig, ConfigError> {
        let mut ports = self.ports;
        if ports.is_empty() {
            return Err(ConfigError::NoPorts);
        }
        if let Some(port) = ports.iter().find(|port| port.get() > MAX_PORT) {
            return Err(ConfigError::PortOutOfRange { port: *port });
        }
        ports.sort_unstable();
        if let Some(pair) = ports.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ConfigError::DuplicatePort { port: pair[0] });
        }
        if !(1..=MAX_POOL_CAPACITY).contains(&self.pool_capacity) {
            return Err(ConfigError::InvalidCapacity(self.pool_capacity));
        }
        if self.completion_depth == 0 {
            return Err(ConfigError::InvalidCompletionDepth);
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize);
        }
        Ok(LinkConfig {
            ports,
            pool_capacity: self.pool_capacity,
            completion_depth: self.completion_depth,
            buffer_size: self.buffer_size,
            auto_replenish: self.auto_replenish,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LinkConfig::builder().build().expect("defaults");
        assert_eq!(config, LinkConfig::default());
        assert!(config.auto_replenish());
    }

    #[test]
    fn ports_are_sorted() {
        let config = LinkConfig::builder()
            .ports([PortId::new(1), PortId::new(0)])
            .build()
            .expect("valid");
        assert_eq!(config.ports(), &[PortId::new(0), PortId::new(1)]);
    }

    #[rstest]
    #[case(LinkConfig::builder().ports([]), ConfigError::NoPorts)]
    #[case(
        LinkConfig::builder().ports([PortId::new(2)]),
        ConfigError::PortOutOfRange { port: PortId::new(2) }
    )]
    #[case(
        LinkConfig::builder().ports([PortId::new(1), PortId::new(1)]),
        ConfigError::DuplicatePort { port: PortId::new(1) }
    )]
    #[case(LinkConfig::builder().pool_capacity(0), ConfigError::InvalidCapacity(0))]
    #[case(
        LinkConfig::builder().pool_capacity(MAX_POOL_CAPACITY + 1),
        ConfigError::InvalidCapacity(MAX_POOL_CAPACITY + 1)
    )]
    #[case(LinkConfig::builder().completion_depth(0), ConfigError::InvalidCompletionDepth)]
    #[case(LinkConfig::builder().buffer_size(0), ConfigError::InvalidBufferSize)]
    fn invalid_settings_are_rejected(#[case] builder: LinkConfigBuilder, #[case] expected: ConfigError) {
        assert_eq!(builder.build(), Err(expected));
    }
}
