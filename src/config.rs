//! Configuration for AtlasTable
//!
//! Centralized execution settings with sensible defaults.

use crate::protocol::CURRENT_SERIAL_VERSION;
use crate::resolver::RegionOrder;

/// Region id meaning "no region" (non multi-region writes)
pub const NULL_REGION_ID: u32 = 0;

/// Region id of the local region
pub const LOCAL_REGION_ID: u32 = 1;

/// Main configuration for the operation execution core
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Multi-Region Configuration
    // -------------------------------------------------------------------------
    /// Region id stamped on locally originated writes
    pub local_region_id: u32,

    /// Time-to-live of a tombstone written in place of a delete (milliseconds)
    pub tombstone_ttl_ms: u64,

    /// Ordering used to break PutResolve timestamp ties
    pub region_order: RegionOrder,

    // -------------------------------------------------------------------------
    // Write Path Configuration
    // -------------------------------------------------------------------------
    /// Bound on insert-then-search races before giving up
    pub max_write_retries: u32,

    // -------------------------------------------------------------------------
    // Iteration Configuration
    // -------------------------------------------------------------------------
    /// Batch size used when an iterate request asks for 0
    pub default_batch_size: u32,

    // -------------------------------------------------------------------------
    // Query Configuration
    // -------------------------------------------------------------------------
    /// Subtracted from the client timeout so a local timeout fires first
    pub query_timeout_margin_ms: u64,

    /// Sleep between topology convergence checks (milliseconds)
    pub topology_poll_interval_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Highest serial version this node speaks
    pub serial_version: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_region_id: LOCAL_REGION_ID,
            tombstone_ttl_ms: 7 * 24 * 60 * 60 * 1000, // 7 days
            region_order: RegionOrder::NumericId,
            max_write_retries: 10,
            default_batch_size: 100,
            query_timeout_margin_ms: 1000,
            topology_poll_interval_ms: 100,
            serial_version: CURRENT_SERIAL_VERSION,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the local region id
    pub fn local_region_id(mut self, id: u32) -> Self {
        self.config.local_region_id = id;
        self
    }

    /// Set the tombstone TTL (in milliseconds)
    pub fn tombstone_ttl_ms(mut self, ms: u64) -> Self {
        self.config.tombstone_ttl_ms = ms;
        self
    }

    /// Set the region ordering used for tie-breaks
    pub fn region_order(mut self, order: RegionOrder) -> Self {
        self.config.region_order = order;
        self
    }

    /// Set the maximum number of write race retries
    pub fn max_write_retries(mut self, retries: u32) -> Self {
        self.config.max_write_retries = retries;
        self
    }

    /// Set the default iteration batch size
    pub fn default_batch_size(mut self, size: u32) -> Self {
        self.config.default_batch_size = size;
        self
    }

    /// Set the query timeout safety margin (in milliseconds)
    pub fn query_timeout_margin_ms(mut self, ms: u64) -> Self {
        self.config.query_timeout_margin_ms = ms;
        self
    }

    /// Set the topology poll interval (in milliseconds)
    pub fn topology_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.topology_poll_interval_ms = ms;
        self
    }

    /// Set the serial version spoken by this node
    pub fn serial_version(mut self, version: u16) -> Self {
        self.config.serial_version = version;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
