//! Configuration types for the distributed row table.

use crate::error::{Error, Result};

/// Main configuration for a [`DistributedTable`](crate::DistributedTable).
///
/// The shard count is `shards_per_process * n_ranks`, fixed for the lifetime
/// of the table. Redistribution cadence is entirely the caller's decision;
/// there is no internal timer.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Number of shards assigned per process at construction. More shards
    /// give the rebalancer finer-grained moves at a small bookkeeping cost.
    pub shards_per_process: usize,

    /// Row storage sizing and growth.
    pub storage: StorageConfig,

    /// Hash index remap sensitivity.
    pub mapping: MappingConfig,

    /// Bulk exchange staging/receive buffer sizing.
    pub exchange: ExchangeConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            shards_per_process: 10,
            storage: StorageConfig::default(),
            mapping: MappingConfig::default(),
            exchange: ExchangeConfig::default(),
        }
    }
}

impl MeshConfig {
    /// Create a configuration with the given shards-per-process count.
    pub fn new(shards_per_process: usize) -> Self {
        Self {
            shards_per_process,
            ..Default::default()
        }
    }

    /// Set the shards-per-process count.
    pub fn with_shards_per_process(mut self, n: usize) -> Self {
        self.shards_per_process = n;
        self
    }

    /// Set the storage configuration.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Set the hash-mapping configuration.
    pub fn with_mapping(mut self, mapping: MappingConfig) -> Self {
        self.mapping = mapping;
        self
    }

    /// Set the exchange configuration.
    pub fn with_exchange(mut self, exchange: ExchangeConfig) -> Self {
        self.exchange = exchange;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.shards_per_process == 0 {
            return Err(Error::Config("shards_per_process must be positive".into()));
        }
        if self.storage.growth_factor < 0.0 {
            return Err(Error::Config("storage growth_factor must be non-negative".into()));
        }
        if self.exchange.growth_factor < 0.0 {
            return Err(Error::Config("exchange growth_factor must be non-negative".into()));
        }
        if self.mapping.remap_ratio <= 0.0 {
            return Err(Error::Config("remap_ratio must be positive".into()));
        }
        if self.mapping.init_buckets == 0 {
            return Err(Error::Config("init_buckets must be positive".into()));
        }
        Ok(())
    }
}

/// Row storage sizing and growth policy.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Initial slot capacity of the backing row table.
    pub init_capacity: usize,

    /// Fractional over-allocation applied when the table grows on overflow:
    /// the new capacity is `required * (1 + growth_factor)`.
    pub growth_factor: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            init_capacity: 1024,
            growth_factor: 1.0,
        }
    }
}

impl StorageConfig {
    /// Set the initial capacity.
    pub fn with_init_capacity(mut self, n: usize) -> Self {
        self.init_capacity = n;
        self
    }

    /// Set the growth factor.
    pub fn with_growth_factor(mut self, f: f64) -> Self {
        self.growth_factor = f;
        self
    }
}

/// Hash index remap sensitivity.
///
/// The index keeps running counters of lookups and probe-skips since the
/// last remap; a remap to a larger bucket array triggers once the
/// skips/lookups ratio exceeds `remap_ratio` *and* at least
/// `remap_min_lookups` lookups have been sampled. The minimum sample size
/// prevents remapping on noise.
#[derive(Debug, Clone)]
pub struct MappingConfig {
    /// Acceptable ratio of probe-skips to lookups.
    pub remap_ratio: f64,

    /// Minimum number of lookups before the ratio is acted upon.
    pub remap_min_lookups: u64,

    /// Initial bucket count of the hash index.
    pub init_buckets: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            remap_ratio: 2.0,
            remap_min_lookups: 500,
            init_buckets: 100,
        }
    }
}

impl MappingConfig {
    /// Set the acceptable skips/lookups ratio.
    pub fn with_remap_ratio(mut self, ratio: f64) -> Self {
        self.remap_ratio = ratio;
        self
    }

    /// Set the minimum lookup sample size.
    pub fn with_remap_min_lookups(mut self, n: u64) -> Self {
        self.remap_min_lookups = n;
        self
    }

    /// Set the initial bucket count.
    pub fn with_init_buckets(mut self, n: usize) -> Self {
        self.init_buckets = n;
        self
    }
}

/// Bulk exchange buffer sizing.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Initial slot capacity of each per-destination staging table and of
    /// the receive table.
    pub init_capacity_per_peer: usize,

    /// Growth factor applied when a staging table overflows. The receive
    /// table is exempt: it is resized to exactly the negotiated transfer
    /// volume to bound memory during spikes.
    pub growth_factor: f64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            init_capacity_per_peer: 64,
            growth_factor: 1.0,
        }
    }
}

impl ExchangeConfig {
    /// Set the initial per-peer capacity.
    pub fn with_init_capacity_per_peer(mut self, n: usize) -> Self {
        self.init_capacity_per_peer = n;
        self
    }

    /// Set the staging growth factor.
    pub fn with_growth_factor(mut self, f: f64) -> Self {
        self.growth_factor = f;
        self
    }
}
