//! Sharded fixed-width row tables with work-driven redistribution.
//!
//! `rowmesh` distributes a hash-mapped table of fixed-width rows across a
//! group of cooperating processes. The key space is split into many small
//! shards, each owned by one process; callers report per-key work figures,
//! and a collective [`DistributedTable::redistribute`] call rebalances shard
//! ownership over the globally-summed figures and bulk-migrates the affected
//! rows, protection holds included.
//!
//! The layers, bottom up:
//!
//! - [`storage`]: growable fixed-width slot storage ([`RowTable`]) and the
//!   hash-indexed table built on it ([`HashMappedTable`]), with
//!   probe-statistics-driven index remapping.
//! - [`partition`]: the shared shard-to-process map ([`PartitionMap`]) and
//!   the deterministic greedy rebalancer ([`rebalance`]).
//! - [`exchange`]: the [`Collectives`] trait, its in-process thread-group
//!   implementation ([`LocalGroup`]), and the batched bulk all-to-all row
//!   transfer ([`BulkExchangePair`]).
//! - [`distributed`]: the [`DistributedTable`] tying it all together, plus
//!   the dependent registry notified after every redistribution.
//!
//! Everything above the [`Collectives`] trait is transport-agnostic;
//! determinism of the rebalancer and of the collective reductions keeps every
//! process's view of ownership identical without any coordination messages.
//!
//! ```
//! use rowmesh::testing::KvRow;
//! use rowmesh::{DistributedTable, LocalGroup, MeshConfig};
//!
//! let mut group = LocalGroup::new(1);
//! let comm = group.remove(0);
//! let mut table = DistributedTable::<KvRow>::new(MeshConfig::default(), &comm)?;
//!
//! table.insert(KvRow { key: 42, value: 7 })?;
//! table.accumulate_work_figure(&42, 1.5);
//!
//! // with a single process there is nothing to rebalance
//! let moves = table.redistribute(&comm)?;
//! assert!(moves.is_empty());
//! assert_eq!(table.lookup_row(&42).unwrap().value, 7);
//! # Ok::<(), rowmesh::Error>(())
//! ```

pub mod config;
pub mod distributed;
pub mod error;
pub mod exchange;
pub mod partition;
pub mod storage;
pub mod testing;
pub mod types;

pub use config::{ExchangeConfig, MappingConfig, MeshConfig, StorageConfig};
pub use distributed::{DependentGuard, DependentRegistry, DistributedTable};
pub use error::{CollectiveError, Error, Result, UsageError};
pub use exchange::{BulkExchangePair, Collectives, LocalGroup};
pub use partition::{rebalance, Move, PartitionMap};
pub use storage::{HashMappedTable, RowTable};
pub use types::{hash_bytes, FixedWidth, Key, ProcessId, Row, ShardId};
