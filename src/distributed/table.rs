//! The distributed row table: a per-process hash-mapped store coupled with a
//! shared partition map, a work-figure accumulator, and the redistribution
//! cycle that moves rows to follow ownership changes.

use tracing::{debug, info};

use crate::config::MeshConfig;
use crate::distributed::dependents::{DependentGuard, DependentRegistry};
use crate::error::Result;
use crate::exchange::bulk::BulkExchangePair;
use crate::exchange::collectives::Collectives;
use crate::partition::map::PartitionMap;
use crate::partition::rebalance::{rebalance, Move};
use crate::storage::mapped::HashMappedTable;
use crate::types::{FixedWidth, ProcessId, Row, ShardId};

/// Protection level of a migrating row, shipped in lockstep with the row
/// itself so the destination can re-apply the same number of holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PinRow {
    level: u64,
}

impl FixedWidth for PinRow {
    const WIDTH: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.level.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[..8]);
        Self {
            level: u64::from_le_bytes(raw),
        }
    }
}

/// A hash-mapped row table sharded across a group of processes.
///
/// Every process holds the rows whose keys map, via the shared
/// [`PartitionMap`], to shards it owns. Callers report per-key work through
/// [`accumulate_work_figure`](Self::accumulate_work_figure); a call to
/// [`redistribute`](Self::redistribute) on every rank then rebalances shard
/// ownership over the globally-summed figures and migrates the affected rows,
/// protection holds included.
pub struct DistributedTable<R: Row> {
    rank: ProcessId,
    n_ranks: usize,
    partition: PartitionMap,
    store: HashMappedTable<R>,

    /// Local work figures per shard, accumulated since the last
    /// redistribution.
    work: Vec<f64>,

    rows: BulkExchangePair<R>,
    pins: BulkExchangePair<PinRow>,
    dependents: DependentRegistry,
}

impl<R: Row> DistributedTable<R> {
    /// Create the local shard of a table distributed over `comm`'s group.
    ///
    /// Every rank must construct with an identical `config`; the shard count
    /// is `shards_per_process * n_ranks` and the initial assignment is
    /// round-robin, so all ranks start from the same map without exchanging
    /// anything.
    pub fn new<C: Collectives>(config: MeshConfig, comm: &C) -> Result<Self> {
        config.validate()?;
        let n_ranks = comm.n_ranks();
        let n_shards = config.shards_per_process * n_ranks;
        info!(
            rank = comm.rank(),
            n_ranks, n_shards, "initializing distributed table"
        );
        Ok(Self {
            rank: comm.rank(),
            n_ranks,
            partition: PartitionMap::new(n_shards, n_ranks, comm.rank()),
            store: HashMappedTable::new(
                config.storage.init_capacity,
                config.storage.growth_factor,
                config.mapping,
            ),
            work: vec![0.0; n_shards],
            rows: BulkExchangePair::new(n_ranks, &config.exchange),
            pins: BulkExchangePair::new(n_ranks, &config.exchange),
            dependents: DependentRegistry::new(),
        })
    }

    /// This process's rank.
    pub fn rank(&self) -> ProcessId {
        self.rank
    }

    /// The current shard-to-process map.
    pub fn partition(&self) -> &PartitionMap {
        &self.partition
    }

    /// The local hash-mapped store.
    pub fn store(&self) -> &HashMappedTable<R> {
        &self.store
    }

    /// Number of rows held locally.
    pub fn occupied_count(&self) -> usize {
        self.store.len()
    }

    /// Insert a row whose key maps to a locally-owned shard.
    pub fn insert(&mut self, row: R) -> Result<usize> {
        debug_assert_eq!(
            self.partition.owner_of(row.key()),
            self.rank,
            "inserting a key owned by another process"
        );
        self.store.insert(row)
    }

    /// Find the local slot index of `key`, if this process holds it.
    pub fn lookup(&self, key: &R::Key) -> Option<usize> {
        self.store.lookup(key)
    }

    /// Find the local row for `key`.
    pub fn lookup_row(&self, key: &R::Key) -> Option<&R> {
        self.store.lookup_row(key)
    }

    /// Mutable access to the row at a known local slot index.
    pub fn get_mut(&mut self, index: usize) -> &mut R {
        self.store.get_mut(index)
    }

    /// Remove the local row holding `key`.
    pub fn erase(&mut self, key: &R::Key) -> Result<usize> {
        self.store.erase(key)
    }

    /// Add a protection hold to the row at `index`. Protected rows survive
    /// until released, but do not block migration: redistribution moves the
    /// row and re-applies its holds at the destination.
    pub fn protect(&mut self, index: usize) {
        self.store.protect(index);
    }

    /// Release one protection hold from the row at `index`.
    pub fn release(&mut self, index: usize) -> Result<()> {
        self.store.release(index)
    }

    /// Pin count of the row at `index`.
    pub fn protection_level(&self, index: usize) -> u64 {
        self.store.protection_level(index)
    }

    /// Record `cost` units of work against the shard holding `key`.
    pub fn accumulate_work_figure(&mut self, key: &R::Key, cost: f64) {
        debug_assert!(cost >= 0.0, "work figures are non-negative");
        let shard = self.partition.shard_of(key);
        self.work[shard] += cost;
    }

    /// Local work figure currently recorded against `shard`.
    pub fn work_figure(&self, shard: ShardId) -> f64 {
        self.work[shard]
    }

    /// Register a callback to run on this process after every
    /// redistribution, once rows have settled at their new owners.
    pub fn subscribe_dependent(&self, callback: impl FnMut() + Send + 'static) -> DependentGuard {
        self.dependents.subscribe(callback)
    }

    /// Whether every locally-held row maps to a locally-owned shard.
    pub fn verify_ownership(&self) -> bool {
        self.store
            .occupied()
            .all(|(_, row)| self.partition.owner_of(row.key()) == self.rank)
    }

    /// Rebalance shard ownership over the globally-summed work figures and
    /// migrate rows to their new owners.
    ///
    /// A collective: every rank must call it in the same logical step. All
    /// ranks compute the same move list from the same summed figures, apply
    /// it to their partition maps, then bulk-exchange the departing rows
    /// together with their protection levels. Work figures are reset and
    /// dependents are notified once placement has settled. Returns the
    /// applied moves.
    pub fn redistribute<C: Collectives>(&mut self, comm: &C) -> Result<Vec<Move>> {
        let totals = comm.all_reduce_sum(&self.work)?;
        let moves = rebalance(self.partition.owners(), &totals, self.n_ranks);
        self.partition.apply(&moves);
        if !moves.is_empty() {
            info!(
                rank = self.rank,
                n_moves = moves.len(),
                owned = self.partition.owned_count(),
                "applying shard ownership moves"
            );
        }

        // stage every row whose shard moved away, shipping its protection
        // level alongside; holds are force-released locally so the slot can
        // be reclaimed
        let departures: Vec<(R::Key, usize)> = self
            .store
            .occupied()
            .filter(|(_, row)| self.partition.owner_of(row.key()) != self.rank)
            .map(|(index, row)| (row.key().clone(), index))
            .collect();
        for (key, index) in departures {
            let dest = self.partition.owner_of(&key);
            let level = self.store.protection_level(index);
            self.rows.stage(dest, self.store.get(index).clone());
            self.pins.stage(dest, PinRow { level });
            while self.store.is_protected(index) {
                self.store.release(index)?;
            }
            debug!(index, dest, level, "migrating row");
            self.store.erase(&key)?;
        }
        debug_assert_eq!(
            self.rows.send_table(self.rank).hwm(),
            0,
            "rows never migrate to their current owner"
        );

        self.rows.communicate(comm)?;
        self.pins.communicate(comm)?;
        debug_assert_eq!(
            self.rows.recv().hwm(),
            self.pins.recv().hwm(),
            "one protection record per migrated row"
        );

        let arrivals: Vec<(R, u64)> = self
            .rows
            .recv()
            .iter()
            .zip(self.pins.recv().iter())
            .map(|((_, row), (_, pin))| (row.clone(), pin.level))
            .collect();
        for (row, level) in arrivals {
            debug_assert_eq!(
                self.partition.owner_of(row.key()),
                self.rank,
                "received a row this process does not own"
            );
            let index = self.store.insert(row)?;
            for _ in 0..level {
                self.store.protect(index);
            }
        }

        for figure in &mut self.work {
            *figure = 0.0;
        }
        self.dependents.notify_all();
        Ok(moves)
    }
}
