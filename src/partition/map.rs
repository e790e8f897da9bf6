//! Shard-to-process ownership map.

use crate::partition::rebalance::Move;
use crate::types::{Key, ProcessId, ShardId};

/// Fixed-size map from shard index to owning process.
///
/// Constructed with an even round-robin assignment and mutated only by
/// applying rebalancer output. Every process applies identical move lists to
/// identical initial states, so the map stays identical everywhere without
/// negotiation. The shard count never changes after construction.
#[derive(Debug, Clone)]
pub struct PartitionMap {
    owners: Vec<ProcessId>,

    /// The local process, for the owned-shard counter.
    me: ProcessId,

    /// Count of shards currently owned by `me`.
    owned: usize,
}

impl PartitionMap {
    /// Create a map over `n_shards` shards distributed round-robin across
    /// `n_ranks` processes, tracked from the perspective of process `me`.
    pub fn new(n_shards: usize, n_ranks: usize, me: ProcessId) -> Self {
        let owners: Vec<ProcessId> = (0..n_shards).map(|shard| shard % n_ranks).collect();
        let owned = owners.iter().filter(|&&owner| owner == me).count();
        Self { owners, me, owned }
    }

    /// Number of shards.
    pub fn n_shards(&self) -> usize {
        self.owners.len()
    }

    /// The full shard-to-owner slice.
    pub fn owners(&self) -> &[ProcessId] {
        &self.owners
    }

    /// Shard to which a key belongs.
    pub fn shard_of<K: Key>(&self, key: &K) -> ShardId {
        (key.hash64() % self.owners.len() as u64) as usize
    }

    /// Process owning a shard.
    pub fn owner(&self, shard: ShardId) -> ProcessId {
        self.owners[shard]
    }

    /// Process owning a key.
    pub fn owner_of<K: Key>(&self, key: &K) -> ProcessId {
        self.owners[self.shard_of(key)]
    }

    /// Number of shards currently owned by the local process.
    pub fn owned_count(&self) -> usize {
        self.owned
    }

    /// Iterate over the shards owned by `process`.
    pub fn shards_owned_by(&self, process: ProcessId) -> impl Iterator<Item = ShardId> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter(move |(_, &owner)| owner == process)
            .map(|(shard, _)| shard)
    }

    /// Apply an ordered list of ownership moves.
    pub fn apply(&mut self, moves: &[Move]) {
        for m in moves {
            let old = self.owners[m.shard];
            if old == self.me {
                self.owned -= 1;
            }
            if m.dest == self.me {
                self.owned += 1;
            }
            self.owners[m.shard] = m.dest;
        }
    }
}
