//! Hash-mapped row table: slot storage plus a bucket index from key hash to
//! row index.
//!
//! The index keeps two externally-visible counters, lookups and probe-skips,
//! accumulated since the last remap. When the skip/lookup ratio degrades past
//! the configured limit over a sufficient sample, the bucket array is rebuilt
//! at a larger size by scanning the row storage.

use std::cell::Cell;

use tracing::info;

use crate::config::MappingConfig;
use crate::error::{Result, UsageError};
use crate::storage::row_table::RowTable;
use crate::types::{Key, Row};

/// Lower bound on the bucket array size after any remap.
const MIN_BUCKETS: usize = 100;

/// A [`RowTable`] with an open-addressing key index.
///
/// One row per distinct key; duplicate insertion is a usage error.
#[derive(Debug)]
pub struct HashMappedTable<R: Row> {
    table: RowTable<R>,

    /// Buckets of row indices, addressed by `key.hash64() % buckets.len()`.
    buckets: Vec<Vec<usize>>,

    /// Number of mapped keys.
    len: usize,

    /// Lookups since the last remap.
    lookups: Cell<u64>,

    /// Probe-skips since the last remap: rows walked in a bucket that did
    /// not match the key being looked up.
    skips: Cell<u64>,

    opts: MappingConfig,
}

impl<R: Row> HashMappedTable<R> {
    /// Create a table with the given storage and mapping configuration.
    pub fn new(init_capacity: usize, growth_factor: f64, opts: MappingConfig) -> Self {
        let nbuckets = opts.init_buckets.max(1);
        Self {
            table: RowTable::new(init_capacity, growth_factor),
            buckets: vec![Vec::new(); nbuckets],
            len: 0,
            lookups: Cell::new(0),
            skips: Cell::new(0),
            opts,
        }
    }

    /// Number of mapped keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current bucket count.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Lookups attempted since the last remap.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.get()
    }

    /// Probe-skips accumulated since the last remap.
    pub fn skip_count(&self) -> u64 {
        self.skips.get()
    }

    /// The backing row storage.
    pub fn storage(&self) -> &RowTable<R> {
        &self.table
    }

    /// Find the row index holding `key`, counting the lookup and any skips.
    pub fn lookup(&self, key: &R::Key) -> Option<usize> {
        self.lookups.set(self.lookups.get() + 1);
        let bucket = &self.buckets[(key.hash64() % self.buckets.len() as u64) as usize];
        for &index in bucket {
            if self.table.get(index).key() == key {
                return Some(index);
            }
            self.skips.set(self.skips.get() + 1);
        }
        None
    }

    /// Find the row holding `key`.
    pub fn lookup_row(&self, key: &R::Key) -> Option<&R> {
        self.lookup(key).map(|index| self.table.get(index))
    }

    /// Insert a new row, returning its slot index.
    ///
    /// Returns a usage error if the key is already present.
    pub fn insert(&mut self, row: R) -> Result<usize> {
        debug_assert!(!row.is_free(), "cannot insert a free-slot row");
        if self.lookup(row.key()).is_some() {
            return Err(UsageError::DuplicateKey.into());
        }
        let hash = row.key().hash64();
        let index = self.table.push(row);
        let nbuckets = self.buckets.len() as u64;
        self.buckets[(hash % nbuckets) as usize].push(index);
        self.len += 1;
        self.maybe_remap();
        Ok(index)
    }

    /// Remove the row holding `key`, returning its former slot index.
    ///
    /// Returns a usage error if the key is absent or the row is still
    /// protected.
    pub fn erase(&mut self, key: &R::Key) -> Result<usize> {
        let index = self.lookup(key).ok_or(UsageError::KeyNotFound)?;
        self.table.clear_slot(index)?;
        let nbuckets = self.buckets.len() as u64;
        let bucket = &mut self.buckets[(key.hash64() % nbuckets) as usize];
        let pos = bucket
            .iter()
            .position(|&i| i == index)
            .expect("mapped row missing from its bucket");
        bucket.remove(pos);
        self.len -= 1;
        self.maybe_remap();
        Ok(index)
    }

    /// Access the row at a known slot index.
    pub fn get(&self, index: usize) -> &R {
        self.table.get(index)
    }

    /// Mutable access to the row at a known slot index. The key field must
    /// not be altered through this reference.
    pub fn get_mut(&mut self, index: usize) -> &mut R {
        self.table.get_mut(index)
    }

    /// Iterate over occupied rows in slot order.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &R)> {
        self.table.iter().filter(|(_, row)| !row.is_free())
    }

    /// Rebuild the bucket index at `nbuckets` by scanning the row storage,
    /// resetting the lookup/skip counters.
    pub fn remap(&mut self, nbuckets: usize) {
        let nbuckets = nbuckets.max(1);
        let mut buckets = vec![Vec::new(); nbuckets];
        for (index, row) in self.table.iter() {
            if row.is_free() {
                continue;
            }
            buckets[(row.key().hash64() % nbuckets as u64) as usize].push(index);
        }
        self.buckets = buckets;
        self.lookups.set(0);
        self.skips.set(0);
    }

    /// Remove all rows and reset the index. Keeps storage capacity.
    pub fn clear(&mut self) -> Result<()> {
        self.table.clear()?;
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
        self.lookups.set(0);
        self.skips.set(0);
        Ok(())
    }

    /// Increment the pin count of the row at `index`.
    pub fn protect(&mut self, index: usize) {
        self.table.protect(index);
    }

    /// Decrement the pin count of the row at `index`.
    pub fn release(&mut self, index: usize) -> Result<()> {
        self.table.release(index)
    }

    /// Pin count of the row at `index`.
    pub fn protection_level(&self, index: usize) -> u64 {
        self.table.protection_level(index)
    }

    /// Whether the row at `index` carries any protection holds.
    pub fn is_protected(&self, index: usize) -> bool {
        self.table.is_protected(index)
    }

    /// Remap to a larger bucket array if the probe statistics warrant it.
    fn maybe_remap(&mut self) {
        let lookups = self.lookups.get();
        if lookups < self.opts.remap_min_lookups {
            return;
        }
        let ratio = self.skips.get() as f64 / lookups as f64;
        if ratio <= self.opts.remap_ratio {
            return;
        }
        // scale the bucket array by how far the observed ratio overshoots
        // the limit, with the same headroom as the storage growth policy
        let scale = (ratio / self.opts.remap_ratio) * (1.0 + self.table.growth_factor());
        let nbuckets = ((self.buckets.len() as f64 * scale).ceil() as usize).max(MIN_BUCKETS);
        info!(
            skips = self.skips.get(),
            lookups,
            ratio,
            limit = self.opts.remap_ratio,
            old_buckets = self.buckets.len(),
            new_buckets = nbuckets,
            "remapping hash index"
        );
        self.remap(nbuckets);
    }
}
