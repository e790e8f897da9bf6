//! Growable fixed-width slot storage with a high-water mark.
//!
//! A [`RowTable`] is an arena of homogeneous fixed-size slots addressed by
//! index. Slots below the high-water mark are either occupied or sit on a
//! free list after being cleared; capacity above the mark is pre-allocated
//! headroom. Rows are never moved between slots, so a row index is stable
//! until the slot is cleared or the whole table is cleared.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{Result, UsageError};
use crate::types::FixedWidth;

/// Fixed-width slot storage with freed-slot reuse and geometric or explicit
/// growth.
#[derive(Debug, Clone)]
pub struct RowTable<R> {
    slots: Vec<R>,

    /// Count of slots ever handed out and not reclaimed by `clear()`. Slots
    /// in `free` are below this mark but currently unoccupied.
    hwm: usize,

    /// Indices of cleared slots available for reuse, most recently cleared
    /// last.
    free: Vec<usize>,

    /// Pin counts per slot index. A slot with a positive count must not be
    /// cleared.
    pins: BTreeMap<usize, u64>,

    /// Fractional over-allocation applied on overflow.
    growth_factor: f64,
}

impl<R: FixedWidth + Default> RowTable<R> {
    /// Create a table with the given initial capacity and growth factor.
    pub fn new(init_capacity: usize, growth_factor: f64) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(init_capacity, R::default);
        Self {
            slots,
            hwm: 0,
            free: Vec::new(),
            pins: BTreeMap::new(),
            growth_factor,
        }
    }

    /// Slot capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// High-water mark: count of slots handed out so far, occupied or freed.
    pub fn hwm(&self) -> usize {
        self.hwm
    }

    /// Number of currently occupied slots.
    pub fn occupied_count(&self) -> usize {
        self.hwm - self.free.len()
    }

    /// Bytes in use below the high-water mark.
    pub fn used_bytes(&self) -> usize {
        self.hwm * R::WIDTH
    }

    /// Bytes covered by the allocated capacity.
    pub fn capacity_bytes(&self) -> usize {
        self.slots.len() * R::WIDTH
    }

    /// The configured growth factor.
    pub fn growth_factor(&self) -> f64 {
        self.growth_factor
    }

    /// Grow capacity to at least `required * (1 + growth_factor)` slots.
    /// Never shrinks, and quits early when no growth is needed.
    pub fn reserve(&mut self, required: usize, growth_factor: f64) {
        if required <= self.slots.len() {
            return;
        }
        let target = (required as f64 * (1.0 + growth_factor)).ceil() as usize;
        debug!(
            old_capacity = self.slots.len(),
            new_capacity = target,
            "growing row table"
        );
        self.slots.resize_with(target, R::default);
    }

    /// Resize capacity to exactly `capacity` slots, with no growth padding.
    ///
    /// Used when the caller already knows the exact required size, e.g. a
    /// receive buffer sized from a just-negotiated transfer volume.
    pub fn resize_exact(&mut self, capacity: usize) {
        if capacity == self.slots.len() {
            return;
        }
        debug!(
            old_capacity = self.slots.len(),
            new_capacity = capacity,
            "resizing row table to exact capacity"
        );
        self.slots.resize_with(capacity, R::default);
        if self.hwm > capacity {
            self.hwm = capacity;
            self.free.retain(|&i| i < capacity);
        }
    }

    /// Store a row, reusing a freed slot if one is available, otherwise
    /// appending at the high-water mark. Grows on overflow.
    pub fn push(&mut self, row: R) -> usize {
        if let Some(index) = self.free.pop() {
            self.slots[index] = row;
            return index;
        }
        if self.hwm == self.slots.len() {
            self.reserve(self.hwm + 1, self.growth_factor);
        }
        let index = self.hwm;
        self.slots[index] = row;
        self.hwm += 1;
        index
    }

    /// Access the row at `index`, which must be below the high-water mark.
    pub fn get(&self, index: usize) -> &R {
        debug_assert!(index < self.hwm, "index beyond high-water mark");
        &self.slots[index]
    }

    /// Mutable access to the row at `index`.
    pub fn get_mut(&mut self, index: usize) -> &mut R {
        debug_assert!(index < self.hwm, "index beyond high-water mark");
        &mut self.slots[index]
    }

    /// Iterate over all slots below the high-water mark in index order.
    /// Freed slots appear as default rows.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &R)> {
        self.slots[..self.hwm].iter().enumerate()
    }

    /// Zero the slot at `index` and make it available for reuse.
    ///
    /// Returns a usage error if the slot is still protected.
    pub fn clear_slot(&mut self, index: usize) -> Result<()> {
        if let Some(&level) = self.pins.get(&index) {
            return Err(UsageError::StillProtected { index, level }.into());
        }
        self.slots[index] = R::default();
        self.free.push(index);
        Ok(())
    }

    /// Reset the occupancy count, keeping the allocated capacity.
    ///
    /// Returns a usage error if any row is still protected.
    pub fn clear(&mut self) -> Result<()> {
        if let Some((&index, &level)) = self.pins.iter().next() {
            return Err(UsageError::StillProtected { index, level }.into());
        }
        for slot in &mut self.slots[..self.hwm] {
            *slot = R::default();
        }
        self.hwm = 0;
        self.free.clear();
        Ok(())
    }

    /// Increment the pin count of the slot at `index`.
    pub fn protect(&mut self, index: usize) {
        *self.pins.entry(index).or_insert(0) += 1;
    }

    /// Decrement the pin count of the slot at `index`.
    pub fn release(&mut self, index: usize) -> Result<()> {
        match self.pins.get_mut(&index) {
            Some(level) => {
                *level -= 1;
                if *level == 0 {
                    self.pins.remove(&index);
                }
                Ok(())
            }
            None => Err(UsageError::ReleaseUnprotected { index }.into()),
        }
    }

    /// Pin count of the slot at `index`; zero when unprotected.
    pub fn protection_level(&self, index: usize) -> u64 {
        self.pins.get(&index).copied().unwrap_or(0)
    }

    /// Whether the slot at `index` carries any protection holds.
    pub fn is_protected(&self, index: usize) -> bool {
        self.pins.contains_key(&index)
    }

    /// Encode every slot below the high-water mark into a contiguous
    /// fixed-width byte segment.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::zeroed(self.used_bytes());
        for (chunk, row) in buf.chunks_mut(R::WIDTH).zip(&self.slots[..self.hwm]) {
            row.write_to(chunk);
        }
        buf.freeze()
    }

    /// Decode a contiguous fixed-width byte segment, appending one row per
    /// `WIDTH`-byte chunk. Returns the index of the first appended row.
    ///
    /// The caller must have validated that `buf.len()` is a multiple of
    /// `WIDTH`; transfer sizes are negotiated in whole rows.
    pub fn decode_extend(&mut self, buf: &[u8]) -> usize {
        debug_assert_eq!(buf.len() % R::WIDTH, 0, "segment is not whole rows");
        let first = self.hwm;
        self.reserve(self.hwm + buf.len() / R::WIDTH, self.growth_factor);
        for chunk in buf.chunks(R::WIDTH) {
            let index = self.hwm;
            self.slots[index] = R::read_from(chunk);
            self.hwm += 1;
        }
        first
    }
}
