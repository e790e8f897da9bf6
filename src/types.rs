//! Core types and traits shared across the crate.

use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

/// Index of a cooperating process within the group.
pub type ProcessId = usize;

/// Index of a shard: a fixed-granularity unit of the key space, smaller than
/// one process's full partition, used as the atomic unit of migration.
pub type ShardId = usize;

/// Hash a byte slice with the crate-standard seed.
///
/// Every process must compute identical hashes for identical keys, so shard
/// assignment always uses this function (directly or via [`Key::hash64`]).
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// A hashable row key.
///
/// The hash drives shard assignment and hash-index bucketing, and therefore
/// must be identical on every process for a given key value.
pub trait Key: Clone + Eq + Debug {
    /// Compute the 64-bit hash of this key.
    fn hash64(&self) -> u64;
}

impl Key for u64 {
    fn hash64(&self) -> u64 {
        hash_bytes(&self.to_le_bytes())
    }
}

/// A value with a fixed-width binary representation.
///
/// Rows cross process boundaries only through this codec; the byte counts and
/// displacements of the bulk exchange are all multiples of `WIDTH`.
pub trait FixedWidth: Sized {
    /// Exact encoded size in bytes.
    const WIDTH: usize;

    /// Write the encoding into `buf`, which is exactly `WIDTH` bytes long.
    fn write_to(&self, buf: &mut [u8]);

    /// Decode from `buf`, which is exactly `WIDTH` bytes long.
    fn read_from(buf: &[u8]) -> Self;
}

/// A fixed-width record with one distinguished, hashable key field.
///
/// The `Default` row is the free slot; [`Row::is_free`] must be true for it
/// and false for any row holding a real key.
pub trait Row: FixedWidth + Default + Clone + PartialEq + Debug {
    /// The key field type.
    type Key: Key;

    /// The key identifying this row.
    fn key(&self) -> &Self::Key;

    /// Whether this row is a free slot (zero/empty key).
    fn is_free(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_deterministic() {
        assert_eq!(hash_bytes(b"shard-key"), hash_bytes(b"shard-key"));
        assert_ne!(hash_bytes(b"a"), hash_bytes(b"b"));
    }

    #[test]
    fn test_u64_key_hash_matches_bytes() {
        let key = 0xDEAD_BEEFu64;
        assert_eq!(key.hash64(), hash_bytes(&key.to_le_bytes()));
    }
}
