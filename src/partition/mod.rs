//! Shard ownership: the fixed partition map and the deterministic
//! rebalancing algorithm that mutates it.

pub mod map;
pub mod rebalance;

pub use map::PartitionMap;
pub use rebalance::{rebalance, Move};
