//! Inter-process communication: collective primitives and the batched bulk
//! row transfer built on them.

pub mod bulk;
pub mod collectives;

pub use bulk::BulkExchangePair;
pub use collectives::{Collectives, LocalGroup};
