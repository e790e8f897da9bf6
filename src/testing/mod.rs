//! Test utilities: a minimal row type, a thread-per-rank harness, and the
//! multi-rank redistribution test suite.

pub mod harness;

pub use harness::{run_ranks, KvRow};

#[cfg(test)]
pub(crate) use harness::init_tracing;

#[cfg(test)]
mod redistribute_tests;
