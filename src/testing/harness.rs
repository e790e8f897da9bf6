//! Multi-rank test harness: a minimal row type and a thread-per-rank runner.

use crate::exchange::collectives::LocalGroup;
use crate::types::{FixedWidth, Row};

/// A minimal fixed-width row for tests and examples: a `u64` key and an
/// `i64` payload. Key zero marks a free slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KvRow {
    pub key: u64,
    pub value: i64,
}

impl FixedWidth for KvRow {
    const WIDTH: usize = 16;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.key.to_le_bytes());
        buf[8..16].copy_from_slice(&self.value.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut key = [0u8; 8];
        let mut value = [0u8; 8];
        key.copy_from_slice(&buf[..8]);
        value.copy_from_slice(&buf[8..16]);
        Self {
            key: u64::from_le_bytes(key),
            value: i64::from_le_bytes(value),
        }
    }
}

impl Row for KvRow {
    type Key = u64;

    fn key(&self) -> &u64 {
        &self.key
    }

    fn is_free(&self) -> bool {
        self.key == 0
    }
}

/// Run `f` once per rank on its own thread over a fresh [`LocalGroup`] of
/// `n_ranks`, returning the per-rank results in rank order.
///
/// A panic on any rank propagates, so collective deadlocks surface as test
/// failures rather than hangs.
pub fn run_ranks<T, F>(n_ranks: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&LocalGroup) -> T + Send + Sync,
{
    let endpoints = LocalGroup::new(n_ranks);
    std::thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = endpoints
            .iter()
            .map(|comm| scope.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Install a test-writer tracing subscriber honoring `RUST_LOG`. Safe to
/// call from every test; only the first call wins.
#[cfg(test)]
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
