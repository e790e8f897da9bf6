//! Synchronous collective primitives.
//!
//! Every collective must be issued by every process in the same logical step
//! and the same relative order; this is a hard calling contract. A process
//! that skips a collective stalls the whole group — there is no timeout,
//! cancellation, or partial-completion path.

use std::sync::{Arc, Barrier};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{CollectiveError, Result};
use crate::types::ProcessId;

/// The collective operations the distributed table is built on.
///
/// Implementations must be deterministic: given identical contributions in
/// identical order, every rank computes bit-identical results.
pub trait Collectives {
    /// This process's rank within the group.
    fn rank(&self) -> ProcessId;

    /// Number of cooperating processes.
    fn n_ranks(&self) -> usize;

    /// Element-wise sum of `local` across all ranks; every rank receives the
    /// same result vector.
    fn all_reduce_sum(&self, local: &[f64]) -> Result<Vec<f64>>;

    /// Scalar all-to-all: `send[i]` goes to rank `i`, and element `j` of the
    /// result came from rank `j`. `send` must have one slot per rank.
    fn all_to_all(&self, send: &[u64]) -> Result<Vec<u64>>;

    /// Variable-length all-to-all: segment `i` of the input goes to rank
    /// `i`, and segment `j` of the result came from rank `j`.
    fn all_to_all_bytes(&self, segments: Vec<Bytes>) -> Result<Vec<Bytes>>;

    /// Logical-AND reduction of a local verdict. Returns true only when
    /// every rank voted true, so no rank silently proceeds while a peer is
    /// about to abort.
    fn all_agree(&self, vote: bool) -> Result<bool>;
}

#[derive(Default)]
struct Slots {
    floats: Vec<Vec<f64>>,
    scalars: Vec<Vec<u64>>,
    bytes: Vec<Vec<Bytes>>,
    votes: Vec<bool>,
}

struct Shared {
    n: usize,
    barrier: Barrier,
    slots: Mutex<Slots>,
}

/// In-process implementation of [`Collectives`] for a group of cooperating
/// threads, one endpoint per rank.
///
/// Intended both for embedders that run their ranks as threads within one OS
/// process and as the test vehicle for everything built on the trait. Each
/// collective is a write-all, barrier, read-all, barrier sequence; results
/// are computed from the gathered contributions in rank order on every
/// endpoint, which makes floating-point reductions bit-identical everywhere.
pub struct LocalGroup {
    rank: ProcessId,
    shared: Arc<Shared>,
}

impl LocalGroup {
    /// Create the endpoints for a group of `n_ranks` processes. The endpoint
    /// at position `i` is rank `i`.
    pub fn new(n_ranks: usize) -> Vec<LocalGroup> {
        assert!(n_ranks > 0, "a group needs at least one rank");
        let shared = Arc::new(Shared {
            n: n_ranks,
            barrier: Barrier::new(n_ranks),
            slots: Mutex::new(Slots {
                floats: vec![Vec::new(); n_ranks],
                scalars: vec![Vec::new(); n_ranks],
                bytes: vec![Vec::new(); n_ranks],
                votes: vec![false; n_ranks],
            }),
        });
        (0..n_ranks)
            .map(|rank| LocalGroup {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// One collective round: publish the local contribution, wait for all
    /// ranks, read the gathered state, then wait again so no rank starts the
    /// next round while another is still reading.
    fn round<T>(&self, write: impl FnOnce(&mut Slots), read: impl FnOnce(&Slots) -> T) -> T {
        {
            let mut slots = self.shared.slots.lock();
            write(&mut slots);
        }
        self.shared.barrier.wait();
        let out = {
            let slots = self.shared.slots.lock();
            read(&slots)
        };
        self.shared.barrier.wait();
        out
    }
}

impl Collectives for LocalGroup {
    fn rank(&self) -> ProcessId {
        self.rank
    }

    fn n_ranks(&self) -> usize {
        self.shared.n
    }

    fn all_reduce_sum(&self, local: &[f64]) -> Result<Vec<f64>> {
        let len = local.len();
        let contribution = local.to_vec();
        self.round(
            |slots| slots.floats[self.rank] = contribution,
            |slots| {
                let mut sum = vec![0.0f64; len];
                for other in &slots.floats {
                    if other.len() != len {
                        return Err(CollectiveError::BadContribution {
                            expected: len,
                            got: other.len(),
                        }
                        .into());
                    }
                    for (acc, &v) in sum.iter_mut().zip(other) {
                        *acc += v;
                    }
                }
                Ok(sum)
            },
        )
    }

    fn all_to_all(&self, send: &[u64]) -> Result<Vec<u64>> {
        if send.len() != self.shared.n {
            return Err(CollectiveError::BadContribution {
                expected: self.shared.n,
                got: send.len(),
            }
            .into());
        }
        let contribution = send.to_vec();
        Ok(self.round(
            |slots| slots.scalars[self.rank] = contribution,
            |slots| {
                slots
                    .scalars
                    .iter()
                    .map(|from| from[self.rank])
                    .collect::<Vec<u64>>()
            },
        ))
    }

    fn all_to_all_bytes(&self, segments: Vec<Bytes>) -> Result<Vec<Bytes>> {
        if segments.len() != self.shared.n {
            return Err(CollectiveError::BadContribution {
                expected: self.shared.n,
                got: segments.len(),
            }
            .into());
        }
        Ok(self.round(
            |slots| slots.bytes[self.rank] = segments,
            |slots| {
                slots
                    .bytes
                    .iter()
                    .map(|from| from[self.rank].clone())
                    .collect::<Vec<Bytes>>()
            },
        ))
    }

    fn all_agree(&self, vote: bool) -> Result<bool> {
        Ok(self.round(
            |slots| slots.votes[self.rank] = vote,
            |slots| slots.votes.iter().all(|&v| v),
        ))
    }
}
