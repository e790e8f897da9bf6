//! Deterministic greedy rebalancing of shard ownership.
//!
//! [`rebalance`] is a pure function of globally-summed inputs. Every process
//! runs it over identical data, so the resulting move list is bit-identical
//! everywhere and no further communication is needed to agree on it.

use std::collections::BTreeSet;

use tracing::debug;

use crate::types::{ProcessId, ShardId};

/// A single ownership change: `shard` is reassigned to `dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    /// The shard being reassigned.
    pub shard: ShardId,
    /// The process receiving it.
    pub dest: ProcessId,
}

/// Compute an ordered list of ownership moves equalizing per-process work.
///
/// `owners[shard]` is the current owner and `work[shard]` the per-shard work
/// figure, already summed identically across all processes. The algorithm
/// iteratively moves, from the busiest process to the laziest, the
/// largest-figure shard that does not overshoot past the midpoint of their
/// gap. Every accepted move of positive figure strictly shrinks the max-min
/// gap, so the loop terminates over the finite shard set.
///
/// With a single process there is nothing to balance and the list is empty.
pub fn rebalance(owners: &[ProcessId], work: &[f64], nproc: usize) -> Vec<Move> {
    assert_eq!(owners.len(), work.len(), "one work figure per shard");
    if nproc <= 1 {
        return Vec::new();
    }

    let mut totals = vec![0.0f64; nproc];
    // BTreeSet keeps shard iteration order identical on every process
    let mut owned: Vec<BTreeSet<ShardId>> = vec![BTreeSet::new(); nproc];
    for (shard, (&owner, &figure)) in owners.iter().zip(work).enumerate() {
        debug_assert!(figure >= 0.0, "work figures are non-negative");
        totals[owner] += figure;
        owned[owner].insert(shard);
    }
    let perfect = totals.iter().sum::<f64>() / nproc as f64;

    let mut moves = Vec::new();
    loop {
        // first-index tie-breaking keeps the selection deterministic
        let busiest = arg_extreme(&totals, |a, b| a > b);
        let laziest = arg_extreme(&totals, |a, b| a < b);
        if busiest == laziest {
            break;
        }
        // an extreme sitting exactly on the mean is taken to mean balance
        // was reached. the converse (that the other extreme is then also on
        // the mean) is not relied upon.
        if totals[busiest] == perfect || totals[laziest] == perfect {
            break;
        }
        debug_assert!(totals[busiest] > perfect, "busiest must sit above the mean");
        debug_assert!(totals[laziest] < perfect, "laziest must sit below the mean");

        // the largest move that does not overshoot past the midpoint of the
        // gap; anything larger would leave the destination busier than the
        // source was
        let limit = (totals[busiest] - totals[laziest]) / 2.0;
        let candidate = owned[busiest]
            .iter()
            .copied()
            .filter(|&shard| work[shard] <= limit)
            .max_by(|&a, &b| work[a].total_cmp(&work[b]));
        let shard = match candidate {
            Some(shard) => shard,
            None => break,
        };

        totals[busiest] -= work[shard];
        totals[laziest] += work[shard];
        owned[busiest].remove(&shard);
        owned[laziest].insert(shard);
        debug!(
            shard,
            from = busiest,
            to = laziest,
            figure = work[shard],
            "rebalancer move"
        );
        moves.push(Move {
            shard,
            dest: laziest,
        });
    }
    moves
}

/// Index of the first element winning all pairwise comparisons.
fn arg_extreme(values: &[f64], better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if better(v, values[best]) {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Per-process totals after applying `moves` to the initial ownership.
    fn totals_after(owners: &[ProcessId], work: &[f64], nproc: usize, moves: &[Move]) -> Vec<f64> {
        let mut owners = owners.to_vec();
        for m in moves {
            owners[m.shard] = m.dest;
        }
        let mut totals = vec![0.0; nproc];
        for (shard, &owner) in owners.iter().enumerate() {
            totals[owner] += work[shard];
        }
        totals
    }

    fn gap(totals: &[f64]) -> f64 {
        let max = totals.iter().cloned().fold(f64::MIN, f64::max);
        let min = totals.iter().cloned().fold(f64::MAX, f64::min);
        max - min
    }

    #[test]
    fn test_single_process_is_noop() {
        let owners = vec![0; 8];
        let work = vec![5.0; 8];
        assert!(rebalance(&owners, &work, 1).is_empty());
    }

    #[test]
    fn test_balanced_input_is_noop() {
        // two processes, identical totals
        let owners = vec![0, 0, 1, 1];
        let work = vec![3.0, 7.0, 4.0, 6.0];
        assert!(rebalance(&owners, &work, 2).is_empty());
    }

    #[test]
    fn test_all_zero_figures_is_noop() {
        let owners = vec![0, 1, 0, 1];
        let work = vec![0.0; 4];
        assert!(rebalance(&owners, &work, 2).is_empty());
    }

    #[test]
    fn test_largest_qualifying_shard_moves() {
        // process 0 owns everything; the midpoint limit is 35, so the
        // 30-figure shard qualifies but the 40-figure shard does not
        let owners = vec![0, 0];
        let work = vec![30.0, 40.0];
        let moves = rebalance(&owners, &work, 2);
        assert_eq!(
            moves,
            vec![Move { shard: 0, dest: 1 }],
            "expected the largest shard under the midpoint to move first"
        );
    }

    #[test]
    fn test_hot_shard_scenario_reduces_gap() {
        // 4 processes, 24 shards round-robin (6 each); shard 0 carries 100,
        // all others 10. the hot shard itself exceeds every midpoint, so
        // lighter shards flow off the overloaded process instead.
        let nproc = 4;
        let owners: Vec<ProcessId> = (0..24).map(|shard| shard % nproc).collect();
        let mut work = vec![10.0; 24];
        work[0] = 100.0;

        let moves = rebalance(&owners, &work, nproc);
        assert!(!moves.is_empty());
        // every move sheds load from the overloaded process toward a
        // process that was the least loaded when the move was chosen
        for m in &moves {
            assert_ne!(m.dest, 0, "no load should flow onto the hot process");
        }

        let before = totals_after(&owners, &work, nproc, &[]);
        let after = totals_after(&owners, &work, nproc, &moves);
        assert!(
            gap(&after) < gap(&before),
            "max-min gap must strictly shrink: {} -> {}",
            gap(&before),
            gap(&after)
        );
    }

    #[test]
    fn test_deterministic_over_repeated_runs() {
        let owners: Vec<ProcessId> = (0..30).map(|shard| shard % 3).collect();
        let work: Vec<f64> = (0..30).map(|shard| ((shard * 31) % 17) as f64).collect();

        let first = rebalance(&owners, &work, 3);
        for _ in 0..5 {
            assert_eq!(rebalance(&owners, &work, 3), first);
        }
    }

    #[test]
    fn test_terminates_with_zero_weight_shards() {
        // zero-figure shards qualify under any positive limit but never
        // change the totals; the loop must still exhaust and stop
        let owners = vec![0, 0, 0, 1];
        let work = vec![100.0, 0.0, 0.0, 0.0];
        let moves = rebalance(&owners, &work, 2);
        // the 100-figure shard can never move (limit is at most 50)
        assert!(moves.iter().all(|m| m.shard != 0));
    }
}
