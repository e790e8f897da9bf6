//! Multi-rank tests of the full redistribution cycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ExchangeConfig, MeshConfig, StorageConfig};
use crate::distributed::table::DistributedTable;
use crate::exchange::collectives::{Collectives, LocalGroup};
use crate::testing::{init_tracing, run_ranks, KvRow};

fn config() -> MeshConfig {
    MeshConfig::new(4)
        .with_storage(StorageConfig::default().with_init_capacity(32))
        .with_exchange(ExchangeConfig::default().with_init_capacity_per_peer(4))
}

fn table(config: MeshConfig, comm: &LocalGroup) -> DistributedTable<KvRow> {
    DistributedTable::new(config, comm).unwrap()
}

/// The first `n` keys (scanning upward from 1) owned by this process.
fn owned_keys(table: &DistributedTable<KvRow>, n: usize) -> Vec<u64> {
    (1u64..)
        .filter(|key| table.partition().owner_of(key) == table.rank())
        .take(n)
        .collect()
}

#[test]
fn test_skewed_work_rebalances_and_preserves_ownership() {
    init_tracing();
    let results = run_ranks(3, |comm| {
        let mut t = table(config(), comm);
        for key in owned_keys(&t, 20) {
            t.insert(KvRow {
                key,
                value: key as i64 * 7,
            })
            .unwrap();
            // rank 0 is ten times busier than the others
            let cost = if comm.rank() == 0 { 10.0 } else { 1.0 };
            t.accumulate_work_figure(&key, cost);
        }

        let moves = t.redistribute(comm).unwrap();
        (moves, t.verify_ownership(), t.occupied_count())
    });

    let (ref moves, _, _) = results[0];
    assert!(!moves.is_empty(), "the skew must trigger moves");
    for (rank_moves, ownership_ok, _) in &results {
        // the move list is computed from globally-summed figures, so every
        // rank must arrive at the identical list
        assert_eq!(rank_moves, moves);
        assert!(ownership_ok, "a held row maps to a foreign shard");
    }
    let total: usize = results.iter().map(|(_, _, count)| count).sum();
    assert_eq!(total, 60, "rows lost or duplicated in transit");
}

#[test]
fn test_values_survive_migration() {
    let results = run_ranks(2, |comm| {
        let mut t = table(config(), comm);
        let mut rng = StdRng::seed_from_u64(comm.rank() as u64);
        let mut before = Vec::new();
        for key in owned_keys(&t, 15) {
            let value = rng.gen_range(-1000..1000);
            t.insert(KvRow { key, value }).unwrap();
            t.accumulate_work_figure(&key, if comm.rank() == 0 { 5.0 } else { 1.0 });
            before.push((key, value));
        }

        t.redistribute(comm).unwrap();
        let after: Vec<(u64, i64)> = t
            .store()
            .occupied()
            .map(|(_, row)| (row.key, row.value))
            .collect();
        (before, after)
    });

    let mut before: Vec<_> = results.iter().flat_map(|(b, _)| b.clone()).collect();
    let mut after: Vec<_> = results.iter().flat_map(|(_, a)| a.clone()).collect();
    before.sort_unstable();
    after.sort_unstable();
    assert_eq!(before, after, "payloads must survive migration bit-for-bit");
}

#[test]
fn test_second_redistribute_is_noop() {
    let results = run_ranks(3, |comm| {
        let mut t = table(config(), comm);
        for key in owned_keys(&t, 10) {
            t.insert(KvRow { key, value: 1 }).unwrap();
            t.accumulate_work_figure(&key, (comm.rank() + 1) as f64 * 3.0);
        }

        t.redistribute(comm).unwrap();
        let occupied = t.occupied_count();
        // figures were reset, so a second pass sees a fully balanced (all
        // zero) workload and must not move anything
        let second = t.redistribute(comm).unwrap();
        (second.is_empty(), occupied == t.occupied_count())
    });
    for (no_moves, unchanged) in results {
        assert!(no_moves);
        assert!(unchanged);
    }
}

#[test]
fn test_protection_migrates_with_row() {
    init_tracing();
    let results = run_ranks(2, |comm| {
        // 2 shards per process over 2 ranks: rank 0 owns exactly two shards
        let mut t = table(config().with_shards_per_process(2), comm);

        // two rank-0 keys in distinct shards; key_a's shard gets the lighter
        // figure, so it alone fits under the rebalancer's midpoint limit and
        // is the shard that migrates
        let mut scan = (1u64..).filter(|key| t.partition().owner_of(key) == 0);
        let key_a = scan.next().unwrap();
        let shard_a = t.partition().shard_of(&key_a);
        let key_b = scan
            .find(|key| t.partition().shard_of(key) != shard_a)
            .unwrap();

        if comm.rank() == 0 {
            let index = t.insert(KvRow { key: key_a, value: 1 }).unwrap();
            t.protect(index);
            t.protect(index);
            t.insert(KvRow { key: key_b, value: 2 }).unwrap();
        }
        t.accumulate_work_figure(&key_a, if comm.rank() == 0 { 8.0 } else { 0.0 });
        t.accumulate_work_figure(&key_b, if comm.rank() == 0 { 12.0 } else { 0.0 });

        let moves = t.redistribute(comm).unwrap();
        let level = t
            .lookup(&key_a)
            .map(|index| t.protection_level(index));
        (moves.len(), level, t.lookup(&key_b).is_some())
    });

    assert_eq!(results[0].0, 1, "exactly one shard fits under the limit");
    // the protected row left rank 0 and arrived on rank 1 with both holds
    assert_eq!(results[0].1, None);
    assert_eq!(results[1].1, Some(2));
    // the heavy shard stayed put
    assert!(results[0].2);
    assert!(!results[1].2);
}

#[test]
fn test_single_rank_is_noop() {
    let results = run_ranks(1, |comm| {
        let mut t = table(config(), comm);
        for key in owned_keys(&t, 10) {
            t.insert(KvRow { key, value: 0 }).unwrap();
            t.accumulate_work_figure(&key, 100.0);
        }
        let moves = t.redistribute(comm).unwrap();
        (moves.is_empty(), t.occupied_count())
    });
    assert_eq!(results[0], (true, 10));
}

#[test]
fn test_dependents_notified_once_per_redistribution() {
    let results = run_ranks(2, |comm| {
        let mut t = table(config(), comm);
        let notifications = Arc::new(AtomicUsize::new(0));
        let guard = {
            let notifications = Arc::clone(&notifications);
            t.subscribe_dependent(move || {
                notifications.fetch_add(1, Ordering::SeqCst);
            })
        };

        t.redistribute(comm).unwrap();
        t.redistribute(comm).unwrap();
        let while_subscribed = notifications.load(Ordering::SeqCst);

        drop(guard);
        t.redistribute(comm).unwrap();
        (while_subscribed, notifications.load(Ordering::SeqCst))
    });
    for (while_subscribed, after_drop) in results {
        assert_eq!(while_subscribed, 2);
        assert_eq!(after_drop, 2, "dropped guard must stop notifications");
    }
}

#[test]
fn test_work_figures_reset_after_redistribute() {
    let results = run_ranks(2, |comm| {
        let mut t = table(config(), comm);
        let keys = owned_keys(&t, 5);
        for key in &keys {
            t.insert(KvRow { key: *key, value: 0 }).unwrap();
            t.accumulate_work_figure(key, 4.0);
        }
        t.redistribute(comm).unwrap();
        (0..t.partition().n_shards()).map(|s| t.work_figure(s)).sum::<f64>()
    });
    assert_eq!(results, vec![0.0, 0.0]);
}
