//! Slice Selection Tests
//!
//! Staleness exclusion, replica admission, floc scoring, and completeness.

use crate::common::*;
use shardreg::{RegistryConfig, ShardRegistry};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::Ordering;
use std::time::Duration;

const SECOND: i64 = 1_000;

// ============================================================================
// Completeness
// ============================================================================

#[test]
fn slice_has_exactly_one_instance_per_shard() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace()], 3);
    for shard in 0..3 {
        for host in ["solr-1", "solr-2"] {
            t.register(&state(&floc, shard, host, 100, NOW));
        }
    }

    let slice = t.registry.get_index_slice(&stores(&[workspace()])).unwrap();
    let ordinals: Vec<u32> = slice.iter().map(|i| i.shard.instance).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
    assert!(slice.iter().all(|i| i.shard.floc == floc));
}

#[test]
fn missing_shard_is_an_error_not_a_short_slice() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace()], 3);
    t.register(&state(&floc, 0, "solr-1", 100, NOW));
    t.register(&state(&floc, 2, "solr-1", 100, NOW));

    match t.registry.get_index_slice(&stores(&[workspace()])) {
        Err(shardreg::Error::IncompleteSlice { floc: f, missing_shards }) => {
            assert_eq!(f, floc);
            assert_eq!(missing_shards, vec![1]);
        }
        other => panic!("expected IncompleteSlice, got {:?}", other),
    }
}

#[test]
fn empty_constraints_match_any_floc() {
    let t = TestRegistry::new();
    let floc = Floc::new([archive()], 1);
    t.register(&state(&floc, 0, "solr-1", 1, NOW));
    let slice = t.registry.get_index_slice(&BTreeSet::new()).unwrap();
    assert_eq!(slice.len(), 1);
}

// ============================================================================
// Staleness
// ============================================================================

#[test]
fn report_older_than_timeout_is_excluded() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace()], 1);
    t.register(&state(&floc, 0, "dead", 5_000, NOW - 301 * SECOND));
    t.register(&state(&floc, 0, "alive", 10, NOW - 299 * SECOND));

    for _ in 0..50 {
        let slice = t.registry.get_index_slice(&stores(&[workspace()])).unwrap();
        assert_eq!(slice[0].host, "alive");
    }
    // Excluded from the read, not from storage.
    assert_eq!(t.record_count(), 2);
}

#[test]
fn stale_replica_does_not_raise_the_lag_bar() {
    let t = TestRegistry::with_config(RegistryConfig::default().with_max_replica_tx_difference(10));
    let floc = Floc::new([workspace()], 1);
    // A dead replica far ahead must not disqualify the live ones.
    t.register(&state(&floc, 0, "dead", 1_000_000, NOW - 301 * SECOND));
    t.register(&state(&floc, 0, "alive", 100, NOW));

    let slice = t.registry.get_index_slice(&stores(&[workspace()])).unwrap();
    assert_eq!(slice[0].host, "alive");
}

#[test]
fn instance_goes_stale_as_time_passes() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace()], 1);
    t.register(&state(&floc, 0, "solr-1", 1, NOW));
    assert!(t.registry.get_index_slice(&stores(&[workspace()])).is_ok());

    t.clock.advance(Duration::from_secs(301));
    let err = t
        .registry
        .get_index_slice(&stores(&[workspace()]))
        .unwrap_err();
    assert!(matches!(err, shardreg::Error::IncompleteSlice { .. }));

    // A fresh report brings it back.
    t.register(&state(&floc, 0, "solr-1", 2, NOW + 301 * SECOND));
    assert!(t.registry.get_index_slice(&stores(&[workspace()])).is_ok());
}

#[test]
fn custom_timeout_is_honoured() {
    let t = TestRegistry::with_config(RegistryConfig::default().with_instance_timeout_secs(10));
    let floc = Floc::new([workspace()], 1);
    t.register(&state(&floc, 0, "solr-1", 1, NOW - 11 * SECOND));
    assert!(t.registry.get_index_slice(&stores(&[workspace()])).is_err());
}

// ============================================================================
// Replica admission
// ============================================================================

fn hosts_seen(t: &TestRegistry, rounds: usize) -> HashSet<String> {
    (0..rounds)
        .map(|_| {
            t.registry
                .get_index_slice(&stores(&[workspace()]))
                .unwrap()[0]
                .host
                .clone()
        })
        .collect()
}

fn lagging_replicas(t: &TestRegistry) {
    let floc = Floc::new([workspace()], 1);
    t.register(&state(&floc, 0, "tx-100", 100, NOW));
    t.register(&state(&floc, 0, "tx-950", 950, NOW));
    t.register(&state(&floc, 0, "tx-1000", 1000, NOW));
}

#[test]
fn all_replicas_within_difference_are_admitted() {
    let t = TestRegistry::with_config(RegistryConfig::default().with_max_replica_tx_difference(1000));
    lagging_replicas(&t);
    let expected: HashSet<String> = ["tx-100", "tx-950", "tx-1000"].iter().map(|s| s.to_string()).collect();
    assert_eq!(hosts_seen(&t, 300), expected);
}

#[test]
fn replica_beyond_difference_is_never_picked() {
    let t = TestRegistry::with_config(RegistryConfig::default().with_max_replica_tx_difference(500));
    lagging_replicas(&t);
    let expected: HashSet<String> = ["tx-950", "tx-1000"].iter().map(|s| s.to_string()).collect();
    assert_eq!(hosts_seen(&t, 300), expected);
}

#[test]
fn same_seed_gives_same_choices() {
    let config = RegistryConfig::default().with_selection_seed(7);
    let first = TestRegistry::with_config(config.clone());
    let second = TestRegistry::with_config(config);
    let floc = Floc::new([workspace()], 2);
    for t in [&first, &second] {
        for shard in 0..2 {
            for host in ["a", "b", "c"] {
                t.register(&state(&floc, shard, host, 10, NOW));
            }
        }
    }

    for _ in 0..20 {
        assert_eq!(
            first.registry.get_index_slice(&stores(&[workspace()])).unwrap(),
            second.registry.get_index_slice(&stores(&[workspace()])).unwrap()
        );
    }
}

// ============================================================================
// Floc scoring
// ============================================================================

#[test]
fn fresher_floc_wins() {
    let t = TestRegistry::new();
    let a = Floc::new([workspace()], 2);
    let c = Floc::new([workspace(), archive()], 2);
    for shard in 0..2 {
        t.register(&state(&a, shard, "a", 500, NOW));
        t.register(&state(&c, shard, "c", 900, NOW));
    }

    for _ in 0..10 {
        let slice = t.registry.get_index_slice(&stores(&[workspace()])).unwrap();
        assert!(slice.iter().all(|i| i.shard.floc == c));
    }
}

#[test]
fn equal_scores_still_give_a_consistent_slice() {
    let t = TestRegistry::new();
    let a = Floc::new([workspace()], 2);
    let b = Floc::new([workspace(), archive()], 2);
    t.register(&state(&a, 0, "a", 500, NOW));
    t.register(&state(&a, 1, "a", 500, NOW));
    t.register(&state(&b, 0, "b", 900, NOW));
    t.register(&state(&b, 1, "b", 100, NOW));

    // Either floc may win; the slice must come wholly from the winner.
    let slice = t.registry.get_index_slice(&stores(&[workspace()])).unwrap();
    assert_eq!(slice.len(), 2);
    let winner = &slice[0].shard.floc;
    assert!(*winner == a || *winner == b);
    assert!(slice.iter().all(|i| &i.shard.floc == winner));
}

#[test]
fn constraints_restrict_candidate_flocs() {
    let t = TestRegistry::new();
    let ws_only = Floc::new([workspace()], 1);
    let both = Floc::new([workspace(), archive()], 1);
    t.register(&state(&ws_only, 0, "fresh", 10_000, NOW));
    t.register(&state(&both, 0, "older", 10, NOW));

    let slice = t
        .registry
        .get_index_slice(&stores(&[workspace(), archive()]))
        .unwrap();
    assert_eq!(slice[0].host, "older");
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn unknown_stores_yield_no_match_after_a_rescan() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace()], 1);
    t.register(&state(&floc, 0, "solr-1", 1, NOW));

    let scans_before = t.store.scan_calls.load(Ordering::SeqCst);
    let err = t
        .registry
        .get_index_slice(&stores(&[archive()]))
        .unwrap_err();
    assert!(err.is_no_match());
    assert_eq!(t.store.scan_calls.load(Ordering::SeqCst), scans_before + 1);
}

#[test]
fn fresh_registry_discovers_flocs_from_store() {
    let writer = TestRegistry::new();
    let floc = Floc::new([workspace()], 2);
    writer.register(&state(&floc, 0, "solr-1", 1, NOW));
    writer.register(&state(&floc, 1, "solr-2", 1, NOW));

    let reader = TestRegistry::over_store(writer.store.clone(), RegistryConfig::default());
    assert!(reader.registry.known_flocs().is_empty());

    let slice = reader.registry.get_index_slice(&stores(&[workspace()])).unwrap();
    assert_eq!(slice.len(), 2);
    assert_eq!(reader.registry.known_flocs(), vec![floc]);
}

#[test]
fn warm_reads_do_not_touch_the_store() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace()], 1);
    t.register(&state(&floc, 0, "solr-1", 1, NOW));

    let scans_before = t.store.scan_calls.load(Ordering::SeqCst);
    for _ in 0..10 {
        t.registry.get_index_slice(&stores(&[workspace()])).unwrap();
    }
    assert_eq!(t.store.scan_calls.load(Ordering::SeqCst), scans_before);
}

#[test]
fn in_memory_registry_serves_slices() {
    let registry = ShardRegistry::in_memory(RegistryConfig::default()).unwrap();
    let floc = Floc::new([workspace()], 1);
    let now = chrono::Utc::now().timestamp_millis();
    registry
        .register_shard_state(&state(&floc, 0, "solr-1", 1, now))
        .unwrap();
    assert_eq!(
        registry.get_index_slice(&stores(&[workspace()])).unwrap(),
        vec![instance(&floc, 0, "solr-1")]
    );
}
