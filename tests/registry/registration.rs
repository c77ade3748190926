//! Registration Tests
//!
//! Durable write, cache update, guid stability, and failure visibility.

use crate::common::*;
use shardreg::{
    Cache, ConcurrentCache, RecordGuid, RecordKey, RegistryConfig, RetryingExecutor, ShardRegistry,
    StateStore,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn identical_registration_twice_leaves_one_record_and_one_cache_entry() {
    let store = Arc::new(FlakyStore::new());
    let cache = Arc::new(ConcurrentCache::<ShardInstance, ShardState>::new());
    let registry = ShardRegistry::builder()
        .store(store.clone())
        .executor(Arc::new(RetryingExecutor::new(fast_retry(3))))
        .state_cache(cache.clone())
        .build()
        .unwrap();

    let floc = Floc::new([workspace()], 1);
    let s = state(&floc, 0, "solr-1", 42, NOW);
    registry.register_shard_state(&s).unwrap();
    registry.register_shard_state(&s).unwrap();

    assert_eq!(store.guids(shardreg::SHARD_STATE_NAMESPACE).len(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&s.shard_instance), Some(s));
}

#[test]
fn new_report_wholly_replaces_previous_one() {
    let cache = Arc::new(ConcurrentCache::<ShardInstance, ShardState>::new());
    let registry = ShardRegistry::builder()
        .store(Arc::new(FlakyStore::new()))
        .executor(Arc::new(RetryingExecutor::new(fast_retry(3))))
        .state_cache(cache.clone())
        .build()
        .unwrap();

    let floc = Floc::new([workspace()], 1);
    let first = state(&floc, 0, "solr-1", 500, NOW).with_property("role", "master");
    let second = state(&floc, 0, "solr-1", 400, NOW + 1);
    registry.register_shard_state(&first).unwrap();
    registry.register_shard_state(&second).unwrap();

    // No max-merging and no property carry-over.
    let cached = cache.get(&first.shard_instance).unwrap();
    assert_eq!(cached, second);
    assert!(cached.properties.is_empty());
}

// ============================================================================
// Guid stability
// ============================================================================

#[test]
fn guid_survives_a_registry_restart() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace()], 1);
    t.register(&state(&floc, 0, "solr-1", 1, NOW));
    let guids_before = t.store.guids(shardreg::SHARD_STATE_NAMESPACE);

    let restarted = TestRegistry::over_store(t.store.clone(), RegistryConfig::default());
    restarted.register(&state(&floc, 0, "solr-1", 2, NOW));

    assert_eq!(t.store.guids(shardreg::SHARD_STATE_NAMESPACE), guids_before);
}

#[test]
fn distinct_instances_get_distinct_records() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace()], 2);
    t.register(&state(&floc, 0, "solr-1", 1, NOW));
    t.register(&state(&floc, 0, "solr-2", 1, NOW));
    t.register(&state(&floc, 1, "solr-1", 1, NOW));
    assert_eq!(t.record_count(), 3);
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn registration_makes_floc_known() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace(), archive()], 4);
    t.register(&state(&floc, 0, "solr-1", 1, NOW));
    assert_eq!(t.registry.known_flocs(), vec![floc]);
}

#[test]
fn store_order_does_not_split_flocs() {
    let t = TestRegistry::new();
    let a = Floc::new([workspace(), archive()], 1);
    let b = Floc::new([archive(), workspace()], 1);
    t.register(&state(&a, 0, "solr-1", 1, NOW));
    t.register(&state(&b, 0, "solr-2", 1, NOW));
    assert_eq!(t.registry.known_flocs().len(), 1);
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn transient_put_failures_are_retried() {
    let t = TestRegistry::new();
    t.store.fail_next_puts(2);
    let floc = Floc::new([workspace()], 1);
    t.register(&state(&floc, 0, "solr-1", 1, NOW));

    assert_eq!(t.store.put_calls.load(Ordering::SeqCst), 3);
    assert_eq!(t.record_count(), 1);
}

#[test]
fn exhausted_retries_leave_no_visible_state() {
    let t = TestRegistry::new();
    t.store.fail_next_puts(10);
    let floc = Floc::new([workspace()], 1);

    let err = t
        .registry
        .register_shard_state(&state(&floc, 0, "solr-1", 1, NOW))
        .unwrap_err();
    assert!(matches!(err, shardreg::Error::PersistenceFailure { .. }));
    assert!(err.is_retryable());

    assert_eq!(t.record_count(), 0);
    assert!(t.registry.known_flocs().is_empty());
    assert_eq!(t.registry.metrics().registrations, 0);
    let err = t
        .registry
        .get_index_slice(&stores(&[workspace()]))
        .unwrap_err();
    assert!(err.is_no_match());
}

#[test]
fn failed_registration_can_be_retried_by_caller() {
    let t = TestRegistry::new();
    t.store.fail_next_puts(3);
    let floc = Floc::new([workspace()], 1);
    let s = state(&floc, 0, "solr-1", 1, NOW);

    assert!(t.registry.register_shard_state(&s).is_err());
    t.register(&s);
    assert_eq!(t.record_count(), 1);
    assert_eq!(t.registry.metrics().registrations, 1);
}

#[test]
fn guid_assigned_by_failed_attempt_is_reused() {
    let store = Arc::new(FlakyStore::new());
    let guids = Arc::new(ConcurrentCache::<ShardInstance, RecordGuid>::new());
    let registry = ShardRegistry::builder()
        .store(store.clone())
        .executor(Arc::new(RetryingExecutor::new(fast_retry(2))))
        .guid_cache(guids.clone())
        .build()
        .unwrap();
    let floc = Floc::new([workspace()], 1);
    let s = state(&floc, 0, "solr-1", 1, NOW);

    store.fail_next_puts(2);
    assert!(registry.register_shard_state(&s).is_err());
    // The only trace of the failed call.
    let assigned = guids.get(&s.shard_instance).unwrap();
    assert!(store.guids(shardreg::SHARD_STATE_NAMESPACE).is_empty());

    registry.register_shard_state(&s).unwrap();
    assert_eq!(store.guids(shardreg::SHARD_STATE_NAMESPACE), vec![assigned]);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn zero_shard_floc_is_rejected_before_any_write() {
    let t = TestRegistry::new();
    let empty = Floc::new([workspace()], 0);

    let err = t
        .registry
        .register_shard_state(&state(&empty, 0, "solr-1", 1, NOW))
        .unwrap_err();
    assert!(matches!(err, shardreg::Error::InvalidShardState(_)));
    assert!(!err.is_retryable());

    assert_eq!(t.store.put_calls.load(Ordering::SeqCst), 0);
    assert_eq!(t.record_count(), 0);
    assert!(t.registry.known_flocs().is_empty());
    assert!(t
        .registry
        .get_index_slice(&stores(&[workspace()]))
        .unwrap_err()
        .is_no_match());
}

#[test]
fn out_of_range_ordinal_is_rejected_before_any_write() {
    let t = TestRegistry::new();
    let floc = Floc::new([workspace()], 2);

    let err = t
        .registry
        .register_shard_state(&state(&floc, 2, "solr-1", 1, NOW))
        .unwrap_err();
    assert!(matches!(err, shardreg::Error::InvalidShardState(_)));
    assert_eq!(t.store.put_calls.load(Ordering::SeqCst), 0);
    assert_eq!(t.record_count(), 0);
    assert!(t.registry.known_flocs().is_empty());
}

#[test]
fn zero_shard_record_in_store_never_yields_an_empty_slice() {
    let t = TestRegistry::new();
    let empty = Floc::new([workspace()], 0);
    t.store
        .put(
            &RecordKey::new(shardreg::SHARD_STATE_NAMESPACE, RecordGuid::generate()),
            &state(&empty, 0, "solr-1", 1, NOW).to_bytes().unwrap(),
        )
        .unwrap();

    let err = t
        .registry
        .get_index_slice(&stores(&[workspace()]))
        .unwrap_err();
    assert!(err.is_no_match());

    // A real floc over the same stores is still served.
    let floc = Floc::new([workspace()], 1);
    t.register(&state(&floc, 0, "solr-2", 1, NOW));
    let slice = t.registry.get_index_slice(&stores(&[workspace()])).unwrap();
    assert_eq!(slice, vec![instance(&floc, 0, "solr-2")]);
}
