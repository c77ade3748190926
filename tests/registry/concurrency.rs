//! Concurrency Tests
//!
//! Registrations and reads from many threads at once.

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn concurrent_registrations_of_distinct_instances() {
    const THREADS: u32 = 8;
    let t = Arc::new(TestRegistry::new());
    let floc = Floc::new([workspace()], THREADS);
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|shard| {
            let t = Arc::clone(&t);
            let floc = floc.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for tx in 0..20 {
                    t.register(&state(&floc, shard, "solr", tx, NOW));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(t.record_count(), THREADS as usize);
    assert_eq!(t.registry.metrics().registrations, u64::from(THREADS) * 20);
    let slice = t.registry.get_index_slice(&stores(&[workspace()])).unwrap();
    assert_eq!(slice.len(), THREADS as usize);
}

#[test]
fn concurrent_first_registration_of_one_instance_creates_one_record() {
    const THREADS: usize = 8;
    let t = Arc::new(TestRegistry::new());
    let floc = Floc::new([workspace()], 1);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let t = Arc::clone(&t);
            let floc = floc.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                t.register(&state(&floc, 0, "solr-1", i as u64, NOW));
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(t.record_count(), 1);
}

#[test]
fn readers_see_complete_slices_while_writers_report() {
    const WRITERS: u32 = 4;
    const READERS: usize = 4;
    let t = Arc::new(TestRegistry::new());
    let floc = Floc::new([workspace()], WRITERS);
    for shard in 0..WRITERS {
        t.register(&state(&floc, shard, "seed", 0, NOW));
    }
    let barrier = Arc::new(Barrier::new(WRITERS as usize + READERS));

    let mut handles = Vec::new();
    for shard in 0..WRITERS {
        let t = Arc::clone(&t);
        let floc = floc.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for tx in 1..=50 {
                t.register(&state(&floc, shard, "solr", tx, NOW));
            }
        }));
    }
    for _ in 0..READERS {
        let t = Arc::clone(&t);
        let floc = floc.clone();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..50 {
                let slice = t
                    .registry
                    .get_index_slice(&stores(&[workspace()]))
                    .unwrap();
                let ordinals: Vec<u32> = slice.iter().map(|i| i.shard.instance).collect();
                assert_eq!(ordinals, (0..WRITERS).collect::<Vec<_>>());
                assert!(slice.iter().all(|i| i.shard.floc == floc));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(t.record_count(), WRITERS as usize * 2);
}
