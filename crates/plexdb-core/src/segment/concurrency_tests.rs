//! Concurrency tests: parallel inserters, readers racing writers, and
//! interleaved removal phases.

use super::leaf::LeafSegment;
use super::leaf_tests::{check_graph_invariants, random_unit_vector};
use super::node::Item;
use super::params::SegmentParams;
use crate::distance::DistanceMetric;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_parallel_disjoint_inserts() {
    let params = SegmentParams::custom(8, 8, 64, 1_200).with_remove_enabled(true);
    let segment = Arc::new(LeafSegment::new(params, DistanceMetric::Euclidean).unwrap());

    let threads = 4u64;
    let per_thread = 200u64;
    let mut handles = Vec::new();

    for t in 0..threads {
        let segment = Arc::clone(&segment);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(100 + t);
            let base = t * per_thread;
            for i in 0..per_thread {
                let item = Item::new(base + i, random_unit_vector(&mut rng, 8));
                assert!(segment.add(item), "insert of {} failed", base + i);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("inserter panicked");
    }

    assert_eq!(segment.len(), usize::try_from(threads * per_thread).unwrap());
    check_graph_invariants(&segment);

    // every inserted external id resolves to a live node
    for external_id in 0..threads * per_thread {
        let global = segment
            .get_global_id(external_id)
            .unwrap_or_else(|| panic!("external id {external_id} lost"));
        let node = segment.get_node(global).expect("mapped slot is live");
        assert_eq!(node.external_id(), external_id);
    }
}

#[test]
fn test_readers_never_observe_dangling_ids() {
    let params = SegmentParams::custom(8, 8, 64, 600);
    let segment = Arc::new(LeafSegment::new(params, DistanceMetric::Euclidean).unwrap());

    // seed so searches have something to chew on from the start
    let mut rng = StdRng::seed_from_u64(1);
    for i in 0..50u64 {
        segment.add(Item::new(i, random_unit_vector(&mut rng, 8)));
    }

    let done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..2u64)
        .map(|t| {
            let segment = Arc::clone(&segment);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(200 + t);
                let base = 50 + t * 250;
                for i in 0..250 {
                    segment.add(Item::new(base + i, random_unit_vector(&mut rng, 8)));
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..3u64)
        .map(|t| {
            let segment = Arc::clone(&segment);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(300 + t);
                let mut observed = 0usize;
                loop {
                    let query = random_unit_vector(&mut rng, 8);
                    for (external_id, _) in segment.search_knn(&query, 5, 32) {
                        let global = segment.get_global_id(external_id).unwrap_or_else(|| {
                            panic!("search returned unmapped id {external_id}")
                        });
                        let node = segment.get_node(global).unwrap_or_else(|| {
                            panic!("search returned dangling id {external_id}")
                        });
                        assert_eq!(node.external_id(), external_id);
                        observed += 1;
                    }
                    if done.load(Ordering::Relaxed) {
                        break;
                    }
                }
                observed
            })
        })
        .collect();

    for writer in writers {
        writer.join().expect("writer panicked");
    }
    done.store(true, Ordering::Relaxed);
    for reader in readers {
        let observed = reader.join().expect("reader panicked");
        assert!(observed > 0, "reader never saw a result");
    }

    assert_eq!(segment.len(), 550);
    check_graph_invariants(&segment);
}

#[test]
fn test_insert_remove_phases_keep_graph_consistent() {
    let params = SegmentParams::custom(8, 8, 64, 900).with_remove_enabled(true);
    let segment = Arc::new(LeafSegment::new(params, DistanceMetric::Euclidean).unwrap());

    // phase 1: fill from four threads
    let inserters: Vec<_> = (0..4u64)
        .map(|t| {
            let segment = Arc::clone(&segment);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(400 + t);
                for i in 0..150u64 {
                    segment.add(Item::new(t * 150 + i, random_unit_vector(&mut rng, 8)));
                }
            })
        })
        .collect();
    for handle in inserters {
        handle.join().expect("inserter panicked");
    }
    assert_eq!(segment.len(), 600);

    // phase 2: competing removers; each id is won by exactly one thread
    let removed = Arc::new(AtomicUsize::new(0));
    let removers: Vec<_> = (0..3)
        .map(|_| {
            let segment = Arc::clone(&segment);
            let removed = Arc::clone(&removed);
            thread::spawn(move || {
                for external_id in (0..600u64).step_by(3) {
                    if segment.remove_by_external(external_id) {
                        removed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for handle in removers {
        handle.join().expect("remover panicked");
    }

    assert_eq!(removed.load(Ordering::Relaxed), 200);
    assert_eq!(segment.len(), 400);
    check_graph_invariants(&segment);

    // phase 3: freed slots absorb a refill
    let refillers: Vec<_> = (0..2u64)
        .map(|t| {
            let segment = Arc::clone(&segment);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(500 + t);
                for i in 0..100u64 {
                    let external_id = 1_000 + t * 100 + i;
                    assert!(segment.add(Item::new(
                        external_id,
                        random_unit_vector(&mut rng, 8)
                    )));
                }
            })
        })
        .collect();
    for handle in refillers {
        handle.join().expect("refiller panicked");
    }

    assert_eq!(segment.len(), 600);
    assert_eq!(segment.node_count(), 600, "refill must recycle freed slots");
    check_graph_invariants(&segment);
}
