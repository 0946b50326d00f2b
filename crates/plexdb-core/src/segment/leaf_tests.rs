//! Tests for the leaf segment: insert/remove scenarios, graph
//! invariants and recall against brute force.

use super::leaf::LeafSegment;
use super::node::Item;
use super::params::SegmentParams;
use crate::distance::DistanceMetric;
use crate::error::Error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub(super) fn small_params(dimension: usize) -> SegmentParams {
    SegmentParams::custom(dimension, 8, 64, 1_000).with_remove_enabled(true)
}

pub(super) fn random_unit_vector(rng: &mut StdRng, dimension: usize) -> Vec<f32> {
    loop {
        let v: Vec<f32> = (0..dimension).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-3 {
            return v.into_iter().map(|x| x / norm).collect();
        }
    }
}

/// Checks every structural invariant of the graph: degree bounds,
/// bidirectional bookkeeping, entry-point maximality and lookup
/// consistency.
pub(super) fn check_graph_invariants(segment: &LeafSegment) {
    let params = *segment.params();
    let live: Vec<_> = (0..segment.node_count())
        .filter_map(|internal_id| segment.get_node(internal_id))
        .collect();

    for node in &live {
        for level in 0..=node.max_level() {
            let cap = if level == 0 { params.m0 } else { params.m };
            let out = node.out_neighbors(level);
            assert!(
                out.len() <= cap,
                "node {} exceeds degree target at layer {level}: {} > {cap}",
                node.id(),
                out.len()
            );
            for &neighbor_id in &out {
                let neighbor = segment.get_node(neighbor_id).unwrap_or_else(|| {
                    panic!("node {} references empty slot {neighbor_id}", node.id())
                });
                assert!(
                    neighbor.max_level() >= level,
                    "node {neighbor_id} is linked above its own top layer"
                );
                if params.remove_enabled {
                    let incoming = neighbor.in_neighbors(level).expect("in-edges tracked");
                    assert!(
                        incoming.contains(&node.id()),
                        "edge {} -> {neighbor_id} at layer {level} is not mirrored",
                        node.id()
                    );
                }
            }
            if params.remove_enabled {
                for &pred_id in &node.in_neighbors(level).expect("in-edges tracked") {
                    let pred = segment
                        .get_node(pred_id)
                        .unwrap_or_else(|| panic!("in-edge from empty slot {pred_id}"));
                    assert!(
                        pred.out_neighbors(level).contains(&node.id()),
                        "in-edge {pred_id} -> {} at layer {level} has no out mirror",
                        node.id()
                    );
                }
            }
        }
    }

    match segment.entry_id() {
        Some(entry_id) => {
            let entry = segment.get_node(entry_id).expect("entry point is live");
            let tallest = live.iter().map(|n| n.max_level()).max().unwrap_or(0);
            assert_eq!(
                entry.max_level(),
                tallest,
                "entry point is not at the maximal layer"
            );
        }
        None => assert!(live.is_empty(), "live nodes but no entry point"),
    }

    assert_eq!(segment.len(), live.len(), "lookup size != live node count");
    for node in &live {
        assert_eq!(
            segment.get_global_id(node.external_id()),
            Some(node.id() + params.base_id),
            "lookup disagrees with node {}",
            node.id()
        );
    }
}

fn axis_vector(dimension: usize, axis: usize, value: f32) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[axis % dimension] = value;
    v
}

#[test]
fn test_empty_segment_search_returns_nothing() {
    let segment = LeafSegment::new(small_params(4), DistanceMetric::Euclidean).unwrap();
    assert!(segment.is_empty());
    assert!(segment.search_knn(&[0.0; 4], 5, 50).is_empty());
    assert_eq!(segment.entry_id(), None);
}

#[test]
fn test_single_insert_is_its_own_nearest_neighbor() {
    let segment = LeafSegment::new(small_params(3), DistanceMetric::Euclidean).unwrap();
    assert!(segment.add(Item::new(42, vec![1.0, 0.0, 0.0])));

    let hits = segment.search_knn(&[1.0, 0.0, 0.0], 1, 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, 42);
    assert!(hits[0].1.abs() < 1e-6);
}

#[test]
fn test_search_is_deterministic_under_ties() {
    let segment = LeafSegment::new(small_params(2), DistanceMetric::Euclidean).unwrap();
    segment.add(Item::new(10, vec![1.0, 0.0]));
    segment.add(Item::new(11, vec![0.0, 1.0]));
    segment.add(Item::new(12, vec![-1.0, 0.0]));
    segment.add(Item::new(13, vec![0.0, -1.0]));

    // all four are at distance 1 from the origin; ties break toward the
    // smaller internal id, which follows insertion order here
    let hits = segment.search_knn(&[0.0, 0.0], 2, 16);
    let ids: Vec<u64> = hits.iter().map(|h| h.0).collect();
    assert_eq!(ids, vec![10, 11]);
}

#[test]
fn test_search_finds_all_inserted_items() {
    let segment = LeafSegment::new(small_params(4), DistanceMetric::Euclidean).unwrap();
    for i in 0..50u64 {
        #[allow(clippy::cast_precision_loss)]
        let v = axis_vector(4, i as usize, 1.0 + i as f32 * 0.01);
        assert!(segment.add(Item::new(i, v)));
    }
    assert_eq!(segment.len(), 50);
    check_graph_invariants(&segment);

    for i in 0..50u64 {
        #[allow(clippy::cast_precision_loss)]
        let v = axis_vector(4, i as usize, 1.0 + i as f32 * 0.01);
        let hits = segment.search_knn(&v, 1, 64);
        assert_eq!(hits[0].0, i, "item {i} is not its own nearest neighbor");
    }
}

#[test]
fn test_recycles_freed_slot() {
    // M=4, M0=8, capacity 100
    let params = SegmentParams::custom(8, 4, 32, 100).with_remove_enabled(true);
    let segment = LeafSegment::new(params, DistanceMetric::Euclidean).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    for i in 0..100u64 {
        assert!(segment.add(Item::new(i, random_unit_vector(&mut rng, 8))));
    }
    assert_eq!(segment.len(), 100);

    let freed_internal = segment.get_global_id(50).unwrap() - segment.params().base_id;
    assert!(segment.remove_by_external(50));
    assert_eq!(segment.len(), 99);

    // the 101st item must land in the recycled slot
    assert!(segment.add(Item::new(500, random_unit_vector(&mut rng, 8))));
    assert_eq!(segment.len(), 100);
    assert_eq!(
        segment.get_global_id(500).unwrap() - segment.params().base_id,
        freed_internal
    );
    check_graph_invariants(&segment);
}

#[test]
fn test_idempotent_duplicate_add() {
    let segment = LeafSegment::new(small_params(3), DistanceMetric::Euclidean).unwrap();
    assert!(segment.add(Item::new(7, vec![0.5, 0.5, 0.0])));
    let count_before = segment.node_count();
    let entry_before = segment.entry_id();

    assert!(segment.add(Item::new(7, vec![0.5, 0.5, 0.0])));
    assert_eq!(segment.len(), 1);
    assert_eq!(segment.node_count(), count_before);
    assert_eq!(segment.entry_id(), entry_before);
}

#[test]
fn test_duplicate_update_replaces_vector() {
    let segment = LeafSegment::new(small_params(3), DistanceMetric::Euclidean).unwrap();
    segment.add(Item::new(7, vec![1.0, 0.0, 0.0]));
    for i in 0..20u64 {
        segment.add(Item::new(100 + i, axis_vector(3, i as usize, 2.0)));
    }
    let len_before = segment.len();

    // same external id, different vector: the old node is replaced
    assert!(segment.add(Item::new(7, vec![0.0, 0.0, 3.0])));
    assert_eq!(segment.len(), len_before);

    let internal = segment.get_global_id(7).unwrap() - segment.params().base_id;
    assert_eq!(segment.get_vector(internal).unwrap(), vec![0.0, 0.0, 3.0]);
    check_graph_invariants(&segment);
}

#[test]
fn test_duplicate_rejected_without_remove_support() {
    let params = small_params(3).with_remove_enabled(false);
    let segment = LeafSegment::new(params, DistanceMetric::Euclidean).unwrap();
    assert!(segment.add(Item::new(7, vec![1.0, 0.0, 0.0])));

    // even an identical vector is rejected: updates need in-edges
    assert!(!segment.add(Item::new(7, vec![1.0, 0.0, 0.0])));
    let err = segment
        .try_add(Item::new(7, vec![0.0, 1.0, 0.0]))
        .unwrap_err();
    assert_eq!(err.code(), "PLEX-003");
    assert_eq!(segment.len(), 1);
}

#[test]
fn test_duplicate_in_other_segment_rejected() {
    let params = small_params(3)
        .with_base_id(10_000)
        .with_remove_enabled(true);
    let segment = LeafSegment::new(params, DistanceMetric::Euclidean).unwrap();
    segment.add(Item::new(1, vec![1.0, 0.0, 0.0]));

    // simulate a sibling segment owning this external id
    segment.lookup.put(99, 5);
    let err = segment
        .try_add(Item::new(99, vec![0.0, 1.0, 0.0]))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateInOtherSegment { .. }));
}

#[test]
fn test_capacity_exhaustion_and_recovery() {
    let params = SegmentParams::custom(4, 4, 16, 10).with_remove_enabled(true);
    let segment = LeafSegment::new(params, DistanceMetric::Euclidean).unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    for i in 0..10u64 {
        assert!(segment.add(Item::new(i, random_unit_vector(&mut rng, 4))));
    }
    let err = segment
        .try_add(Item::new(10, random_unit_vector(&mut rng, 4)))
        .unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { capacity: 10 }));
    assert!(!segment.add(Item::new(10, random_unit_vector(&mut rng, 4))));

    assert!(segment.remove_by_external(3));
    assert!(segment.add(Item::new(10, random_unit_vector(&mut rng, 4))));
    assert_eq!(segment.len(), 10);
}

#[test]
fn test_dimension_mismatch_rejected() {
    let segment = LeafSegment::new(small_params(4), DistanceMetric::Euclidean).unwrap();
    let err = segment.try_add(Item::new(1, vec![1.0, 2.0])).unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            expected: 4,
            actual: 2
        }
    ));
    assert!(segment.search_knn(&[1.0, 2.0], 3, 10).is_empty());
}

#[test]
fn test_remove_disabled_segment_rejects_removal() {
    let params = small_params(4).with_remove_enabled(false);
    let segment = LeafSegment::new(params, DistanceMetric::Euclidean).unwrap();
    segment.add(Item::new(1, vec![1.0, 0.0, 0.0, 0.0]));

    assert!(!segment.remove(0));
    assert!(matches!(
        segment.try_remove(0).unwrap_err(),
        Error::RemoveDisabled
    ));
    assert!(!segment.remove_by_external(1));
}

#[test]
fn test_remove_absent_slot_is_not_found() {
    let segment = LeafSegment::new(small_params(4), DistanceMetric::Euclidean).unwrap();
    assert!(!segment.remove(5));
    assert!(matches!(
        segment.try_remove(5).unwrap_err(),
        Error::NotFound { internal_id: 5 }
    ));
}

#[test]
fn test_remove_detaches_node_everywhere() {
    let segment = LeafSegment::new(small_params(8), DistanceMetric::Euclidean).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    for i in 0..40u64 {
        segment.add(Item::new(i, random_unit_vector(&mut rng, 8)));
    }

    let victim = segment.get_global_id(20).unwrap() - segment.params().base_id;
    assert!(segment.remove(victim));
    assert!(!segment.contains(20));
    assert_eq!(segment.get_vector(victim), None);

    // no surviving node may still reference the victim on any layer
    for internal_id in 0..segment.node_count() {
        if let Some(node) = segment.get_node(internal_id) {
            for level in 0..=node.max_level() {
                assert!(!node.out_neighbors(level).contains(&victim));
                assert!(!node.in_neighbors(level).unwrap().contains(&victim));
            }
        }
    }
    check_graph_invariants(&segment);
}

#[test]
fn test_remove_entry_point_rotates() {
    let segment = LeafSegment::new(small_params(8), DistanceMetric::Euclidean).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    for i in 0..30u64 {
        segment.add(Item::new(i, random_unit_vector(&mut rng, 8)));
    }

    let entry = segment.entry_id().expect("entry point exists");
    assert!(segment.remove(entry));
    assert_ne!(segment.entry_id(), Some(entry));
    check_graph_invariants(&segment);
}

#[test]
fn test_remove_everything_empties_the_graph() {
    let segment = LeafSegment::new(small_params(4), DistanceMetric::Euclidean).unwrap();
    let mut rng = StdRng::seed_from_u64(13);
    for i in 0..15u64 {
        segment.add(Item::new(i, random_unit_vector(&mut rng, 4)));
    }
    for i in 0..15u64 {
        assert!(segment.remove_by_external(i));
    }
    assert!(segment.is_empty());
    assert_eq!(segment.entry_id(), None);
    assert!(segment.search_knn(&[1.0, 0.0, 0.0, 0.0], 3, 16).is_empty());

    // the emptied graph accepts inserts again
    assert!(segment.add(Item::new(100, random_unit_vector(&mut rng, 4))));
    check_graph_invariants(&segment);
}

#[test]
fn test_insert_batch_parallel_counts_accepts() {
    let params = SegmentParams::custom(8, 8, 64, 200).with_remove_enabled(true);
    let segment = LeafSegment::new(params, DistanceMetric::Euclidean).unwrap();
    let mut rng = StdRng::seed_from_u64(17);

    let items: Vec<Item> = (0..150u64)
        .map(|i| Item::new(i, random_unit_vector(&mut rng, 8)))
        .collect();
    let accepted = segment.insert_batch_parallel(items);
    assert_eq!(accepted, 150);
    assert_eq!(segment.len(), 150);
    check_graph_invariants(&segment);
}

#[test]
fn test_recall_against_brute_force() {
    // classic operating point: M=16, ef_construction=200, ef=200, k=10
    let params = SegmentParams::custom(16, 16, 200, 1_000);
    let segment = LeafSegment::new(params, DistanceMetric::Euclidean).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    let corpus: Vec<Vec<f32>> = (0..400).map(|_| random_unit_vector(&mut rng, 16)).collect();
    for (i, vector) in corpus.iter().enumerate() {
        assert!(segment.add(Item::new(i as u64, vector.clone())));
    }

    let k = 10;
    let mut hits = 0usize;
    let mut total = 0usize;
    for _ in 0..20 {
        let query = random_unit_vector(&mut rng, 16);
        let approx: Vec<u64> = segment
            .search_knn(&query, k, 200)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let exact: Vec<u64> = segment
            .brute_force_knn(&query, k)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        hits += approx.iter().filter(|id| exact.contains(id)).count();
        total += k;
    }

    #[allow(clippy::cast_precision_loss)]
    let recall = hits as f64 / total as f64;
    assert!(recall >= 0.90, "recall@10 was {recall:.3}");
}

#[test]
fn test_brute_force_matches_exact_order() {
    let segment = LeafSegment::new(small_params(2), DistanceMetric::Euclidean).unwrap();
    segment.add(Item::new(1, vec![1.0, 0.0]));
    segment.add(Item::new(2, vec![2.0, 0.0]));
    segment.add(Item::new(3, vec![3.0, 0.0]));

    let hits = segment.brute_force_knn(&[0.0, 0.0], 2);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, 1);
    assert_eq!(hits[1].0, 2);
}

#[test]
fn test_base_id_offsets_global_ids() {
    let params = small_params(4).with_base_id(7_000);
    let segment = LeafSegment::new(params, DistanceMetric::Euclidean).unwrap();
    segment.add(Item::new(9, vec![1.0, 0.0, 0.0, 0.0]));

    let global = segment.get_global_id(9).unwrap();
    assert!(global >= 7_000);
    assert!(segment.get_node(global - 7_000).is_some());
    check_graph_invariants(&segment);
}
