//! Graph traversal: greedy zoom, layer-local best-first search and the
//! k-NN entry points.

use rayon::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use super::candidate::Candidate;
use super::leaf::LeafSegment;
use super::node::{Node, NodeId};

impl LeafSegment {
    /// Searches the `k` nearest neighbors of `query`.
    ///
    /// Zooms greedily from the entry point down to layer 1, then runs
    /// the best-first search on layer 0 with a beam of `max(ef, k)`.
    /// Returns `(external_id, distance)` pairs in ascending distance
    /// order; empty when the segment is empty or the query dimension
    /// does not match.
    #[must_use]
    pub fn search_knn(&self, query: &[f32], k: usize, ef: usize) -> Vec<(u64, f32)> {
        if k == 0 || query.len() != self.params.dimension {
            return Vec::new();
        }
        let _topology = self.topology.read();
        let Some(entry) = self.entry_point.read().clone() else {
            return Vec::new();
        };

        let mut cur = Arc::clone(&entry);
        if entry.max_level() > 0 {
            cur = self.greedy_descend(query, cur, entry.max_level(), 1);
        }

        let top = self.search_layer(&cur, query, ef.max(k), 0);
        top.into_iter()
            .take(k)
            .filter_map(|candidate| {
                self.node_at(candidate.id)
                    .map(|node| (node.external_id(), candidate.distance))
            })
            .collect()
    }

    /// Exact parallel reference search over every live node.
    ///
    /// O(n) with 100% recall; the yardstick that the graph search is
    /// measured against.
    #[must_use]
    pub fn brute_force_knn(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        if k == 0 || query.len() != self.params.dimension {
            return Vec::new();
        }
        let node_count = self.alloc.lock().node_count;
        let live: Vec<Arc<Node>> = (0..node_count).filter_map(|id| self.node_at(id)).collect();

        let mut results: Vec<(NodeId, u64, f32)> = live
            .par_iter()
            .map(|node| {
                (
                    node.id(),
                    node.external_id(),
                    self.metric.distance(query, node.vector()),
                )
            })
            .collect();

        results.sort_by(|a, b| a.2.total_cmp(&b.2).then_with(|| a.0.cmp(&b.0)));
        results.truncate(k);
        results
            .into_iter()
            .map(|(_, external_id, distance)| (external_id, distance))
            .collect()
    }

    /// Greedy walk on layers `to_level..=from_level`, top down: on each
    /// layer, hop to the closest out-neighbor until no hop improves the
    /// distance to `query`. Returns the local minimum reached on
    /// `to_level`.
    pub(super) fn greedy_descend(
        &self,
        query: &[f32],
        mut cur: Arc<Node>,
        from_level: usize,
        to_level: usize,
    ) -> Arc<Node> {
        let mut cur_dist = self.metric.distance(query, cur.vector());

        for level in (to_level..=from_level).rev() {
            let mut changed = true;
            while changed {
                changed = false;
                let mut next: Option<Arc<Node>> = None;
                {
                    let links = cur.links();
                    for &candidate_id in links.out(level) {
                        let Some(candidate) = self.node_at(candidate_id) else {
                            debug_assert!(
                                false,
                                "out-connection {candidate_id} points at an empty slot"
                            );
                            continue;
                        };
                        let distance = self.metric.distance(query, candidate.vector());
                        if distance.total_cmp(&cur_dist) == Ordering::Less {
                            cur_dist = distance;
                            next = Some(candidate);
                            changed = true;
                        }
                    }
                }
                if let Some(node) = next {
                    cur = node;
                }
            }
        }
        cur
    }

    /// Layer-local best-first search: a bounded beam over the subgraph
    /// induced by layer `layer`'s out-edges.
    ///
    /// Returns up to `beam` candidates sorted by ascending distance to
    /// `query`. The frontier stops expanding once its closest candidate
    /// is farther than the worst of a full beam.
    pub(super) fn search_layer(
        &self,
        entry: &Arc<Node>,
        query: &[f32],
        beam: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        debug_assert!(beam > 0);
        let mut visited = self.visited_pool.acquire();
        let mut top: BinaryHeap<Candidate> = BinaryHeap::with_capacity(beam + 1);
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();

        let first = Candidate::new(entry.id(), self.metric.distance(query, entry.vector()));
        visited.insert(entry.id());
        top.push(first);
        frontier.push(Reverse(first));
        let mut lower_bound = first.distance;

        while let Some(Reverse(cur)) = frontier.pop() {
            if cur.distance.total_cmp(&lower_bound) == Ordering::Greater {
                break;
            }
            let Some(node) = self.node_at(cur.id) else {
                debug_assert!(false, "frontier id {} points at an empty slot", cur.id);
                continue;
            };

            let links = node.links();
            for &neighbor_id in links.out(layer) {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let Some(neighbor) = self.node_at(neighbor_id) else {
                    debug_assert!(
                        false,
                        "out-connection {neighbor_id} points at an empty slot"
                    );
                    continue;
                };
                let distance = self.metric.distance(query, neighbor.vector());
                if top.len() < beam || distance.total_cmp(&lower_bound) == Ordering::Less {
                    let candidate = Candidate::new(neighbor_id, distance);
                    frontier.push(Reverse(candidate));
                    top.push(candidate);
                    if top.len() > beam {
                        top.pop();
                    }
                    lower_bound = top.peek().map_or(distance, |worst| worst.distance);
                }
            }
        }

        top.into_sorted_vec()
    }
}
