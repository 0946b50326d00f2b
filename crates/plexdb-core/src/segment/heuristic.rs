//! Neighbor selection and mutual connection.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use super::candidate::Candidate;
use super::leaf::LeafSegment;
use super::node::{Node, NodeId};

impl LeafSegment {
    /// Heuristic selection preserving angular spread.
    ///
    /// Walks `candidates` closest-first and keeps a candidate only when
    /// it is closer to the query than to every already-kept neighbor,
    /// up to `cap` picks. Candidate sets that already fit under `cap`
    /// are taken as-is.
    pub(super) fn select_by_heuristic(
        &self,
        candidates: &[Candidate],
        cap: usize,
    ) -> Vec<Candidate> {
        if candidates.len() <= cap {
            return candidates.to_vec();
        }

        let mut selected: Vec<Candidate> = Vec::with_capacity(cap);
        let mut selected_nodes: Vec<Arc<Node>> = Vec::with_capacity(cap);

        for &candidate in candidates {
            if selected.len() >= cap {
                break;
            }
            let Some(node) = self.node_at(candidate.id) else {
                continue;
            };
            let diverse = selected_nodes.iter().all(|kept| {
                let to_kept = self.metric.distance(node.vector(), kept.vector());
                candidate.distance.total_cmp(&to_kept) == Ordering::Less
            });
            if diverse {
                selected.push(candidate);
                selected_nodes.push(node);
            }
        }
        selected
    }

    /// Wires a freshly built node into layer `layer`.
    ///
    /// For each selected neighbor the edge is recorded both ways; a
    /// neighbor already at its degree target keeps only the best
    /// `best_n` of its current out-set plus the new node, ranked by
    /// distance to the neighbor itself.
    ///
    /// Neighbors still under construction are skipped so no one links
    /// to a half-wired node. Mirror bookkeeping for evicted edges is
    /// applied after all monitors are released; until then an evicted
    /// node may briefly keep a stale in-edge, which removal tolerates.
    pub(super) fn connect_new_node(
        &self,
        new_node: &Arc<Node>,
        candidates: &[Candidate],
        layer: usize,
    ) {
        let best_n = if layer == 0 {
            self.params.m0
        } else {
            self.params.m
        };
        let selected = self.select_by_heuristic(candidates, best_n);
        let remove_enabled = self.params.remove_enabled;
        let new_id = new_node.id();

        // (evicted node, layer, in-edge source to drop)
        let mut unmirror: Vec<(NodeId, usize, NodeId)> = Vec::new();

        {
            let mut new_links = new_node.links();

            for candidate in selected {
                if self.in_construction.lock().contains(candidate.id) {
                    continue;
                }
                let Some(neighbor) = self.node_at(candidate.id) else {
                    continue;
                };

                new_links.push_out(layer, candidate.id);

                let mut neighbor_links = neighbor.links();
                if remove_enabled {
                    neighbor_links.push_in(layer, new_id);
                }

                if neighbor_links.out(layer).len() < best_n {
                    if remove_enabled {
                        new_links.push_in(layer, candidate.id);
                    }
                    neighbor_links.push_out(layer, new_id);
                } else {
                    // neighbor full: keep the best `best_n` of the
                    // current out-set plus the new node
                    let mut pool: BinaryHeap<Candidate> = BinaryHeap::with_capacity(best_n + 2);
                    pool.push(Candidate::new(
                        new_id,
                        self.metric.distance(new_node.vector(), neighbor.vector()),
                    ));
                    for &existing in neighbor_links.out(layer) {
                        let Some(existing_node) = self.node_at(existing) else {
                            continue;
                        };
                        pool.push(Candidate::new(
                            existing,
                            self.metric.distance(neighbor.vector(), existing_node.vector()),
                        ));
                    }
                    if remove_enabled {
                        new_links.push_in(layer, candidate.id);
                    }

                    let rejected = pool.pop().expect("pool holds at least the new node");
                    let kept: Vec<NodeId> =
                        pool.into_sorted_vec().into_iter().map(|c| c.id).collect();
                    neighbor_links.set_out(layer, kept);

                    if remove_enabled {
                        unmirror.push((rejected.id, layer, candidate.id));
                    }
                }
            }
        }

        for (evicted, level, source) in unmirror {
            if evicted == new_id {
                new_node.links().remove_in(level, source);
            } else if let Some(evicted_node) = self.node_at(evicted) {
                evicted_node.links().remove_in(level, source);
            }
        }
    }
}
