//! Heap entries for graph traversal.

use super::node::NodeId;
use std::cmp::Ordering;

/// An internal id paired with its distance to the current query.
///
/// The ordering is total and deterministic: by distance under IEEE 754
/// `total_cmp`, then by ascending internal id, so equal-distance
/// candidates pop in a stable order across runs.
#[derive(Debug, Clone, Copy)]
pub(super) struct Candidate {
    /// Internal id of the candidate node.
    pub id: NodeId,
    /// Distance from the query to the candidate's vector.
    pub distance: f32,
}

impl Candidate {
    pub(super) fn new(id: NodeId, distance: f32) -> Self {
        Self { id, distance }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        // bit comparison keeps Eq consistent with total_cmp, NaN included
        self.distance.to_bits() == other.distance.to_bits() && self.id == other.id
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}
