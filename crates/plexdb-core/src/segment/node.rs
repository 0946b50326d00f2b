//! Arena node record.
//!
//! A node never moves after publication; adjacency is expressed through
//! internal ids so the inherently cyclic graph stays free of owning
//! references. The connection lists live behind a per-node mutex — the
//! node's monitor — kept adjacent to the lists for cache locality.

use parking_lot::{Mutex, MutexGuard};

/// Dense index into a segment's node array.
pub type NodeId = usize;

/// External-facing payload: a caller-chosen id and its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Caller-chosen identifier, unique across live nodes of the index.
    pub external_id: u64,
    /// The vector indexed under `external_id`.
    pub vector: Vec<f32>,
}

impl Item {
    /// Creates a new item.
    #[must_use]
    pub fn new(external_id: u64, vector: Vec<f32>) -> Self {
        Self {
            external_id,
            vector,
        }
    }
}

/// A node of the segment graph.
///
/// The node participates in layers `0..=max_level`. Its id, level and
/// item are immutable; only the connection lists change over its life,
/// and only under the node's monitor.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    max_level: usize,
    item: Item,
    links: Mutex<NodeLinks>,
}

/// Per-layer connection lists, guarded by the owning node's monitor.
///
/// `out[level]` holds the out-neighbors on that layer; `inc` mirrors
/// incoming edges and is present only when the segment tracks removals.
#[derive(Debug, Clone)]
pub(super) struct NodeLinks {
    out: Vec<Vec<NodeId>>,
    inc: Option<Vec<Vec<NodeId>>>,
}

impl Node {
    /// Creates a fully initialized node with empty connection lists
    /// pre-sized to the layer degree targets.
    pub(super) fn new(
        id: NodeId,
        max_level: usize,
        item: Item,
        remove_enabled: bool,
        m: usize,
        m0: usize,
    ) -> Self {
        let degree_at = |level: usize| if level == 0 { m0 } else { m };
        let out = (0..=max_level)
            .map(|level| Vec::with_capacity(degree_at(level)))
            .collect();
        let inc = remove_enabled.then(|| {
            (0..=max_level)
                .map(|level| Vec::with_capacity(degree_at(level)))
                .collect()
        });
        Self {
            id,
            max_level,
            item,
            links: Mutex::new(NodeLinks { out, inc }),
        }
    }

    /// Rebuilds a node from persisted connection lists.
    pub(super) fn from_links(
        id: NodeId,
        item: Item,
        out: Vec<Vec<NodeId>>,
        inc: Option<Vec<Vec<NodeId>>>,
    ) -> Self {
        debug_assert!(!out.is_empty());
        Self {
            id,
            max_level: out.len() - 1,
            item,
            links: Mutex::new(NodeLinks { out, inc }),
        }
    }

    /// Internal id of this node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Highest layer this node participates in.
    #[must_use]
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// External id carried by the node's item.
    #[must_use]
    pub fn external_id(&self) -> u64 {
        self.item.external_id
    }

    /// The indexed vector.
    #[must_use]
    pub fn vector(&self) -> &[f32] {
        &self.item.vector
    }

    /// Snapshot of the out-neighbors on `level`.
    #[must_use]
    pub fn out_neighbors(&self, level: usize) -> Vec<NodeId> {
        self.links.lock().out.get(level).cloned().unwrap_or_default()
    }

    /// Snapshot of the in-neighbors on `level`, when tracked.
    #[must_use]
    pub fn in_neighbors(&self, level: usize) -> Option<Vec<NodeId>> {
        self.links
            .lock()
            .inc
            .as_ref()
            .and_then(|inc| inc.get(level).cloned())
    }

    /// Locks this node's monitor.
    pub(super) fn links(&self) -> MutexGuard<'_, NodeLinks> {
        self.links.lock()
    }
}

impl NodeLinks {
    /// Out-neighbors on `level`.
    pub(super) fn out(&self, level: usize) -> &[NodeId] {
        &self.out[level]
    }

    /// All per-layer out lists, layer 0 first.
    pub(super) fn out_levels(&self) -> &[Vec<NodeId>] {
        &self.out
    }

    /// All per-layer in lists, when tracked.
    pub(super) fn in_levels(&self) -> Option<&[Vec<NodeId>]> {
        self.inc.as_deref()
    }

    /// In-neighbors on `level`, when tracked.
    pub(super) fn in_at(&self, level: usize) -> Option<&[NodeId]> {
        self.inc.as_ref().map(|inc| inc[level].as_slice())
    }

    pub(super) fn push_out(&mut self, level: usize, id: NodeId) {
        self.out[level].push(id);
    }

    pub(super) fn set_out(&mut self, level: usize, ids: Vec<NodeId>) {
        self.out[level] = ids;
    }

    /// Removes the first occurrence of `id`, preserving list order.
    pub(super) fn remove_out(&mut self, level: usize, id: NodeId) {
        if let Some(pos) = self.out[level].iter().position(|&n| n == id) {
            self.out[level].remove(pos);
        }
    }

    pub(super) fn push_in(&mut self, level: usize, id: NodeId) {
        debug_assert!(self.inc.is_some(), "in-edges pushed without tracking");
        if let Some(inc) = self.inc.as_mut() {
            inc[level].push(id);
        }
    }

    pub(super) fn remove_in(&mut self, level: usize, id: NodeId) {
        if let Some(inc) = self.inc.as_mut() {
            if let Some(pos) = inc[level].iter().position(|&n| n == id) {
                inc[level].remove(pos);
            }
        }
    }
}
