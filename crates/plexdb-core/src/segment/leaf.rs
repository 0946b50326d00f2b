//! The leaf segment: a bounded concurrent HNSW graph.
//!
//! # Locking protocol
//!
//! Four primitives coordinate all access:
//!
//! - the **global lock** (the mutex around [`Allocator`]) serializes
//!   topology changes: id allocation, entry-point rotation, deletion.
//!   An insert that cannot move the entry point releases it early, so
//!   ordinary inserts run in parallel.
//! - the **topology lock** is a reader/writer lock. Inserts and searches
//!   are readers; a consistent snapshot is the only writer.
//! - each node's **monitor** (its links mutex) protects that node's
//!   connection lists.
//! - the **in-construction bitset** marks nodes still being wired up, so
//!   concurrent inserters never link to a half-built node.
//!
//! Lock order where several are held: global lock, then topology lock,
//! then a new node's monitor, then a neighbor's monitor. The bitset's
//! mutex is only ever held alone.

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::sync::Arc;

use super::bitset::{BitsetPool, FixedBitset};
use super::level::LevelSampler;
use super::mappings::IdMap;
use super::node::{Item, Node, NodeId};
use super::params::SegmentParams;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};

/// Book-keeping owned by the global lock: the slot highwater mark and
/// the LIFO of recycled ids. Holding the mutex around this struct *is*
/// holding the segment's global lock, so ids cannot be allocated
/// without it.
#[derive(Debug, Default)]
pub(super) struct Allocator {
    pub(super) node_count: usize,
    pub(super) freed_ids: Vec<NodeId>,
}

impl Allocator {
    /// Pops a recycled id, or extends the highwater mark while capacity
    /// remains.
    fn next_internal_id(&mut self, capacity: usize) -> Option<NodeId> {
        if let Some(id) = self.freed_ids.pop() {
            return Some(id);
        }
        if self.node_count < capacity {
            let id = self.node_count;
            self.node_count += 1;
            Some(id)
        } else {
            None
        }
    }
}

/// Clears the in-construction flag on every exit path.
struct ConstructionGuard<'a> {
    bits: &'a Mutex<FixedBitset>,
    id: NodeId,
}

impl<'a> ConstructionGuard<'a> {
    fn mark(bits: &'a Mutex<FixedBitset>, id: NodeId) -> Self {
        bits.lock().insert(id);
        Self { bits, id }
    }
}

impl Drop for ConstructionGuard<'_> {
    fn drop(&mut self) {
        self.bits.lock().remove(self.id);
    }
}

/// A bounded concurrent HNSW graph over one contiguous range of global
/// ids.
///
/// Nodes live in a fixed-length arena of atomically readable slots; a
/// slot read observes either a fully initialized node or nothing.
/// Deleted slots are recycled through the allocator's LIFO.
#[derive(Debug)]
pub struct LeafSegment {
    pub(super) params: SegmentParams,
    pub(super) metric: DistanceMetric,
    pub(super) sampler: LevelSampler,
    pub(super) nodes: Box<[RwLock<Option<Arc<Node>>>]>,
    pub(super) alloc: Mutex<Allocator>,
    pub(super) topology: RwLock<()>,
    pub(super) in_construction: Mutex<FixedBitset>,
    pub(super) lookup: IdMap,
    pub(super) entry_point: RwLock<Option<Arc<Node>>>,
    pub(super) visited_pool: Arc<BitsetPool>,
}

impl LeafSegment {
    /// Creates an empty segment with its own visited-bitset pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the parameters are degenerate.
    pub fn new(params: SegmentParams, metric: DistanceMetric) -> Result<Self> {
        let pool = Arc::new(BitsetPool::new(params.max_node_count));
        Self::with_pool(params, metric, pool)
    }

    /// Creates an empty segment drawing visited bitsets from a shared
    /// pool, as a multi-segment parent does for its leaves.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the parameters are degenerate or the
    /// pool is sized below the segment capacity.
    pub fn with_pool(
        params: SegmentParams,
        metric: DistanceMetric,
        visited_pool: Arc<BitsetPool>,
    ) -> Result<Self> {
        params.validate()?;
        if visited_pool.capacity() < params.max_node_count {
            return Err(Error::Config(format!(
                "visited pool capacity {} below segment capacity {}",
                visited_pool.capacity(),
                params.max_node_count
            )));
        }
        let slots: Vec<RwLock<Option<Arc<Node>>>> =
            (0..params.max_node_count).map(|_| RwLock::new(None)).collect();
        Ok(Self {
            params,
            metric,
            sampler: LevelSampler::new(params.level_lambda),
            nodes: slots.into_boxed_slice(),
            alloc: Mutex::new(Allocator::default()),
            topology: RwLock::new(()),
            in_construction: Mutex::new(FixedBitset::new(params.max_node_count)),
            lookup: IdMap::with_capacity(params.max_node_count),
            entry_point: RwLock::new(None),
            visited_pool,
        })
    }

    /// Segment configuration.
    #[must_use]
    pub fn params(&self) -> &SegmentParams {
        &self.params
    }

    /// Distance metric of this segment.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Returns true if no node is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Fixed slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.params.max_node_count
    }

    /// Highwater mark of ever-assigned slots.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.alloc.lock().node_count
    }

    /// Internal id of the current entry point, if any.
    #[must_use]
    pub fn entry_id(&self) -> Option<NodeId> {
        self.entry_point.read().as_ref().map(|node| node.id())
    }

    /// Vector stored at `internal_id`, if the slot is live.
    #[must_use]
    pub fn get_vector(&self, internal_id: NodeId) -> Option<Vec<f32>> {
        self.node_at(internal_id).map(|node| node.vector().to_vec())
    }

    /// Node stored at `internal_id`, if the slot is live.
    #[must_use]
    pub fn get_node(&self, internal_id: NodeId) -> Option<Arc<Node>> {
        self.node_at(internal_id)
    }

    /// Global id mapped to `external_id`, if it is live anywhere in the
    /// index.
    #[must_use]
    pub fn get_global_id(&self, external_id: u64) -> Option<usize> {
        self.lookup.get(external_id)
    }

    /// Returns whether `external_id` is live.
    #[must_use]
    pub fn contains(&self, external_id: u64) -> bool {
        self.lookup.contains(external_id)
    }

    /// Atomic slot read: either a fully initialized node or nothing.
    pub(super) fn node_at(&self, internal_id: NodeId) -> Option<Arc<Node>> {
        self.nodes.get(internal_id)?.read().clone()
    }

    pub(super) fn owns_global(&self, global_id: usize) -> bool {
        global_id >= self.params.base_id
            && global_id < self.params.base_id + self.params.max_node_count
    }

    /// Inserts an item, returning whether it was accepted.
    ///
    /// `true` covers both a fresh insert and an idempotent duplicate;
    /// `false` covers capacity exhaustion, cross-segment duplicates and
    /// duplicate ids on a segment that cannot update. See [`Self::try_add`]
    /// for the typed form.
    pub fn add(&self, item: Item) -> bool {
        let external_id = item.external_id;
        match self.try_add(item) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(code = err.code(), external_id, "insert rejected");
                false
            }
        }
    }

    /// Inserts an item, surfacing the rejection reason.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`], [`Error::UpdateDisabled`],
    /// [`Error::DuplicateInOtherSegment`] or [`Error::CapacityExceeded`].
    ///
    /// # Panics
    ///
    /// Panics if the lookup maps an external id to an empty slot, which
    /// the locking protocol rules out.
    pub fn try_add(&self, item: Item) -> Result<()> {
        if item.vector.len() != self.params.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.params.dimension,
                actual: item.vector.len(),
            });
        }

        let mut alloc = self.alloc.lock();

        if let Some(global_id) = self.lookup.get(item.external_id) {
            if !self.params.remove_enabled {
                return Err(Error::UpdateDisabled {
                    external_id: item.external_id,
                });
            }
            if !self.owns_global(global_id) {
                return Err(Error::DuplicateInOtherSegment {
                    external_id: item.external_id,
                });
            }
            let occupant_id = global_id - self.params.base_id;
            let occupant = self
                .node_at(occupant_id)
                .expect("lookup maps an external id to an empty slot");
            if occupant.vector() == item.vector.as_slice() {
                // same id, same vector: already added
                return Ok(());
            }
            // same id, different vector: replace the occupant
            self.detach(occupant_id, &mut alloc);
        }

        let Some(internal_id) = alloc.next_internal_id(self.params.max_node_count) else {
            return Err(Error::CapacityExceeded {
                capacity: self.params.max_node_count,
            });
        };

        let max_level = self.sampler.level_for(item.external_id);
        let node = Arc::new(Node::new(
            internal_id,
            max_level,
            item,
            self.params.remove_enabled,
            self.params.m,
            self.params.m0,
        ));

        let entry_copy = self.entry_point.read().clone();
        let rotates_entry = entry_copy
            .as_ref()
            .map_or(true, |entry| max_level > entry.max_level());

        // An insert below the entry level cannot rotate the entry point:
        // release the global lock so other inserts proceed in parallel.
        let _global = if rotates_entry {
            Some(alloc)
        } else {
            drop(alloc);
            None
        };

        let _topology = self.topology.read();
        let _construction = ConstructionGuard::mark(&self.in_construction, internal_id);

        *self.nodes[internal_id].write() = Some(Arc::clone(&node));
        self.lookup
            .put(node.external_id(), internal_id + self.params.base_id);

        if let Some(entry) = entry_copy.as_ref() {
            let mut cur = Arc::clone(entry);
            if node.max_level() < entry.max_level() {
                cur = self.greedy_descend(
                    node.vector(),
                    cur,
                    entry.max_level(),
                    node.max_level() + 1,
                );
            }
            for layer in (0..=node.max_level().min(entry.max_level())).rev() {
                let top =
                    self.search_layer(&cur, node.vector(), self.params.ef_construction, layer);
                self.connect_new_node(&node, &top, layer);
                // the next (lower) layer starts from this layer's best
                if let Some(best) = top.first().and_then(|c| self.node_at(c.id)) {
                    cur = best;
                }
            }
        }

        if rotates_entry {
            *self.entry_point.write() = Some(Arc::clone(&node));
        }

        Ok(())
    }

    /// Inserts a batch of items in parallel, returning how many were
    /// accepted. Rejections are independent per item, exactly as with
    /// [`Self::add`].
    pub fn insert_batch_parallel<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = Item>,
    {
        let items: Vec<Item> = items.into_iter().collect();
        items
            .into_par_iter()
            .map(|item| usize::from(self.add(item)))
            .sum()
    }

    /// Removes the node at `internal_id`, returning whether a node was
    /// detached. See [`Self::try_remove`] for the typed form.
    pub fn remove(&self, internal_id: NodeId) -> bool {
        match self.try_remove(internal_id) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(code = err.code(), internal_id, "remove rejected");
                false
            }
        }
    }

    /// Removes the node at `internal_id`, surfacing the rejection
    /// reason.
    ///
    /// # Errors
    ///
    /// [`Error::RemoveDisabled`] when the segment tracks no in-edges,
    /// [`Error::NotFound`] when the slot holds no live node.
    pub fn try_remove(&self, internal_id: NodeId) -> Result<()> {
        if !self.params.remove_enabled {
            return Err(Error::RemoveDisabled);
        }
        let mut alloc = self.alloc.lock();
        if self.detach(internal_id, &mut alloc) {
            Ok(())
        } else {
            Err(Error::NotFound { internal_id })
        }
    }

    /// Removes by external id, when it resolves into this segment.
    pub fn remove_by_external(&self, external_id: u64) -> bool {
        if !self.params.remove_enabled {
            return false;
        }
        let mut alloc = self.alloc.lock();
        let Some(global_id) = self.lookup.get(external_id) else {
            return false;
        };
        if !self.owns_global(global_id) {
            return false;
        }
        self.detach(global_id - self.params.base_id, &mut alloc)
    }

    /// Unlinks a node from every layer, rotates the entry point off it
    /// if needed and recycles its slot. Caller holds the global lock.
    pub(super) fn detach(&self, internal_id: NodeId, alloc: &mut Allocator) -> bool {
        let Some(node) = self.node_at(internal_id) else {
            return false;
        };
        let links = node.links().clone();

        for level in (0..=node.max_level()).rev() {
            if let Some(incoming) = links.in_at(level) {
                for &pred in incoming {
                    if let Some(pred_node) = self.node_at(pred) {
                        pred_node.links().remove_out(level, internal_id);
                    }
                }
            }
            for &succ in links.out(level) {
                if let Some(succ_node) = self.node_at(succ) {
                    succ_node.links().remove_in(level, internal_id);
                }
            }
        }

        let is_entry = self.entry_point.read().as_ref().map(|e| e.id()) == Some(internal_id);
        if is_entry {
            // first out-connection at the highest populated layer takes over
            let mut replacement = None;
            for level in (0..=node.max_level()).rev() {
                if let Some(&first) = links.out(level).first() {
                    replacement = self.node_at(first);
                    if replacement.is_none() {
                        tracing::warn!(
                            internal_id,
                            successor = first,
                            "entry replacement slot was empty"
                        );
                    }
                    break;
                }
            }
            *self.entry_point.write() = replacement;
        }

        self.lookup.remove(node.external_id());
        *self.nodes[internal_id].write() = None;
        alloc.freed_ids.push(internal_id);
        true
    }
}
