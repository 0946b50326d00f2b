//! External id lookup.
//!
//! Bidirectional resolution is cheap in one direction only: external id
//! to global id goes through this map, global id to external id goes
//! through the node arena itself.

use dashmap::DashMap;

/// Lookup from external ids to global ids (`internal + base_id`).
///
/// Reads are lock-free and may run concurrently with searches. Mutations
/// happen only while the segment's global lock is held, which serializes
/// writers; the map itself therefore never sees conflicting updates for
/// one key.
#[derive(Debug, Default)]
pub(super) struct IdMap {
    map: DashMap<u64, usize>,
}

impl IdMap {
    #[allow(dead_code)] // API completeness - `with_capacity` is the usual entry
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn with_capacity(capacity: usize) -> Self {
        Self {
            map: DashMap::with_capacity(capacity),
        }
    }

    /// Global id currently mapped to `external_id`, if any.
    pub(super) fn get(&self, external_id: u64) -> Option<usize> {
        self.map.get(&external_id).map(|entry| *entry)
    }

    pub(super) fn put(&self, external_id: u64, global_id: usize) {
        self.map.insert(external_id, global_id);
    }

    pub(super) fn remove(&self, external_id: u64) -> Option<usize> {
        self.map.remove(&external_id).map(|(_, global_id)| global_id)
    }

    pub(super) fn contains(&self, external_id: u64) -> bool {
        self.map.contains_key(&external_id)
    }

    /// Number of live mappings.
    pub(super) fn len(&self) -> usize {
        self.map.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over `(external_id, global_id)` pairs.
    ///
    /// Acquires shard read locks during iteration; do not call while
    /// holding a reference into the same map.
    #[allow(dead_code)] // API completeness - used by consistency checks
    pub(super) fn iter(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.map.iter().map(|entry| (*entry.key(), *entry.value()))
    }
}
