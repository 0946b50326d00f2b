//! Concurrent HNSW leaf segment.
//!
//! A leaf segment is a bounded multi-layer proximity graph. Vectors are
//! inserted and searched concurrently; deletions and entry-point changes
//! serialize on a global lock while ordinary inserts only contend on the
//! nodes they touch.
//!
//! # Module Organization
//!
//! - `params`: segment configuration and validation
//! - `node`: arena node record with its per-node monitor
//! - `bitset`: fixed bitsets and the pooled visited-set supplier
//! - `candidate`: heap entries with deterministic tie-breaking
//! - `mappings`: external id to global id lookup
//! - `level`: deterministic layer assignment
//! - `leaf`: `LeafSegment` itself — insert and removal protocols
//! - `search`: layer-local best-first search and k-NN entry points
//! - `heuristic`: neighbor selection and mutual connection
//! - `persistence`: snapshot/load of the four segment artifacts

// ============================================================================
// Core modules
// ============================================================================
mod bitset;
mod candidate;
mod heuristic;
mod leaf;
mod level;
mod mappings;
mod node;
mod params;
mod persistence;
mod search;

#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod leaf_tests;

// ============================================================================
// Public API
// ============================================================================
pub use bitset::{BitsetPool, FixedBitset, PooledBitset};
pub use leaf::LeafSegment;
pub use level::LevelSampler;
pub use node::{Item, Node, NodeId};
pub use params::SegmentParams;
