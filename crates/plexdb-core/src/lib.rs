//! # `PlexDB` Core
//!
//! Concurrent in-memory HNSW leaf segment for approximate nearest neighbor
//! search.
//!
//! A [`LeafSegment`] is a bounded multi-layer proximity graph into which
//! vectors are inserted and from which nearest neighbors are searched by
//! many threads at once. Insertions proceed in parallel under a
//! fine-grained locking protocol; a global lock is taken only for the rare
//! topology-level changes (id allocation, entry-point rotation, deletion).
//!
//! ## Features
//!
//! - **Parallel inserts**: writers that do not move the entry point run
//!   concurrently, serialized only on the nodes they actually touch
//! - **Deletions**: in-edge bookkeeping allows detaching a node and
//!   recycling its slot
//! - **Persistence**: a consistent snapshot of the graph as four binary
//!   artifacts, reloadable into an identical segment
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plexdb_core::{DistanceMetric, Item, LeafSegment, SegmentParams};
//!
//! let params = SegmentParams::new(128).with_remove_enabled(true);
//! let segment = LeafSegment::new(params, DistanceMetric::Euclidean)?;
//!
//! segment.add(Item::new(42, vec![0.1; 128]));
//! let hits = segment.search_knn(&query, 10, 200);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod distance;
pub mod error;
pub mod segment;


pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use segment::{BitsetPool, Item, LeafSegment, Node, NodeId, SegmentParams};
