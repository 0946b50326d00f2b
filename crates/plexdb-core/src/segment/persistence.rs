//! Snapshot and load of the segment's four persisted artifacts.
//!
//! A snapshot freezes the graph under the topology write lock and dumps
//! four slot-indexed tables: vectors, out-connections, in-connections
//! (only when removal is enabled) and the invert lookup of external ids.
//! Loading rebuilds an identical segment; the entry point and the freed
//! id list are re-derived rather than stored.

use rustc_hash::FxHashSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use super::bitset::BitsetPool;
use super::leaf::LeafSegment;
use super::node::{Item, Node, NodeId};
use super::params::SegmentParams;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};

const VECTORS_FILE: &str = "vectors.bin";
const OUT_CONNS_FILE: &str = "out_conns.bin";
const IN_CONNS_FILE: &str = "in_conns.bin";
const INVERT_LOOKUP_FILE: &str = "invert_lookup.bin";

type VectorsTable = Vec<Option<Vec<f32>>>;
type ConnsTable = Vec<Option<Vec<Vec<NodeId>>>>;
type InvertTable = Vec<Option<u64>>;

impl LeafSegment {
    /// Writes the segment's artifacts into `dir`.
    ///
    /// All four files are produced under one hold of the topology write
    /// lock, so they describe the same logical state. In-memory state is
    /// untouched whether the write succeeds or fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Serialization`] when a file
    /// cannot be produced.
    pub fn snapshot<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        // global lock first, then the topology writer — the same order
        // inserts use, so the two cannot cross
        let alloc = self.alloc.lock();
        let _topology = self.topology.write();
        let node_count = alloc.node_count;

        let mut vectors: VectorsTable = Vec::with_capacity(node_count);
        let mut out_conns: ConnsTable = Vec::with_capacity(node_count);
        let mut in_conns: ConnsTable = Vec::with_capacity(node_count);
        let mut invert: InvertTable = Vec::with_capacity(node_count);

        for internal_id in 0..node_count {
            match self.node_at(internal_id) {
                Some(node) => {
                    let links = node.links().clone();
                    vectors.push(Some(node.vector().to_vec()));
                    out_conns.push(Some(links.out_levels().to_vec()));
                    in_conns.push(links.in_levels().map(<[Vec<NodeId>]>::to_vec));
                    invert.push(Some(node.external_id()));
                }
                None => {
                    vectors.push(None);
                    out_conns.push(None);
                    in_conns.push(None);
                    invert.push(None);
                }
            }
        }

        write_artifact(&dir.join(VECTORS_FILE), &vectors)?;
        write_artifact(&dir.join(OUT_CONNS_FILE), &out_conns)?;
        if self.params.remove_enabled {
            write_artifact(&dir.join(IN_CONNS_FILE), &in_conns)?;
        }
        write_artifact(&dir.join(INVERT_LOOKUP_FILE), &invert)?;

        tracing::debug!(nodes = node_count, path = %dir.display(), "segment snapshot written");
        Ok(())
    }

    /// Loads a segment from artifacts previously written by
    /// [`Self::snapshot`], with a freshly created visited pool.
    ///
    /// # Errors
    ///
    /// See [`Self::load_with_pool`].
    pub fn load<P: AsRef<Path>>(
        dir: P,
        params: SegmentParams,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let pool = Arc::new(BitsetPool::new(params.max_node_count));
        Self::load_with_pool(dir, params, metric, pool)
    }

    /// Loads a segment from artifacts, drawing visited bitsets from a
    /// shared pool.
    ///
    /// `params` must match the configuration the snapshot was taken
    /// under; the artifacts carry no parameters of their own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`]/[`Error::Serialization`] when an artifact
    /// cannot be read, and [`Error::Corrupted`] when the artifacts
    /// disagree with each other or with `params`.
    pub fn load_with_pool<P: AsRef<Path>>(
        dir: P,
        params: SegmentParams,
        metric: DistanceMetric,
        visited_pool: Arc<BitsetPool>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let segment = Self::with_pool(params, metric, visited_pool)?;

        let vectors: VectorsTable = read_artifact(&dir.join(VECTORS_FILE))?;
        let out_conns: ConnsTable = read_artifact(&dir.join(OUT_CONNS_FILE))?;
        let in_conns: Option<ConnsTable> = if params.remove_enabled {
            Some(read_artifact(&dir.join(IN_CONNS_FILE))?)
        } else {
            None
        };
        let invert: InvertTable = read_artifact(&dir.join(INVERT_LOOKUP_FILE))?;

        let node_count = vectors.len();
        if node_count > params.max_node_count {
            return Err(Error::Corrupted(format!(
                "snapshot holds {node_count} slots, segment capacity is {}",
                params.max_node_count
            )));
        }
        if out_conns.len() != node_count || invert.len() != node_count {
            return Err(Error::Corrupted(
                "artifact slot counts disagree".into(),
            ));
        }
        if let Some(table) = &in_conns {
            if table.len() != node_count {
                return Err(Error::Corrupted(
                    "in-connection slot count disagrees".into(),
                ));
            }
        }

        let mut seen_external = FxHashSet::default();

        for internal_id in 0..node_count {
            let (vector, out, external_id) = match (
                &vectors[internal_id],
                &out_conns[internal_id],
                &invert[internal_id],
            ) {
                (Some(vector), Some(out), Some(external_id)) => {
                    (vector.clone(), out.clone(), *external_id)
                }
                (None, None, None) => continue,
                _ => {
                    return Err(Error::Corrupted(format!(
                        "slot {internal_id} is live in some artifacts and absent in others"
                    )))
                }
            };

            if vector.len() != params.dimension {
                return Err(Error::Corrupted(format!(
                    "slot {internal_id} holds a {}-dimensional vector, expected {}",
                    vector.len(),
                    params.dimension
                )));
            }
            if out.is_empty() {
                return Err(Error::Corrupted(format!(
                    "slot {internal_id} has no layers"
                )));
            }
            if out
                .iter()
                .flatten()
                .any(|&neighbor| neighbor >= node_count)
            {
                return Err(Error::Corrupted(format!(
                    "slot {internal_id} references a neighbor beyond the highwater mark"
                )));
            }
            if !seen_external.insert(external_id) {
                return Err(Error::Corrupted(format!(
                    "external id {external_id} appears in more than one slot"
                )));
            }

            let inc = match &in_conns {
                Some(table) => {
                    let Some(inc) = table[internal_id].clone() else {
                        return Err(Error::Corrupted(format!(
                            "slot {internal_id} is missing its in-connections"
                        )));
                    };
                    if inc.len() != out.len() {
                        return Err(Error::Corrupted(format!(
                            "slot {internal_id} has {} in-layers but {} out-layers",
                            inc.len(),
                            out.len()
                        )));
                    }
                    Some(inc)
                }
                None => None,
            };

            let node = Arc::new(Node::from_links(
                internal_id,
                Item::new(external_id, vector),
                out,
                inc,
            ));
            *segment.nodes[internal_id].write() = Some(node);
            segment
                .lookup
                .put(external_id, internal_id + params.base_id);
        }

        {
            let mut alloc = segment.alloc.lock();
            alloc.node_count = node_count;
            // reverse push: the lowest freed slot is recycled first
            for internal_id in (0..node_count).rev() {
                if segment.nodes[internal_id].read().is_none() {
                    alloc.freed_ids.push(internal_id);
                }
            }
        }

        // the entry point is the live node of maximal level; ties go to
        // the smallest internal id
        let mut entry: Option<Arc<Node>> = None;
        for internal_id in 0..node_count {
            if let Some(node) = segment.node_at(internal_id) {
                let taller = entry
                    .as_ref()
                    .map_or(true, |cur| node.max_level() > cur.max_level());
                if taller {
                    entry = Some(node);
                }
            }
        }
        *segment.entry_point.write() = entry;

        tracing::debug!(
            nodes = segment.len(),
            highwater = node_count,
            path = %dir.display(),
            "segment loaded from snapshot"
        );
        Ok(segment)
    }
}

fn write_artifact<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, value).map_err(|err| Error::Serialization(err.to_string()))
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    bincode::deserialize_from(reader).map_err(|err| Error::Serialization(err.to_string()))
}
