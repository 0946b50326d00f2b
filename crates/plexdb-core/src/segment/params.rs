//! Segment parameters.
//!
//! This module contains the configuration for a leaf segment: graph
//! degree targets, construction beam width, level assignment and
//! capacity.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Configuration of a leaf segment, immutable after construction.
///
/// Use [`SegmentParams::new`] for defaults tuned to medium corpora, or
/// the builder-style setters for specific workloads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentParams {
    /// Vector dimension accepted by the segment.
    pub dimension: usize,
    /// Target out-degree for layers above 0 (M parameter).
    /// Higher = better recall, more memory, slower insert.
    pub m: usize,
    /// Target out-degree for layer 0 (typically `2 * m`).
    pub m0: usize,
    /// Beam width of the layer search during insertion.
    /// Higher = better recall, slower indexing.
    pub ef_construction: usize,
    /// Exponent governing layer assignment; defaults to `1 / ln(m)`.
    pub level_lambda: f64,
    /// Fixed slot capacity of the segment.
    pub max_node_count: usize,
    /// Offset added to internal ids to produce global ids, so that
    /// sibling segments hand out disjoint id ranges.
    pub base_id: usize,
    /// Whether in-edges are tracked, enabling removal and updates.
    pub remove_enabled: bool,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self::new(768)
    }
}

impl SegmentParams {
    /// Creates default parameters for the given vector dimension.
    ///
    /// `m = 16`, `ef_construction = 200` is the classic operating point:
    /// ≥95% recall on corpora up to ~100K vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self::custom(dimension, 16, 200, 100_000)
    }

    /// Creates parameters optimized for insertion speed.
    ///
    /// Lower recall but faster indexing. Best for bulk loading and
    /// development.
    #[must_use]
    pub fn fast(dimension: usize) -> Self {
        Self::custom(dimension, 8, 100, 100_000)
    }

    /// Creates parameters optimized for high recall at the cost of
    /// memory and indexing time.
    #[must_use]
    pub fn high_recall(dimension: usize) -> Self {
        Self::custom(dimension, 32, 400, 100_000)
    }

    /// Creates custom parameters.
    ///
    /// `m0` is derived as `2 * m` and `level_lambda` as `1 / ln(m)`,
    /// the assignments under which layer populations shrink
    /// geometrically by a factor of `m`.
    #[must_use]
    pub fn custom(
        dimension: usize,
        m: usize,
        ef_construction: usize,
        max_node_count: usize,
    ) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let level_lambda = if m > 1 { 1.0 / (m as f64).ln() } else { 0.0 };
        Self {
            dimension,
            m,
            m0: m * 2,
            ef_construction,
            level_lambda,
            max_node_count,
            base_id: 0,
            remove_enabled: false,
        }
    }

    /// Sets the slot capacity.
    #[must_use]
    pub const fn with_capacity(mut self, max_node_count: usize) -> Self {
        self.max_node_count = max_node_count;
        self
    }

    /// Sets the global id offset of this segment.
    #[must_use]
    pub const fn with_base_id(mut self, base_id: usize) -> Self {
        self.base_id = base_id;
        self
    }

    /// Enables or disables in-edge tracking (removal support).
    #[must_use]
    pub const fn with_remove_enabled(mut self, remove_enabled: bool) -> Self {
        self.remove_enabled = remove_enabled;
        self
    }

    /// Overrides the layer-0 out-degree target.
    #[must_use]
    pub const fn with_m0(mut self, m0: usize) -> Self {
        self.m0 = m0;
        self
    }

    /// Overrides the level assignment exponent.
    #[must_use]
    pub const fn with_level_lambda(mut self, level_lambda: f64) -> Self {
        self.level_lambda = level_lambda;
        self
    }

    /// Checks the parameters for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any field is degenerate: zero
    /// dimension or capacity, `m < 2`, `m0 < m`, or a construction beam
    /// narrower than `m`.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::Config("dimension must be non-zero".into()));
        }
        if self.max_node_count == 0 {
            return Err(Error::Config("max_node_count must be non-zero".into()));
        }
        if self.m < 2 {
            return Err(Error::Config("m must be at least 2".into()));
        }
        if self.m0 < self.m {
            return Err(Error::Config(format!(
                "m0 ({}) must be at least m ({})",
                self.m0, self.m
            )));
        }
        if self.ef_construction < self.m {
            return Err(Error::Config(format!(
                "ef_construction ({}) must be at least m ({})",
                self.ef_construction, self.m
            )));
        }
        if !self.level_lambda.is_finite() || self.level_lambda < 0.0 {
            return Err(Error::Config(
                "level_lambda must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}
