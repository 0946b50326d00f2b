//! Error types for `PlexDB` segments.
//!
//! This module provides a unified error type for all segment operations.
//! Error codes follow the pattern `PLEX-XXX` for easy debugging.

use thiserror::Error;

/// Result type alias for `PlexDB` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in segment operations.
///
/// The boolean mutation APIs (`add`, `remove`) collapse the first five
/// variants into `false`; the `try_` variants surface them typed.
#[derive(Error, Debug)]
pub enum Error {
    /// Segment is full and has no recycled ids (PLEX-001).
    #[error("[PLEX-001] Segment capacity of {capacity} nodes exceeded")]
    CapacityExceeded {
        /// Configured `max_node_count` of the segment.
        capacity: usize,
    },

    /// External id already lives in a different segment (PLEX-002).
    #[error("[PLEX-002] External id {external_id} is mapped outside this segment's id range")]
    DuplicateInOtherSegment {
        /// The conflicting external id.
        external_id: u64,
    },

    /// Duplicate external id but the segment cannot remove (PLEX-003).
    #[error("[PLEX-003] External id {external_id} already present and removal is disabled")]
    UpdateDisabled {
        /// The conflicting external id.
        external_id: u64,
    },

    /// Removal requested on a segment built without in-edge tracking (PLEX-004).
    #[error("[PLEX-004] Removal is disabled for this segment")]
    RemoveDisabled,

    /// No live node occupies the given slot (PLEX-005).
    #[error("[PLEX-005] Internal id {internal_id} does not refer to a live node")]
    NotFound {
        /// The internal id that failed to resolve.
        internal_id: usize,
    },

    /// Vector dimension mismatch (PLEX-006).
    #[error("[PLEX-006] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Configuration error (PLEX-007).
    #[error("[PLEX-007] Configuration error: {0}")]
    Config(String),

    /// IO error (PLEX-008).
    #[error("[PLEX-008] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (PLEX-009).
    #[error("[PLEX-009] Serialization error: {0}")]
    Serialization(String),

    /// Snapshot corrupted (PLEX-010).
    ///
    /// Indicates that snapshot artifacts are inconsistent with each other
    /// or with the supplied parameters.
    #[error("[PLEX-010] Snapshot corrupted: {0}")]
    Corrupted(String),
}

impl Error {
    /// Returns the error code (e.g., "PLEX-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "PLEX-001",
            Self::DuplicateInOtherSegment { .. } => "PLEX-002",
            Self::UpdateDisabled { .. } => "PLEX-003",
            Self::RemoveDisabled => "PLEX-004",
            Self::NotFound { .. } => "PLEX-005",
            Self::DimensionMismatch { .. } => "PLEX-006",
            Self::Config(_) => "PLEX-007",
            Self::Io(_) => "PLEX-008",
            Self::Serialization(_) => "PLEX-009",
            Self::Corrupted(_) => "PLEX-010",
        }
    }

    /// Returns true if this error is recoverable.
    ///
    /// A corrupted snapshot is not: the artifacts must be rebuilt.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Corrupted(_))
    }
}
