//! Error types for the tinyirr core data plane.

use thiserror::Error;

/// Errors produced by parsing and snapshot handling.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Prefix string or wire value could not be parsed.
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Snapshot file carries the wrong magic.
    #[error("snapshot magic mismatch: {found:?}")]
    SnapshotMagic {
        /// The four bytes found where the magic was expected.
        found: [u8; 4],
    },

    /// Snapshot ended in the middle of a frame.
    #[error("snapshot truncated at offset {offset}")]
    SnapshotTruncated {
        /// Byte offset at which the read ran out.
        offset: usize,
    },

    /// Snapshot record carries an unknown type tag.
    #[error("unknown snapshot record type {tag}")]
    SnapshotRecordType {
        /// The offending tag byte.
        tag: u8,
    },

    /// Snapshot record contents are malformed.
    #[error("malformed snapshot record: {0}")]
    SnapshotRecord(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
