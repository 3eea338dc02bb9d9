use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by transfer operations on either side of the wire.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Command selector outside the recognized set.
    #[error("unrecognized command {0}")]
    InvalidCommand(u16),

    /// Malformed frame or field.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Streamed bytes did not match the transmitted digest.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// Empty store, or no entry matching the query.
    #[error("no matching entry")]
    NotFound,

    /// Peer made no progress within the read deadline.
    #[error("read timed out")]
    Timeout,

    /// Archive entry whose path would resolve outside the destination.
    #[error("path traversal attempt in archive entry {0:?}")]
    PathTraversal(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
