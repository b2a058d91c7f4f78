//! Error types for the poolfmt crate.

use thiserror::Error;

/// Pool image loading/reading errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The buffer cannot hold the head node, or the head is unreadable.
    #[error("Malformed image: {len} bytes, need at least {need} for the head node")]
    MalformedImage { len: usize, need: usize },

    /// The list walk left the buffer, revisited a node, or ran past the node bound.
    #[error("Corrupt node graph at offset {offset:#x}: {msg}")]
    CorruptGraph { offset: u64, msg: String },

    /// A field read fell outside the buffer.
    #[error("Read of {length} bytes at offset {offset:#x} is outside a {size}-byte buffer")]
    OutOfBounds { offset: u64, length: usize, size: usize },
}

impl PoolError {
    /// Create a CorruptGraph error.
    pub fn corrupt_graph(offset: u64, msg: impl Into<String>) -> Self {
        PoolError::CorruptGraph {
            offset,
            msg: msg.into(),
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
