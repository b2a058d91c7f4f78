//! Error types for the decode pipeline.
//!
//! Two families: [`DecodeError`] aborts a decode, [`Skip`] records a node or
//! chunk that was dropped while the decode carried on.

use poolfmt::PoolError;
use serde::Serialize;
use thiserror::Error;

/// Errors that abort a decode.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The image cannot hold the head node.
    #[error("Malformed image: {len} bytes, need at least {need}")]
    MalformedImage { len: usize, need: usize },

    /// The node list leaves the image, loops, or exceeds its node bound.
    #[error("Corrupt node graph at offset {offset:#x}: {message}")]
    CorruptGraph { offset: u64, message: String },

    /// The dependency message could not be decoded; no chunk can be resolved.
    #[error("Dependency message parse error ({message_len} bytes): {reason}")]
    DependencyParse { message_len: usize, reason: String },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DecodeError {
    /// Create a DependencyParse error.
    pub fn dependency_parse(message_len: usize, reason: impl Into<String>) -> Self {
        DecodeError::DependencyParse {
            message_len,
            reason: reason.into(),
        }
    }
}

impl From<PoolError> for DecodeError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::MalformedImage { len, need } => DecodeError::MalformedImage { len, need },
            PoolError::CorruptGraph { offset, msg } => DecodeError::CorruptGraph {
                offset,
                message: msg,
            },
            PoolError::OutOfBounds { offset, length, size } => DecodeError::CorruptGraph {
                offset,
                message: format!("read of {} bytes outside a {}-byte region", length, size),
            },
        }
    }
}

/// Result type for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A node or chunk dropped from the decode, with enough context to find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Skip {
    /// An interesting node's hint or sub-payload does not fit its payload.
    TruncatedHint {
        node_offset: u64,
        declared: i64,
        available: usize,
    },
    /// A corrupted node's chunk header or body does not fit its payload.
    TruncatedChunk {
        node_offset: u64,
        declared: u64,
        available: usize,
    },
    /// No dependency edge names this chunk.
    NoKeyMapping { index: u64 },
    /// The chunk's key source was never harvested.
    KeySourceMissing { index: u64, key_source: u64 },
    /// Decrypted plaintext does not match the stored checksum.
    ChecksumMismatch {
        index: u64,
        expected: u32,
        computed: u32,
    },
}

impl Skip {
    /// The chunk index this skip drops, for chunk-level skips.
    pub fn chunk_index(&self) -> Option<u64> {
        match self {
            Skip::NoKeyMapping { index }
            | Skip::KeySourceMissing { index, .. }
            | Skip::ChecksumMismatch { index, .. } => Some(*index),
            Skip::TruncatedHint { .. } | Skip::TruncatedChunk { .. } => None,
        }
    }
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Skip::TruncatedHint {
                node_offset,
                declared,
                available,
            } => write!(
                f,
                "truncated hint in node {:#x}: declared {} bytes, {} available",
                node_offset, declared, available
            ),
            Skip::TruncatedChunk {
                node_offset,
                declared,
                available,
            } => write!(
                f,
                "truncated chunk in node {:#x}: declared {} bytes, {} available",
                node_offset, declared, available
            ),
            Skip::NoKeyMapping { index } => write!(f, "chunk {}: no key mapping", index),
            Skip::KeySourceMissing { index, key_source } => write!(
                f,
                "chunk {}: key source chunk {} was not harvested",
                index, key_source
            ),
            Skip::ChecksumMismatch {
                index,
                expected,
                computed,
            } => write!(
                f,
                "chunk {}: checksum mismatch (expected {:#010x}, computed {:#010x})",
                index, expected, computed
            ),
        }
    }
}
