//! Pool-node heap image format.
//!
//! A heap image is one contiguous buffer holding a doubly-linked list of
//! variable-size "pool nodes". This crate provides:
//!
//! - Layout types for the node header and the two payload overlays
//!   (interesting hint payloads and encrypted chunk records)
//! - `ByteReader` for bounds-checked little-endian field reads
//! - `PoolImage` for relocating the stored 1-based offset links into an index
//!   without touching the buffer, with a traversal bound derived from its size
//! - `NodeWalker` for walking the relocated list in list order
//!
//! # Example
//!
//! ```rust,ignore
//! use poolfmt::{PoolFlags, PoolImage};
//!
//! let image = PoolImage::load(&bytes)?;
//! for node in image.walk() {
//!     if node.flags.contains(PoolFlags::IS_INTERESTING) {
//!         let reader = node.payload_reader();
//!         let key = reader.read_i64_at(0)?;
//!     }
//! }
//! ```

pub mod error;
pub mod list;
pub mod reader;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types at crate root.
pub use error::{PoolError, PoolResult};
pub use list::{NodeView, NodeWalker, PoolImage};
pub use reader::ByteReader;
pub use types::{ChunkHeader, InterestingHeader, NodeHeader, PoolFlags, SubHeader};
