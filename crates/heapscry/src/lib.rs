//! heapscry: recover hidden hints and key-chained encrypted chunks from
//! pool-node heap images.
//!
//! A decode run walks the pool's node list ([`poolfmt`]), decrypts the hints
//! carried by interesting nodes, harvests the encrypted chunks carried by
//! corrupted nodes, resolves each chunk's key through the dependency message,
//! and emits the verified plaintexts in chunk-index order.

pub mod cipher;
pub mod config;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod plugins;
pub mod report;
pub mod resolve;

pub use config::DecodeConfig;
pub use error::{DecodeError, DecodeResult, Skip};
pub use pipeline::{decode, decode_with};
pub use report::DecodeReport;
