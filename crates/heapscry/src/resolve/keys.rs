//! Key resolution: one indirection hop from a chunk to its key-source chunk.
//!
//! A chunk's own `key` field never decrypts that chunk. The dependency message
//! names, for each chunk, the chunk whose `key` field does. Only that single
//! hop is followed.

use crate::error::Skip;
use crate::plugins::chunks::ChunkRecord;
use crate::resolve::message::DependencyMessage;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Resolved keys plus the chunks that could not be resolved.
#[derive(Debug, Clone, Default)]
pub struct KeyResolution {
    /// Chunk index → key that decrypts it.
    pub keys: BTreeMap<u64, u64>,
    /// Key-source chunk → chunks it unlocks, in message order.
    pub dependents: BTreeMap<u64, Vec<u64>>,
    pub skipped: Vec<Skip>,
}

/// Resolve a decryption key for every harvested chunk.
///
/// When two edges name the same chunk, or two harvested chunks share an
/// index, the later one wins.
pub fn resolve(message: &DependencyMessage, chunks: &[ChunkRecord]) -> KeyResolution {
    let mut resolution = KeyResolution::default();

    let mut key_source_of: HashMap<u64, u64> = HashMap::new();
    for edge in &message.edges {
        if let Some(previous) = key_source_of.insert(edge.chunk_id, edge.key_source) {
            warn!(
                "chunk {}: edge to key source {} replaces earlier edge to {}",
                edge.chunk_id, edge.key_source, previous
            );
        }
        resolution
            .dependents
            .entry(edge.key_source)
            .or_default()
            .push(edge.chunk_id);
    }

    let mut key_value_of: HashMap<u64, u64> = HashMap::new();
    for chunk in chunks {
        if key_value_of.insert(chunk.index, chunk.key).is_some() {
            warn!(
                "chunk index {} harvested more than once; node {:#x} wins",
                chunk.index, chunk.node_offset
            );
        }
    }

    let mut seen = HashSet::new();
    for chunk in chunks.iter().filter(|c| seen.insert(c.index)) {
        let Some(&key_source) = key_source_of.get(&chunk.index) else {
            warn!("chunk {}: no dependency edge", chunk.index);
            resolution
                .skipped
                .push(Skip::NoKeyMapping { index: chunk.index });
            continue;
        };
        let Some(&key) = key_value_of.get(&key_source) else {
            warn!(
                "chunk {}: key source chunk {} not harvested",
                chunk.index, key_source
            );
            resolution.skipped.push(Skip::KeySourceMissing {
                index: chunk.index,
                key_source,
            });
            continue;
        };
        debug!(
            "chunk {}: key {:#x} from chunk {}",
            chunk.index, key, key_source
        );
        resolution.keys.insert(chunk.index, key);
    }

    resolution
}
