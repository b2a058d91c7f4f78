//! Decode report: everything a run recovered, plus what it had to drop.

use crate::error::Skip;
use crate::plugins::hints::DecodedHint;
use crate::resolve::DependencyEdge;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct DecodeReport {
    pub image_size: usize,
    /// CRC-32 of the raw image, for matching a report to its input.
    pub image_checksum: u32,
    pub node_count: usize,
    pub hints: Vec<DecodedHint>,
    /// Free-form string carried by the dependency message.
    pub message_hint: String,
    pub edges: Vec<DependencyEdge>,
    pub chunks_harvested: usize,
    /// Chunk index → key used to decrypt it.
    pub resolved_keys: BTreeMap<u64, u64>,
    /// Key-source chunk → chunks it unlocks, in message order.
    pub key_dependents: BTreeMap<u64, Vec<u64>>,
    /// Chunk indices present in `output`, ascending.
    pub accepted: Vec<u64>,
    pub skipped: Vec<Skip>,
    pub output_len: usize,
    pub output_checksum: u32,
    #[serde(skip)]
    pub output: Vec<u8>,
    #[serde(skip)]
    pub hint_stream: Vec<u8>,
}

impl DecodeReport {
    /// True when nothing was skipped anywhere in the run.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Indices of chunks that were harvested but did not make it into the output.
    pub fn dropped_chunks(&self) -> Vec<u64> {
        self.skipped.iter().filter_map(Skip::chunk_index).collect()
    }

    /// Number of chunks rejected by checksum verification.
    pub fn mismatches(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| matches!(s, Skip::ChecksumMismatch { .. }))
            .count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
