//! Chunks plugin: copy encrypted chunk records out of corrupted nodes.
//!
//! Pure extraction: the header fields and the still-encrypted body are copied
//! into an owned [`ChunkRecord`]; decryption happens later in the pipeline,
//! once the key dependencies are known.

use crate::error::Skip;
use poolfmt::{ChunkHeader, NodeView, PoolImage};
use tracing::{debug, warn};

/// One harvested chunk, independent of the image buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub node_offset: u64,
    /// Chunk identity; not necessarily the harvest position.
    pub index: u64,
    /// This chunk's key value, used to decrypt *other* chunks.
    pub key: u64,
    /// Checksum of the plaintext body.
    pub checksum: u32,
    pub encrypted_body: Vec<u8>,
}

/// Output of a chunks run.
#[derive(Debug, Clone, Default)]
pub struct ChunkHarvest {
    /// Records in list order.
    pub chunks: Vec<ChunkRecord>,
    pub skipped: Vec<Skip>,
}

/// Walk the image and harvest every node whose flags contain `flag_mask`.
pub fn run(image: &PoolImage<'_>, flag_mask: u64) -> ChunkHarvest {
    let mut harvest = ChunkHarvest::default();

    for node in image.walk().filter(|n| n.flags.contains(flag_mask)) {
        if node.is_truncated() {
            warn!(
                "node {:#x}: declares {} payload bytes, only {} present",
                node.offset,
                node.data_size,
                node.payload.len()
            );
        }
        match harvest_chunk(&node) {
            Ok(chunk) => {
                debug!(
                    "chunk {} at node {:#x}: key={:#x} checksum={:#010x} size={}",
                    chunk.index,
                    chunk.node_offset,
                    chunk.key,
                    chunk.checksum,
                    chunk.encrypted_body.len()
                );
                harvest.chunks.push(chunk);
            }
            Err(skip) => {
                warn!("skipping corrupted node: {}", skip);
                harvest.skipped.push(skip);
            }
        }
    }

    debug!(
        "chunks: {} harvested, {} skipped",
        harvest.chunks.len(),
        harvest.skipped.len()
    );
    harvest
}

/// Copy one chunk record out of a corrupted node.
pub fn harvest_chunk(node: &NodeView<'_>) -> Result<ChunkRecord, Skip> {
    let reader = node.payload_reader();

    let header = ChunkHeader::read(&reader, 0).map_err(|_| Skip::TruncatedChunk {
        node_offset: node.offset,
        declared: ChunkHeader::SIZE as u64,
        available: reader.len(),
    })?;

    let room = reader.remaining_from(ChunkHeader::SIZE);
    let body = usize::try_from(header.size)
        .ok()
        .filter(|&size| size <= room)
        .and_then(|size| reader.read_bytes(ChunkHeader::SIZE, size).ok())
        .ok_or(Skip::TruncatedChunk {
            node_offset: node.offset,
            declared: header.size,
            available: room,
        })?;

    Ok(ChunkRecord {
        node_offset: node.offset,
        index: header.index,
        key: header.key,
        checksum: header.checksum,
        encrypted_body: body.to_vec(),
    })
}
