//! PoolImage: relocates the on-disk node list into an offset index and walks it.
//!
//! The image stores `prev`/`next` as 1-based offsets from its first byte. Loading
//! never patches the buffer: it follows `next` from the head at offset 0, decodes
//! each header through [`ByteReader`], and records it in a map keyed by node
//! offset. Walking then follows the relocated links through that map.

use crate::error::{PoolError, PoolResult};
use crate::reader::ByteReader;
use crate::types::{NodeHeader, PoolFlags};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A loaded, relocated pool image borrowing the raw buffer.
#[derive(Debug)]
pub struct PoolImage<'a> {
    bytes: &'a [u8],
    nodes: HashMap<u64, NodeHeader>,
    head: u64,
    checksum: u32,
}

impl<'a> PoolImage<'a> {
    /// Load with the bound derived from the buffer size.
    pub fn load(bytes: &'a [u8]) -> PoolResult<Self> {
        Self::load_with_limit(bytes, None)
    }

    /// Load, optionally lowering the node bound below `len / NodeHeader::SIZE`.
    pub fn load_with_limit(bytes: &'a [u8], limit: Option<usize>) -> PoolResult<Self> {
        if bytes.len() < NodeHeader::SIZE {
            return Err(PoolError::MalformedImage {
                len: bytes.len(),
                need: NodeHeader::SIZE,
            });
        }

        let checksum = crc32fast::hash(bytes);
        info!("heap image: {} bytes, crc32 = {}", bytes.len(), checksum);

        let size_bound = bytes.len() / NodeHeader::SIZE;
        let max_nodes = limit.map_or(size_bound, |l| l.min(size_bound));
        let reader = ByteReader::new(bytes);

        let mut nodes = HashMap::new();
        let mut previous: Option<u64> = None;
        let mut current = Some(0u64);

        while let Some(offset) = current {
            if nodes.contains_key(&offset) {
                return Err(PoolError::corrupt_graph(
                    offset,
                    "next link revisits an already indexed node",
                ));
            }

            let header = usize::try_from(offset)
                .ok()
                .and_then(|o| NodeHeader::read(&reader, o).ok())
                .ok_or_else(|| {
                    PoolError::corrupt_graph(
                        offset,
                        match previous {
                            Some(p) => format!(
                                "node header linked from {:#x} does not fit inside the image",
                                p
                            ),
                            None => "head node header does not fit inside the image".to_string(),
                        },
                    )
                })?;

            if nodes.len() >= max_nodes {
                return Err(PoolError::corrupt_graph(
                    offset,
                    format!("list walk exceeded the {}-node bound", max_nodes),
                ));
            }

            if header.prev_offset() != previous {
                warn!(
                    "node {:#x}: prev link {:?} does not point back to {:?}",
                    offset,
                    header.prev_offset(),
                    previous
                );
            }
            debug!(
                "node {:#x}: data_size={} flags={:#x} next={:?}",
                offset,
                header.data_size,
                header.flags.bits(),
                header.next_offset()
            );

            nodes.insert(offset, header);
            previous = Some(offset);
            current = header.next_offset();
        }

        info!("relocated {} pool nodes (bound {})", nodes.len(), max_nodes);

        Ok(PoolImage {
            bytes,
            nodes,
            head: 0,
            checksum,
        })
    }

    /// Number of nodes reachable from the head.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// CRC-32 of the whole image, computed before relocation.
    pub fn image_checksum(&self) -> u32 {
        self.checksum
    }

    /// Walk the list from the head, in list order.
    pub fn walk(&self) -> NodeWalker<'_, 'a> {
        NodeWalker {
            image: self,
            current: Some(self.head),
            remaining: self.nodes.len(),
        }
    }

    fn view(&self, offset: u64, header: &NodeHeader) -> NodeView<'a> {
        // Header fit was checked while loading, so the payload start is in bounds.
        let payload_offset = offset as usize + NodeHeader::SIZE;
        let available = self.bytes.len() - payload_offset;
        let length = usize::try_from(header.data_size).map_or(available, |s| s.min(available));

        NodeView {
            offset,
            prev: header.prev_offset(),
            next: header.next_offset(),
            flags: header.flags,
            data_size: header.data_size,
            payload_offset: payload_offset as u64,
            payload: &self.bytes[payload_offset..payload_offset + length],
        }
    }
}

/// Forward iterator over a [`PoolImage`]'s node list.
///
/// Restart by calling [`PoolImage::walk`] again.
pub struct NodeWalker<'i, 'a> {
    image: &'i PoolImage<'a>,
    current: Option<u64>,
    remaining: usize,
}

impl<'i, 'a> Iterator for NodeWalker<'i, 'a> {
    type Item = NodeView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.current?;
        if self.remaining == 0 {
            return None;
        }
        let header = self.image.nodes.get(&offset)?;
        self.remaining -= 1;
        self.current = header.next_offset();
        Some(self.image.view(offset, header))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// A non-owning view of one node.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    /// Offset of the node header in the image.
    pub offset: u64,
    pub prev: Option<u64>,
    pub next: Option<u64>,
    pub flags: PoolFlags,
    /// Payload size as declared in the header.
    pub data_size: u64,
    pub payload_offset: u64,
    /// Payload bytes, clamped to the end of the image.
    pub payload: &'a [u8],
}

impl<'a> NodeView<'a> {
    /// Reader over the payload, reporting absolute image offsets.
    pub fn payload_reader(&self) -> ByteReader<'a> {
        ByteReader::with_base(self.payload, self.payload_offset)
    }

    /// True if the declared payload runs past the end of the image.
    pub fn is_truncated(&self) -> bool {
        (self.payload.len() as u64) < self.data_size
    }
}
