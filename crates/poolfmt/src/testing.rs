//! Synthetic pool image builder for tests.
//!
//! Nodes are stored back to back in push order; the list order defaults to
//! push order and can be permuted with [`ImageBuilder::set_order`]. The first
//! node in list order must be the first one pushed, since the head lives at
//! offset 0.

use crate::types::{encode_link, ChunkHeader, InterestingHeader, NodeHeader, SubHeader};

#[derive(Debug, Clone)]
struct PendingNode {
    flags: u64,
    payload: Vec<u8>,
    declared_size: Option<u64>,
    next_override: Option<u64>,
}

/// Builds a raw heap image byte buffer.
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    nodes: Vec<PendingNode>,
    order: Option<Vec<usize>>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node, returning its push index.
    pub fn push(&mut self, flags: u64, payload: Vec<u8>) -> usize {
        self.nodes.push(PendingNode {
            flags,
            payload,
            declared_size: None,
            next_override: None,
        });
        self.nodes.len() - 1
    }

    /// Chaining form of [`ImageBuilder::push`].
    pub fn node(mut self, flags: u64, payload: Vec<u8>) -> Self {
        self.push(flags, payload);
        self
    }

    /// Set list order as a permutation of push indices.
    pub fn set_order(&mut self, order: Vec<usize>) {
        self.order = Some(order);
    }

    /// Write `size` into the header instead of the real payload length.
    pub fn set_declared_size(&mut self, index: usize, size: u64) {
        self.nodes[index].declared_size = Some(size);
    }

    /// Write a raw stored `next` link for a node, bypassing list order.
    pub fn set_next_link(&mut self, index: usize, stored: u64) {
        self.nodes[index].next_override = Some(stored);
    }

    /// Image offset of a node's header.
    pub fn offset_of(&self, index: usize) -> u64 {
        self.nodes[..index]
            .iter()
            .map(|n| (NodeHeader::SIZE + n.payload.len()) as u64)
            .sum()
    }

    pub fn build(&self) -> Vec<u8> {
        let order: Vec<usize> = self
            .order
            .clone()
            .unwrap_or_else(|| (0..self.nodes.len()).collect());
        assert!(
            order.first().map_or(true, |&first| first == 0),
            "the head node must be pushed first"
        );

        let mut prev_of = vec![None; self.nodes.len()];
        let mut next_of = vec![None; self.nodes.len()];
        for pair in order.windows(2) {
            next_of[pair[0]] = Some(self.offset_of(pair[1]));
            prev_of[pair[1]] = Some(self.offset_of(pair[0]));
        }

        let mut out = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let next = node.next_override.unwrap_or_else(|| encode_link(next_of[i]));
            let size = node.declared_size.unwrap_or(node.payload.len() as u64);
            out.extend_from_slice(&encode_link(prev_of[i]).to_le_bytes());
            out.extend_from_slice(&next.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&node.flags.to_le_bytes());
            out.extend_from_slice(&node.payload);
        }
        out
    }
}

/// Interesting-node payload from already-encrypted hint and sub-payload bytes.
pub fn interesting_payload(hint_key: u64, hint: &[u8], sub_key: u64, sub_data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        InterestingHeader::SIZE + hint.len() + SubHeader::SIZE + sub_data.len(),
    );
    out.extend_from_slice(&hint_key.to_le_bytes());
    out.extend_from_slice(&(hint.len() as i64).to_le_bytes());
    out.extend_from_slice(hint);
    out.extend_from_slice(&sub_key.to_le_bytes());
    out.extend_from_slice(&(sub_data.len() as u64).to_le_bytes());
    out.extend_from_slice(sub_data);
    out
}

/// Corrupted-node payload from an already-encrypted body.
pub fn chunk_payload(index: u64, key: u64, checksum: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ChunkHeader::SIZE + body.len());
    out.extend_from_slice(&index.to_le_bytes());
    out.extend_from_slice(&key.to_le_bytes());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(body.len() as u64).to_le_bytes());
    out.extend_from_slice(body);
    out
}
