//! On-disk layouts of a pool image.
//!
//! All integers are little-endian. Links are 1-based offsets from the start of
//! the image; `0` means "no link".

use crate::error::PoolResult;
use crate::reader::ByteReader;
use serde::Serialize;

/// Flag bits carried by every pool node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct PoolFlags(pub u64);

impl PoolFlags {
    pub const IS_FREE: u64 = 0x0001;
    pub const IS_CORRUPTED: u64 = 0x0002;
    pub const IS_INTERESTING: u64 = 0x0004;

    /// Reinterpret the signed on-disk flags field.
    pub fn from_raw(raw: i64) -> Self {
        PoolFlags(raw as u64)
    }

    /// True if every bit of `mask` is set. An empty mask never matches.
    pub fn contains(&self, mask: u64) -> bool {
        mask != 0 && self.0 & mask == mask
    }

    pub fn bits(&self) -> u64 {
        self.0
    }
}

/// Convert a stored link into a plain image offset.
pub fn relocate(link: u64) -> Option<u64> {
    link.checked_sub(1)
}

/// Encode an image offset as a stored link.
pub fn encode_link(offset: Option<u64>) -> u64 {
    offset.map(|o| o + 1).unwrap_or(0)
}

/// `Pool_Node` header: `prev | next | data_size | flags`, payload follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub prev: u64,
    pub next: u64,
    pub data_size: u64,
    pub flags: PoolFlags,
}

impl NodeHeader {
    pub const SIZE: usize = 32;

    pub fn read(reader: &ByteReader<'_>, offset: usize) -> PoolResult<Self> {
        Ok(NodeHeader {
            prev: reader.read_u64_at(offset)?,
            next: reader.read_u64_at(offset + 8)?,
            data_size: reader.read_u64_at(offset + 16)?,
            flags: PoolFlags::from_raw(reader.read_i64_at(offset + 24)?),
        })
    }

    pub fn prev_offset(&self) -> Option<u64> {
        relocate(self.prev)
    }

    pub fn next_offset(&self) -> Option<u64> {
        relocate(self.next)
    }
}

/// Header at the start of an interesting node's payload. The hint follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestingHeader {
    pub hint_key: i64,
    pub hint_length: i64,
}

impl InterestingHeader {
    pub const SIZE: usize = 16;

    pub fn read(reader: &ByteReader<'_>, offset: usize) -> PoolResult<Self> {
        Ok(InterestingHeader {
            hint_key: reader.read_i64_at(offset)?,
            hint_length: reader.read_i64_at(offset + 8)?,
        })
    }

    /// The hint key as used by the cipher.
    pub fn key(&self) -> u64 {
        self.hint_key as u64
    }
}

/// Header of the nested sub-payload that directly follows a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubHeader {
    pub key: u64,
    pub data_length: u64,
}

impl SubHeader {
    pub const SIZE: usize = 16;

    pub fn read(reader: &ByteReader<'_>, offset: usize) -> PoolResult<Self> {
        Ok(SubHeader {
            key: reader.read_u64_at(offset)?,
            data_length: reader.read_u64_at(offset + 8)?,
        })
    }
}

/// Header at the start of a corrupted node's payload:
/// `index | key | checksum | pad | size`, encrypted body follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub index: u64,
    pub key: u64,
    pub checksum: u32,
    pub size: u64,
}

impl ChunkHeader {
    pub const SIZE: usize = 32;

    pub fn read(reader: &ByteReader<'_>, offset: usize) -> PoolResult<Self> {
        Ok(ChunkHeader {
            index: reader.read_u64_at(offset)?,
            key: reader.read_u64_at(offset + 8)?,
            checksum: reader.read_u32_at(offset + 16)?,
            size: reader.read_u64_at(offset + 24)?,
        })
    }
}
