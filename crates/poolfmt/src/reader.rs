//! ByteReader: explicit little-endian field reads over an image slice.
//!
//! Every header in a pool image is decoded through this reader rather than by
//! reinterpreting memory. A reader remembers the absolute image offset of its
//! first byte so that errors always name a position in the full image.

use crate::error::{PoolError, PoolResult};

/// Bounds-checked reader over a borrowed byte slice.
///
/// # Example
///
/// ```rust
/// use poolfmt::ByteReader;
///
/// let bytes = 0x1122_3344_5566_7788u64.to_le_bytes();
/// let reader = ByteReader::new(&bytes);
/// assert_eq!(reader.read_u64_at(0).unwrap(), 0x1122_3344_5566_7788);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    base: u64,
}

impl<'a> ByteReader<'a> {
    /// Create a reader whose first byte sits at image offset 0.
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, base: 0 }
    }

    /// Create a reader whose first byte sits at image offset `base`.
    pub fn with_base(bytes: &'a [u8], base: u64) -> Self {
        ByteReader { bytes, base }
    }

    /// Absolute image offset of the first byte.
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes left from `offset` to the end (0 if `offset` is past the end).
    pub fn remaining_from(&self, offset: usize) -> usize {
        self.bytes.len().saturating_sub(offset)
    }

    /// Borrow `length` bytes at `offset`.
    pub fn read_bytes(&self, offset: usize, length: usize) -> PoolResult<&'a [u8]> {
        let end = offset.checked_add(length).ok_or_else(|| self.out_of_bounds(offset, length))?;
        self.bytes
            .get(offset..end)
            .ok_or_else(|| self.out_of_bounds(offset, length))
    }

    fn read_array<const N: usize>(&self, offset: usize) -> PoolResult<[u8; N]> {
        let bytes = self.read_bytes(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Read a u32 (little-endian).
    pub fn read_u32_at(&self, offset: usize) -> PoolResult<u32> {
        self.read_array::<4>(offset).map(u32::from_le_bytes)
    }

    /// Read a u64 (little-endian).
    pub fn read_u64_at(&self, offset: usize) -> PoolResult<u64> {
        self.read_array::<8>(offset).map(u64::from_le_bytes)
    }

    /// Read an i64 (little-endian).
    pub fn read_i64_at(&self, offset: usize) -> PoolResult<i64> {
        self.read_array::<8>(offset).map(i64::from_le_bytes)
    }

    fn out_of_bounds(&self, offset: usize, length: usize) -> PoolError {
        PoolError::OutOfBounds {
            offset: self.base + offset as u64,
            length,
            size: self.bytes.len(),
        }
    }
}
