//! Dependency message framing and decoding.
//!
//! The dependency blob is a binary message followed, with no length prefix,
//! by schema metadata. The message ends where the first copy of a marker
//! substring begins. A message that itself contains the marker bytes is cut
//! short; existing images rely on this framing, so it is kept as is.
//!
//! The message is protobuf wire format:
//!
//! ```text
//! message Dependencies {
//!     string hint = 1;
//!     repeated Edge edges = 2;
//! }
//! message Edge {
//!     uint64 chunk_id = 1;
//!     uint64 key_id = 2;
//! }
//! ```

use crate::error::{DecodeError, DecodeResult};
use memchr::memmem;
use serde::Serialize;
use tracing::{debug, warn};

/// Chunk `chunk_id` is decrypted with the key harvested from chunk `key_source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub chunk_id: u64,
    pub key_source: u64,
}

/// A decoded dependency message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyMessage {
    /// Human-readable string carried by the message.
    pub hint: String,
    /// Edges in message order.
    pub edges: Vec<DependencyEdge>,
}

/// Turns framed message bytes into a [`DependencyMessage`].
pub trait DependencyDecoder {
    fn decode(&self, message: &[u8]) -> Result<DependencyMessage, String>;
}

/// Protobuf wire-format decoder for the `Dependencies` message.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireDecoder;

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

impl DependencyDecoder for WireDecoder {
    fn decode(&self, message: &[u8]) -> Result<DependencyMessage, String> {
        let mut cursor = WireCursor::new(message);
        let mut decoded = DependencyMessage::default();

        while !cursor.is_empty() {
            let (field, wire_type) = cursor.tag()?;
            match (field, wire_type) {
                (1, WIRE_LEN) => {
                    let bytes = cursor.length_delimited()?;
                    decoded.hint = String::from_utf8(bytes.to_vec())
                        .map_err(|e| format!("hint is not UTF-8: {}", e))?;
                }
                (2, WIRE_LEN) => {
                    let bytes = cursor.length_delimited()?;
                    decoded.edges.push(decode_edge(bytes)?);
                }
                _ => cursor.skip(wire_type)?,
            }
        }

        Ok(decoded)
    }
}

fn decode_edge(bytes: &[u8]) -> Result<DependencyEdge, String> {
    let mut cursor = WireCursor::new(bytes);
    let mut edge = DependencyEdge {
        chunk_id: 0,
        key_source: 0,
    };
    while !cursor.is_empty() {
        let (field, wire_type) = cursor.tag()?;
        match (field, wire_type) {
            (1, WIRE_VARINT) => edge.chunk_id = cursor.varint()?,
            (2, WIRE_VARINT) => edge.key_source = cursor.varint()?,
            _ => cursor.skip(wire_type)?,
        }
    }
    Ok(edge)
}

struct WireCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WireCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        WireCursor { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn varint(&mut self) -> Result<u64, String> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .bytes
                .get(self.pos)
                .ok_or_else(|| format!("varint runs past the end at byte {}", self.pos))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(format!("varint longer than 10 bytes ending at byte {}", self.pos))
    }

    fn tag(&mut self) -> Result<(u64, u64), String> {
        let at = self.pos;
        let key = self.varint()?;
        let field = key >> 3;
        if field == 0 {
            return Err(format!("field number 0 at byte {}", at));
        }
        Ok((field, key & 0x7))
    }

    fn take(&mut self, length: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(length)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                format!(
                    "{} bytes at byte {} run past the end ({} bytes)",
                    length,
                    self.pos,
                    self.bytes.len()
                )
            })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn length_delimited(&mut self) -> Result<&'a [u8], String> {
        let length = self.varint()?;
        let length = usize::try_from(length).map_err(|_| format!("length {} too large", length))?;
        self.take(length)
    }

    fn skip(&mut self, wire_type: u64) -> Result<(), String> {
        match wire_type {
            WIRE_VARINT => self.varint().map(|_| ()),
            WIRE_FIXED64 => self.take(8).map(|_| ()),
            WIRE_LEN => self.length_delimited().map(|_| ()),
            WIRE_FIXED32 => self.take(4).map(|_| ()),
            other => Err(format!("unsupported wire type {} at byte {}", other, self.pos)),
        }
    }
}

/// Encode a message in the wire format [`WireDecoder`] reads.
pub fn encode_dependency_message(message: &DependencyMessage) -> Vec<u8> {
    let mut out = Vec::new();
    if !message.hint.is_empty() {
        put_varint(&mut out, (1 << 3) | WIRE_LEN);
        put_varint(&mut out, message.hint.len() as u64);
        out.extend_from_slice(message.hint.as_bytes());
    }
    for edge in &message.edges {
        let mut inner = Vec::new();
        put_varint(&mut inner, (1 << 3) | WIRE_VARINT);
        put_varint(&mut inner, edge.chunk_id);
        put_varint(&mut inner, (2 << 3) | WIRE_VARINT);
        put_varint(&mut inner, edge.key_source);

        put_varint(&mut out, (2 << 3) | WIRE_LEN);
        put_varint(&mut out, inner.len() as u64);
        out.extend_from_slice(&inner);
    }
    out
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Scoped decoder session: frames blobs at the marker and decodes them.
///
/// Acquire with [`MessageDecoder::open`] before the first blob and drop it
/// after the last; nothing about the decoder lives in global state.
pub struct MessageDecoder<D: DependencyDecoder = WireDecoder> {
    finder: memmem::Finder<'static>,
    decoder: D,
}

impl MessageDecoder<WireDecoder> {
    /// Open a session with the protobuf wire decoder.
    pub fn open(marker: &[u8]) -> Self {
        Self::with_decoder(marker, WireDecoder)
    }
}

impl<D: DependencyDecoder> MessageDecoder<D> {
    /// Open a session with a custom decoder.
    pub fn with_decoder(marker: &[u8], decoder: D) -> Self {
        debug!("dependency decoder opened (marker {} bytes)", marker.len());
        MessageDecoder {
            finder: memmem::Finder::new(marker).into_owned(),
            decoder,
        }
    }

    /// The message part of a blob: everything before the first marker.
    pub fn frame<'b>(&self, blob: &'b [u8]) -> &'b [u8] {
        match self.finder.find(blob) {
            Some(end) => {
                debug!("dependency message ends at marker, byte {}", end);
                &blob[..end]
            }
            None => {
                warn!(
                    "marker not found in {}-byte dependency blob; decoding it whole",
                    blob.len()
                );
                blob
            }
        }
    }

    /// Frame and decode a blob.
    ///
    /// An empty message carries no dependency graph and is rejected, as is a
    /// blob with no interesting nodes behind it.
    pub fn parse(&self, blob: &[u8]) -> DecodeResult<DependencyMessage> {
        let message = self.frame(blob);
        if message.is_empty() {
            return Err(DecodeError::dependency_parse(
                0,
                "no dependency message before the marker",
            ));
        }
        self.decoder
            .decode(message)
            .map_err(|reason| DecodeError::dependency_parse(message.len(), reason))
    }
}

impl<D: DependencyDecoder> Drop for MessageDecoder<D> {
    fn drop(&mut self) {
        debug!("dependency decoder released");
    }
}
