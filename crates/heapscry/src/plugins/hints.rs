//! Hints plugin: decrypt the hidden hints carried by interesting nodes.
//!
//! An interesting node's payload is `hint_key | hint_length | hint bytes`,
//! followed directly by a nested sub-payload `key | data_length | data`. Both
//! the hint and the sub-payload data are XOR-ciphered under their own key.
//! The decrypted sub-payloads, concatenated in list order, form the
//! dependency blob consumed by the resolver.

use crate::cipher::xor_transform;
use crate::error::Skip;
use poolfmt::{InterestingHeader, NodeView, PoolImage, SubHeader};
use serde::Serialize;
use tracing::{debug, info, warn};

/// One decrypted hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedHint {
    pub node_offset: u64,
    pub key: u64,
    pub length: usize,
    /// Decrypted hint bytes, exactly `length` long.
    #[serde(skip)]
    pub plaintext: Vec<u8>,
    /// Hint text up to the first NUL, lossily decoded.
    pub text: String,
    pub sub_key: u64,
    pub sub_length: usize,
}

/// Output of a hints run.
#[derive(Debug, Clone, Default)]
pub struct HintExtraction {
    pub hints: Vec<DecodedHint>,
    /// Concatenated decrypted sub-payloads, in list order.
    pub dependency_blob: Vec<u8>,
    pub skipped: Vec<Skip>,
}

impl HintExtraction {
    /// Each hint's text, newline-terminated, in list order.
    pub fn hint_stream(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for hint in &self.hints {
            out.extend_from_slice(until_nul(&hint.plaintext));
            out.push(b'\n');
        }
        out
    }
}

/// Walk the image and decode every node whose flags contain `flag_mask`.
pub fn run(image: &PoolImage<'_>, flag_mask: u64) -> HintExtraction {
    let mut extraction = HintExtraction::default();

    for node in image.walk().filter(|n| n.flags.contains(flag_mask)) {
        if node.is_truncated() {
            warn!(
                "node {:#x}: declares {} payload bytes, only {} present",
                node.offset,
                node.data_size,
                node.payload.len()
            );
        }
        match extract_hint(&node) {
            Ok((hint, data)) => {
                info!(
                    "hint at node {:#x} (key={:#x}, length={}): {}",
                    hint.node_offset, hint.key, hint.length, hint.text
                );
                extraction.dependency_blob.extend_from_slice(&data);
                extraction.hints.push(hint);
            }
            Err(skip) => {
                warn!("skipping interesting node: {}", skip);
                extraction.skipped.push(skip);
            }
        }
    }

    debug!(
        "hints: {} decoded, {} skipped, {} blob bytes",
        extraction.hints.len(),
        extraction.skipped.len(),
        extraction.dependency_blob.len()
    );
    extraction
}

/// Decode one interesting node into its hint and decrypted sub-payload data.
pub fn extract_hint(node: &NodeView<'_>) -> Result<(DecodedHint, Vec<u8>), Skip> {
    let reader = node.payload_reader();
    let truncated = |declared: i64, available: usize| Skip::TruncatedHint {
        node_offset: node.offset,
        declared,
        available,
    };

    let header = InterestingHeader::read(&reader, 0)
        .map_err(|_| truncated(InterestingHeader::SIZE as i64, reader.len()))?;

    let hint_start = InterestingHeader::SIZE;
    let hint_room = reader.remaining_from(hint_start);
    let hint_len = usize::try_from(header.hint_length)
        .ok()
        .filter(|&len| len <= hint_room)
        .ok_or_else(|| truncated(header.hint_length, hint_room))?;
    let hint_bytes = reader
        .read_bytes(hint_start, hint_len)
        .map_err(|_| truncated(header.hint_length, hint_room))?;
    let plaintext = xor_transform(hint_bytes, header.key());

    let sub_start = hint_start + hint_len;
    let sub = SubHeader::read(&reader, sub_start)
        .map_err(|_| truncated(SubHeader::SIZE as i64, reader.remaining_from(sub_start)))?;

    let data_start = sub_start + SubHeader::SIZE;
    let data_room = reader.remaining_from(data_start);
    let declared = i64::try_from(sub.data_length).unwrap_or(i64::MAX);
    let data_len = usize::try_from(sub.data_length)
        .ok()
        .filter(|&len| len <= data_room)
        .ok_or_else(|| truncated(declared, data_room))?;
    let data_bytes = reader
        .read_bytes(data_start, data_len)
        .map_err(|_| truncated(declared, data_room))?;
    let data = xor_transform(data_bytes, sub.key);

    debug!(
        "node {:#x}: hint key={:#x} length={}, sub-payload key={:#x} length={}",
        node.offset,
        header.key(),
        hint_len,
        sub.key,
        data_len
    );

    let hint = DecodedHint {
        node_offset: node.offset,
        key: header.key(),
        length: hint_len,
        text: String::from_utf8_lossy(until_nul(&plaintext)).into_owned(),
        plaintext,
        sub_key: sub.key,
        sub_length: data_len,
    };
    Ok((hint, data))
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    &bytes[..end]
}
