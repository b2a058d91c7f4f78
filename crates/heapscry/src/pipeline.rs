//! Decode pipeline: load → hints + chunks → resolve keys → decrypt, verify, assemble.

use crate::cipher::xor_transform;
use crate::config::DecodeConfig;
use crate::error::{DecodeResult, Skip};
use crate::plugins::chunks::{self, ChunkRecord};
use crate::plugins::hints;
use crate::report::DecodeReport;
use crate::resolve::{self, DependencyDecoder, MessageDecoder};
use poolfmt::PoolImage;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// The checksum every chunk plaintext is verified against (CRC-32/IEEE).
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Verified plaintexts assembled in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    pub output: Vec<u8>,
    pub output_checksum: u32,
    /// Indices whose plaintext made it into `output`, ascending.
    pub accepted: Vec<u64>,
    pub skipped: Vec<Skip>,
}

/// Decrypt every chunk that has a key, keep the ones whose checksum matches,
/// and concatenate them by ascending index. Chunks without a key are ignored
/// here; the resolver already reported them.
///
/// When several records share an index, only the last one harvested is
/// decrypted; earlier ones never reach the output.
pub fn decrypt_and_assemble(chunks: &[ChunkRecord], keys: &BTreeMap<u64, u64>) -> Assembly {
    let mut accepted: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
    let mut skipped = Vec::new();

    let last_of: HashMap<u64, usize> = chunks
        .iter()
        .enumerate()
        .map(|(pos, chunk)| (chunk.index, pos))
        .collect();

    for (pos, chunk) in chunks.iter().enumerate() {
        if last_of.get(&chunk.index) != Some(&pos) {
            debug!(
                "chunk {} (node {:#x}): superseded by a later record",
                chunk.index, chunk.node_offset
            );
            continue;
        }
        let Some(&key) = keys.get(&chunk.index) else {
            continue;
        };
        let plaintext = xor_transform(&chunk.encrypted_body, key);
        let computed = checksum(&plaintext);

        if computed != chunk.checksum {
            warn!(
                "chunk {} (node {:#x}): checksum mismatch, expected {:#010x} computed {:#010x}",
                chunk.index, chunk.node_offset, chunk.checksum, computed
            );
            skipped.push(Skip::ChecksumMismatch {
                index: chunk.index,
                expected: chunk.checksum,
                computed,
            });
            continue;
        }

        debug!("chunk {}: verified {} bytes", chunk.index, plaintext.len());
        accepted.insert(chunk.index, plaintext);
    }

    let output: Vec<u8> = accepted.values().flatten().copied().collect();
    Assembly {
        output_checksum: checksum(&output),
        accepted: accepted.keys().copied().collect(),
        output,
        skipped,
    }
}

/// Decode a heap image with the protobuf wire decoder.
///
/// The decoder session lives for the duration of this call.
pub fn decode(bytes: &[u8], config: &DecodeConfig) -> DecodeResult<DecodeReport> {
    let decoder = MessageDecoder::open(config.message_marker.as_bytes());
    decode_with(bytes, config, &decoder)
}

/// Decode a heap image with a caller-provided decoder session.
pub fn decode_with<D: DependencyDecoder>(
    bytes: &[u8],
    config: &DecodeConfig,
    decoder: &MessageDecoder<D>,
) -> DecodeResult<DecodeReport> {
    config.validate()?;

    let image = PoolImage::load_with_limit(bytes, config.max_nodes)?;
    let extraction = hints::run(&image, config.interesting_flag);
    let harvest = chunks::run(&image, config.corrupted_flag);

    let message = decoder.parse(&extraction.dependency_blob)?;
    info!(
        "dependency message: {} edges, hint {:?}",
        message.edges.len(),
        message.hint
    );

    let resolution = resolve::resolve(&message, &harvest.chunks);
    let assembly = decrypt_and_assemble(&harvest.chunks, &resolution.keys);

    let mut skipped = extraction.skipped.clone();
    skipped.extend(harvest.skipped.iter().cloned());
    skipped.extend(resolution.skipped.iter().cloned());
    skipped.extend(assembly.skipped.iter().cloned());

    let report = DecodeReport {
        image_size: bytes.len(),
        image_checksum: image.image_checksum(),
        node_count: image.node_count(),
        hint_stream: extraction.hint_stream(),
        hints: extraction.hints,
        message_hint: message.hint,
        edges: message.edges,
        chunks_harvested: harvest.chunks.len(),
        resolved_keys: resolution.keys,
        key_dependents: resolution.dependents,
        accepted: assembly.accepted,
        skipped,
        output_len: assembly.output.len(),
        output_checksum: assembly.output_checksum,
        output: assembly.output,
    };

    info!(
        "assembled {} bytes from {} chunks (crc32 = {}), {} skipped",
        report.output_len,
        report.accepted.len(),
        report.output_checksum,
        report.skipped.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MESSAGE_MARKER;
    use crate::error::DecodeError;
    use crate::resolve::{encode_dependency_message, DependencyEdge, DependencyMessage};
    use poolfmt::testing::{chunk_payload, interesting_payload, ImageBuilder};
    use poolfmt::PoolFlags;

    const HINT_KEY: u64 = 0x6b65_795f_6869_6e74;
    const SUB_KEY: u64 = 0x7375_625f_6b65_7973;

    fn record(index: u64, key_field: u64, plaintext: &[u8], encrypt_key: u64) -> ChunkRecord {
        ChunkRecord {
            node_offset: 0,
            index,
            key: key_field,
            checksum: checksum(plaintext),
            encrypted_body: xor_transform(plaintext, encrypt_key),
        }
    }

    /// Interesting node whose sub-payload is `edges` framed by the default marker.
    fn dependency_node(edges: &[(u64, u64)]) -> Vec<u8> {
        let message = DependencyMessage {
            hint: "follow the keys".into(),
            edges: edges
                .iter()
                .map(|&(chunk_id, key_source)| DependencyEdge {
                    chunk_id,
                    key_source,
                })
                .collect(),
        };
        let mut blob = encode_dependency_message(&message);
        blob.extend_from_slice(DEFAULT_MESSAGE_MARKER.as_bytes());
        blob.extend_from_slice(b"\x1a\x04meta");
        interesting_payload(
            HINT_KEY,
            &xor_transform(b"the hint\0", HINT_KEY),
            SUB_KEY,
            &xor_transform(&blob, SUB_KEY),
        )
    }

    fn chunk_node(index: u64, key_field: u64, plaintext: &[u8], encrypt_key: u64) -> Vec<u8> {
        chunk_payload(
            index,
            key_field,
            checksum(plaintext),
            &xor_transform(plaintext, encrypt_key),
        )
    }

    #[test]
    fn test_assemble_orders_by_index() {
        let chunks = vec![
            record(2, 0, b"two ", 0x22),
            record(0, 0, b"zero ", 0x00),
            record(5, 0, b"five", 0x55),
        ];
        let keys = BTreeMap::from([(2, 0x22), (0, 0x00), (5, 0x55)]);
        let assembly = decrypt_and_assemble(&chunks, &keys);
        assert_eq!(assembly.output, b"zero two five");
        assert_eq!(assembly.accepted, vec![0, 2, 5]);
        assert_eq!(assembly.output_checksum, checksum(b"zero two five"));
        assert!(assembly.skipped.is_empty());
    }

    #[test]
    fn test_wrong_key_is_checksum_mismatch() {
        let chunks = vec![record(0, 0, b"payload bytes", 0x1234)];
        let keys = BTreeMap::from([(0, 0x9999)]);
        let assembly = decrypt_and_assemble(&chunks, &keys);
        assert!(assembly.output.is_empty());
        match &assembly.skipped[..] {
            [Skip::ChecksumMismatch {
                index,
                expected,
                computed,
            }] => {
                assert_eq!(*index, 0);
                assert_eq!(*expected, checksum(b"payload bytes"));
                assert_ne!(expected, computed);
            }
            other => panic!("unexpected skips: {other:?}"),
        }
    }

    #[test]
    fn test_chunks_without_key_are_left_out() {
        let chunks = vec![record(0, 0, b"a", 1), record(1, 0, b"b", 2)];
        let keys = BTreeMap::from([(1, 2)]);
        let assembly = decrypt_and_assemble(&chunks, &keys);
        assert_eq!(assembly.output, b"b");
        assert!(assembly.skipped.is_empty());
    }

    #[test]
    fn test_later_duplicate_replaces_earlier_record() {
        let chunks = vec![
            record(3, 0, b"first copy", 0x33),
            record(3, 0, b"second copy", 0x33),
        ];
        let keys = BTreeMap::from([(3, 0x33)]);
        let assembly = decrypt_and_assemble(&chunks, &keys);
        assert_eq!(assembly.output, b"second copy");
        assert_eq!(assembly.accepted, vec![3]);
    }

    #[test]
    fn test_failing_later_duplicate_drops_the_index() {
        let mut tampered = record(3, 0, b"second copy", 0x33);
        tampered.encrypted_body[0] ^= 0x80;
        let chunks = vec![record(3, 0, b"first copy", 0x33), tampered];
        let keys = BTreeMap::from([(3, 0x33)]);
        let assembly = decrypt_and_assemble(&chunks, &keys);
        assert!(assembly.output.is_empty());
        assert!(assembly.accepted.is_empty());
        assert!(matches!(
            assembly.skipped[..],
            [Skip::ChecksumMismatch { index: 3, .. }]
        ));
    }

    #[test]
    fn test_decode_duplicate_index_is_never_both_accepted_and_dropped() {
        let k = 0x6b;
        let mut tampered = chunk_node(1, 0x2, b"B", k);
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;

        let image = ImageBuilder::new()
            .node(PoolFlags::IS_INTERESTING, dependency_node(&[(0, 0), (1, 0)]))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(0, k, b"A", k))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(1, 0x2, b"B", k))
            .node(PoolFlags::IS_CORRUPTED, tampered)
            .build();

        let report = decode(&image, &DecodeConfig::default()).unwrap();
        assert_eq!(report.output, b"A");
        assert_eq!(report.accepted, vec![0]);
        assert_eq!(report.dropped_chunks(), vec![1]);
        for index in report.dropped_chunks() {
            assert!(!report.accepted.contains(&index));
        }
    }

    #[test]
    fn test_node_with_both_flags_feeds_both_plugins() {
        let k = 0x4b4b;
        let both = PoolFlags::IS_INTERESTING | PoolFlags::IS_CORRUPTED;
        let image = ImageBuilder::new()
            .node(PoolFlags::IS_INTERESTING, dependency_node(&[(0, 0), (3, 0)]))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(0, k, b"zero|", k))
            // A zero key field reads as an empty hint followed by a sub-payload.
            .node(both, chunk_node(3, 0, b"three", k))
            .build();

        let report = decode(&image, &DecodeConfig::default()).unwrap();
        assert_eq!(report.chunks_harvested, 2);
        assert_eq!(report.output, b"zero|three");
        assert_eq!(report.hints.len(), 2);
        assert_eq!(report.hints[1].key, 3);
        assert_eq!(report.hints[1].length, 0);
        assert_eq!(report.hints[1].sub_length, 5);
        assert!(report.is_complete());
    }

    #[test]
    fn test_decode_without_interesting_nodes_is_fatal() {
        let image = ImageBuilder::new()
            .node(PoolFlags::IS_CORRUPTED, chunk_node(0, 0x1, b"orphan", 0x1))
            .build();

        let err = decode(&image, &DecodeConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::DependencyParse { message_len: 0, .. }
        ));
    }

    #[test]
    fn test_decode_key_chain() {
        let k1 = 0x0123_4567_89ab_cdef;
        let image = ImageBuilder::new()
            .node(PoolFlags::IS_INTERESTING, dependency_node(&[(1, 0)]))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(0, k1, b"key holder", 0x5a5a))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(1, 0x77, b"plaintext B", k1))
            .build();

        let report = decode(&image, &DecodeConfig::default()).unwrap();
        assert_eq!(report.output, b"plaintext B");
        assert_eq!(report.resolved_keys.get(&1), Some(&k1));
        assert_eq!(report.mismatches(), 0);
        assert_eq!(report.message_hint, "follow the keys");
        assert_eq!(report.hints[0].text, "the hint");
        assert_eq!(report.hint_stream, b"the hint\n");
        // Chunk 0 has no edge of its own.
        assert_eq!(report.skipped, vec![Skip::NoKeyMapping { index: 0 }]);
        assert!(!report.is_complete());
        assert_eq!(report.key_dependents.get(&0), Some(&vec![1]));
    }

    #[test]
    fn test_decode_tampered_chunk() {
        let (ka, kb, kc) = (0xa1, 0xb2, 0xc3);
        let mut tampered = chunk_node(1, kb, b"middle", ka);
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;

        let image = ImageBuilder::new()
            .node(
                PoolFlags::IS_INTERESTING,
                dependency_node(&[(0, 2), (1, 0), (2, 1)]),
            )
            .node(PoolFlags::IS_CORRUPTED, chunk_node(0, ka, b"first ", kc))
            .node(PoolFlags::IS_CORRUPTED, tampered)
            .node(PoolFlags::IS_CORRUPTED, chunk_node(2, kc, b"last", kb))
            .build();

        let report = decode(&image, &DecodeConfig::default()).unwrap();
        assert_eq!(report.output, b"first last");
        assert_eq!(report.accepted, vec![0, 2]);
        assert_eq!(report.mismatches(), 1);
        assert!(matches!(
            report.skipped[..],
            [Skip::ChecksumMismatch { index: 1, .. }]
        ));
        assert_eq!(report.dropped_chunks(), vec![1]);
    }

    #[test]
    fn test_decode_missing_key_source() {
        let image = ImageBuilder::new()
            .node(
                PoolFlags::IS_INTERESTING,
                dependency_node(&[(0, 1), (1, 0), (2, 42)]),
            )
            .node(PoolFlags::IS_CORRUPTED, chunk_node(0, 0x10, b"A", 0x11))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(1, 0x11, b"B", 0x10))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(2, 0x12, b"C", 0x10))
            .build();

        let report = decode(&image, &DecodeConfig::default()).unwrap();
        assert_eq!(report.output, b"AB");
        assert_eq!(
            report.skipped,
            vec![Skip::KeySourceMissing {
                index: 2,
                key_source: 42
            }]
        );
    }

    #[test]
    fn test_decode_orders_by_index_not_traversal() {
        let keys = [(0u64, 0x100u64), (2, 0x200), (5, 0x500)];
        let image = ImageBuilder::new()
            .node(
                PoolFlags::IS_INTERESTING,
                dependency_node(&[(2, 0), (0, 5), (5, 2)]),
            )
            .node(PoolFlags::IS_CORRUPTED, chunk_node(2, keys[1].1, b"[2]", keys[0].1))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(0, keys[0].1, b"[0]", keys[2].1))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(5, keys[2].1, b"[5]", keys[1].1))
            .build();

        let report = decode(&image, &DecodeConfig::default()).unwrap();
        assert_eq!(report.output, b"[0][2][5]");
        assert!(report.is_complete());
        assert_eq!(report.output_checksum, checksum(b"[0][2][5]"));
    }

    #[test]
    fn test_decode_too_small_image() {
        let err = decode(&[0u8; 16], &DecodeConfig::default()).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedImage { len: 16, .. }));
    }

    #[test]
    fn test_decode_bad_message_is_fatal() {
        let garbage = [0x0a, 0x7f, 0x01];
        let image = ImageBuilder::new()
            .node(
                PoolFlags::IS_INTERESTING,
                interesting_payload(0, b"h", 0, &garbage),
            )
            .node(PoolFlags::IS_CORRUPTED, chunk_node(0, 1, b"x", 1))
            .build();

        let err = decode(&image, &DecodeConfig::default()).unwrap_err();
        assert!(matches!(err, DecodeError::DependencyParse { .. }));
    }

    #[test]
    fn test_decode_with_custom_corrupted_flag() {
        let config = DecodeConfig {
            corrupted_flag: 0x10,
            ..DecodeConfig::default()
        };
        let image = ImageBuilder::new()
            .node(PoolFlags::IS_INTERESTING, dependency_node(&[(0, 0)]))
            .node(PoolFlags::IS_CORRUPTED, chunk_node(9, 0x1, b"ignored", 0x1))
            .node(0x10, chunk_node(0, 0x33, b"picked", 0x33))
            .build();

        let report = decode(&image, &config).unwrap();
        assert_eq!(report.chunks_harvested, 1);
        assert_eq!(report.output, b"picked");
    }
}
