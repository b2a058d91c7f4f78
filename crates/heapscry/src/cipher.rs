//! 64-bit XOR stream cipher used for hints, sub-payloads and chunk bodies.
//!
//! Every whole 8-byte block is XOR-ed with the key in native byte order; the
//! 1–7 trailing bytes are XOR-ed with the key's low byte. Applying the
//! transform twice with the same key restores the input.

/// XOR `data` with `key` in place.
pub fn xor_in_place(data: &mut [u8], key: u64) {
    let key_bytes = key.to_ne_bytes();
    let mut blocks = data.chunks_exact_mut(8);
    for block in &mut blocks {
        for (b, k) in block.iter_mut().zip(key_bytes.iter()) {
            *b ^= k;
        }
    }

    let low = (key & 0xFF) as u8;
    for b in blocks.into_remainder() {
        *b ^= low;
    }
}

/// XOR a copy of `data` with `key`.
pub fn xor_transform(data: &[u8], key: u64) -> Vec<u8> {
    let mut out = data.to_vec();
    xor_in_place(&mut out, key);
    out
}
