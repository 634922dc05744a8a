//! Undo the producer's payload obfuscation.
//!
//! The payload is XORed word by word (32-bit, little-endian) with [`SCRAMBLE_TABLE`], starting at
//! a table offset taken from the header's scramble key. XOR makes the transform its own inverse.

use byteorder::{ByteOrder, LittleEndian};

use crate::tables::SCRAMBLE_TABLE;

/// Bits 12..20 of the scramble key select the first keystream entry.
#[inline]
pub fn scramble_number(scramble_key: u32) -> u8 {
    ((scramble_key >> 12) & 0xff) as u8
}

/// Descrambles `payload`. The output has the same length as the input.
///
/// Only whole words are XORed; the 0-3 trailing bytes are copied through untouched.
pub fn descramble(payload: &[u8], scramble_key: u32) -> Vec<u8> {
    let start = usize::from(scramble_number(scramble_key));
    let mut out = payload.to_vec();

    let whole_words = payload.len() / 4 * 4;
    for (i, word) in out[..whole_words].chunks_exact_mut(4).enumerate() {
        let key = SCRAMBLE_TABLE[(i + start) % SCRAMBLE_TABLE.len()];
        let value = LittleEndian::read_u32(word) ^ key;
        LittleEndian::write_u32(word, value);
    }

    out
}
