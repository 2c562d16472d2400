//! Test fixtures and constants for rewrap tests.

use rewrap::{Iv, ENTRY_SIZE, IV_SIZE, KEY_SIZE, TAG_SIZE};

/// The pangram used by the end-to-end seed scenarios.
pub const FOX: &[u8] = b"The quick brown fox jumps over the lazy dog.";

/// Byte length of a one-layer header: size field, base IV, tag, one entry.
pub const INITIAL_HEADER_SIZE: usize = 4 + IV_SIZE + TAG_SIZE + ENTRY_SIZE;

/// Deterministic 32-byte key: `byte` repeated.
pub fn patterned_key(byte: u8) -> [u8; KEY_SIZE] {
    [byte; KEY_SIZE]
}

/// Deterministic base IV for reproducible layering tests.
pub fn patterned_iv(byte: u8) -> Iv {
    Iv::new([byte; IV_SIZE])
}

/// Reads the big-endian size prefix of a blob.
pub fn header_size_of(blob: &[u8]) -> usize {
    u32::from_be_bytes(blob[..4].try_into().unwrap()) as usize
}
