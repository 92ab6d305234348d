// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Chunked base64 encoding for the contents API.
//!
//! Content is encoded one chunk at a time into a single pre-sized buffer.
//! Chunks are a multiple of three bytes, so no padding appears mid-stream and
//! the concatenation is identical to encoding the whole input at once.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// 64 KiB rounded down to a multiple of three.
pub const ENCODE_CHUNK_SIZE: usize = 65_535;

/// Base64-encode `bytes` in [`ENCODE_CHUNK_SIZE`] chunks.
pub fn encode_chunked(bytes: &[u8]) -> String {
    encode_with_chunk_size(bytes, ENCODE_CHUNK_SIZE)
}

/// Base64-encode `bytes` in chunks of at most `chunk_size` bytes.
///
/// `chunk_size` is rounded down to a multiple of three (minimum three).
pub fn encode_with_chunk_size(bytes: &[u8], chunk_size: usize) -> String {
    let chunk_size = (chunk_size - chunk_size % 3).max(3);
    let capacity = base64::encoded_len(bytes.len(), true).unwrap_or(0);
    let mut encoded = String::with_capacity(capacity);

    for chunk in bytes.chunks(chunk_size) {
        STANDARD.encode_string(chunk, &mut encoded);
    }

    encoded
}
