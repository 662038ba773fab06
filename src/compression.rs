//! Payload decompression utilities.
//!
//! The server gzips event payloads above 1 KiB and base64-encodes the result
//! so it stays valid inside a text `data:` line. This module undoes both
//! layers using pure-Rust `miniz_oxide` and `base64`.

use base64::{engine::general_purpose, Engine as _};
use miniz_oxide::inflate::{decompress_to_vec_with_limit, TINFLStatus};

/// Maximum decompressed payload size (64 MiB).
pub const MAX_DECOMPRESSED_PAYLOAD_BYTES: usize = 64 << 20;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_FIXED_HEADER: usize = 10;
const GZIP_TRAILER: usize = 8;

const FLAG_HCRC: u8 = 1 << 1;
const FLAG_EXTRA: u8 = 1 << 2;
const FLAG_NAME: u8 = 1 << 3;
const FLAG_COMMENT: u8 = 1 << 4;

/// Errors produced while unwrapping a compressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecompressError {
    #[error("payload is not valid base64")]
    InvalidBase64,
    #[error("payload shorter than a gzip member")]
    TooShort,
    #[error("payload has no gzip magic")]
    NotGzip,
    #[error("malformed gzip header")]
    InvalidHeader,
    #[error("inflated payload exceeds size limit")]
    TooLarge,
    /// ISIZE in the trailer disagrees with what was inflated.
    #[error("gzip trailer length mismatch")]
    LengthMismatch,
    #[error("deflate stream is corrupt")]
    DecompressFailed,
}

#[inline]
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Check if every byte is in the standard base64 alphabet (padding included).
#[inline]
pub fn is_base64_charset(data: &str) -> bool {
    data.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

/// Offset of the first deflate byte, after the optional header fields.
fn deflate_offset(data: &[u8]) -> Result<usize, DecompressError> {
    let flags = data[3];
    let mut offset = GZIP_FIXED_HEADER;

    if flags & FLAG_EXTRA != 0 {
        let len_bytes = data
            .get(offset..offset + 2)
            .ok_or(DecompressError::InvalidHeader)?;
        offset += 2 + u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
    }
    for flag in [FLAG_NAME, FLAG_COMMENT] {
        if flags & flag != 0 {
            let rest = data.get(offset..).ok_or(DecompressError::InvalidHeader)?;
            let nul = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or(DecompressError::InvalidHeader)?;
            offset += nul + 1;
        }
    }
    if flags & FLAG_HCRC != 0 {
        offset += 2;
    }

    if offset >= data.len() - GZIP_TRAILER {
        return Err(DecompressError::InvalidHeader);
    }
    Ok(offset)
}

/// Decompress a single gzip member, refusing to inflate beyond `limit` bytes.
pub fn decompress_gzip_with_limit(data: &[u8], limit: usize) -> Result<Vec<u8>, DecompressError> {
    if data.len() < GZIP_FIXED_HEADER + GZIP_TRAILER {
        return Err(DecompressError::TooShort);
    }
    if !is_gzip(data) {
        return Err(DecompressError::NotGzip);
    }

    let start = deflate_offset(data)?;
    let (body, trailer) = data[start..].split_at(data.len() - start - GZIP_TRAILER);

    let inflated = decompress_to_vec_with_limit(body, limit).map_err(|e| match e.status {
        TINFLStatus::HasMoreOutput => DecompressError::TooLarge,
        _ => DecompressError::DecompressFailed,
    })?;

    // ISIZE is the uncompressed length modulo 2^32.
    let expected_len = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
    if inflated.len() as u32 != expected_len {
        return Err(DecompressError::LengthMismatch);
    }
    Ok(inflated)
}

/// Decode a base64 text payload and gunzip it.
pub fn decompress_base64_gzip(text: &str) -> Result<Vec<u8>, DecompressError> {
    let raw = general_purpose::STANDARD
        .decode(text.trim().as_bytes())
        .map_err(|_| DecompressError::InvalidBase64)?;
    decompress_gzip_with_limit(&raw, MAX_DECOMPRESSED_PAYLOAD_BYTES)
}
