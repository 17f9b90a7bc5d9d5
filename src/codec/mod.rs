//! Block-compression backend for compressed module frames.
//!
//! The container only ever stores LZ4 *block* data: no LZ4 frame header and
//! no length prefix inside the compressed bytes.  The uncompressed length
//! lives in the enclosing frame header (see [`crate::frame`]), so the codec
//! takes the expected size on decompression instead of discovering it from
//! the payload.

use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Decompressed {actual} bytes, frame declares {declared}")]
    SizeMismatch { declared: usize, actual: usize },
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn compress(&self, data: &[u8]) -> Vec<u8>;
    /// Decompress `data`, which must expand to exactly `expected_len` bytes.
    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError>;
}

// ── LZ4 block ────────────────────────────────────────────────────────────────

pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn compress(&self, data: &[u8]) -> Vec<u8> {
        lz4_flex::block::compress(data)
    }

    fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        let out = lz4_flex::block::decompress(data, expected_len)
            .map_err(|e| CodecError::Decompression(e.to_string()))?;
        if out.len() != expected_len {
            return Err(CodecError::SizeMismatch { declared: expected_len, actual: out.len() });
        }
        Ok(out)
    }
}
