//! Compressed module frames.
//!
//! A module's data region holds either the raw module bytes or a frame:
//!
//! ```text
//! offset  size  field
//!      0     4  magic "XALZ"
//!      4     4  descriptor index (u32 LE, opaque; preserved for repacking)
//!      8     4  uncompressed size (u32 LE)
//!     12     …  LZ4 block
//! ```
//!
//! Raw payloads are recognised by the absence of the magic and pass through
//! [`decode`] untouched.

use byteorder::{ByteOrder, LittleEndian};

use crate::codec::{Codec, Lz4Codec};
use crate::error::{Result, StoreError};

pub const FRAME_MAGIC: &[u8; 4] = b"XALZ";
pub const FRAME_HEADER_SIZE: usize = 12;

/// How a payload is (or should be) stored in the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Raw,
    Compressed { descriptor_index: u32 },
}

impl Default for Framing {
    fn default() -> Self {
        Framing::Compressed { descriptor_index: 0 }
    }
}

impl Framing {
    /// The framing actually used for `data`.  A raw payload that begins with
    /// [`FRAME_MAGIC`] would be read back as a frame, so it is compressed
    /// with descriptor 0 instead.
    pub fn for_payload(self, data: &[u8]) -> Framing {
        match self {
            Framing::Raw if is_framed(data) => Framing::default(),
            other => other,
        }
    }
}

/// Result of [`decode`]: the module bytes plus how they were stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub data:    Vec<u8>,
    pub framing: Framing,
}

pub fn is_framed(payload: &[u8]) -> bool {
    payload.starts_with(FRAME_MAGIC)
}

/// Read `(descriptor index, uncompressed size)` from a frame header without
/// decompressing.  `None` for raw payloads or a frame too short to hold one.
pub fn peek(payload: &[u8]) -> Option<(u32, u32)> {
    if !is_framed(payload) || payload.len() < FRAME_HEADER_SIZE {
        return None;
    }
    Some((LittleEndian::read_u32(&payload[4..8]), LittleEndian::read_u32(&payload[8..12])))
}

/// Wrap `data` according to `framing`, adjusted by [`Framing::for_payload`].
pub fn encode(data: &[u8], framing: Framing) -> Result<Vec<u8>> {
    let descriptor_index = match framing.for_payload(data) {
        Framing::Raw => return Ok(data.to_vec()),
        Framing::Compressed { descriptor_index } => descriptor_index,
    };
    let uncompressed_size = u32::try_from(data.len()).map_err(|_| StoreError::Overflow)?;
    let block = Lz4Codec.compress(data);

    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + block.len());
    out.extend_from_slice(FRAME_MAGIC);
    out.extend_from_slice(&descriptor_index.to_le_bytes());
    out.extend_from_slice(&uncompressed_size.to_le_bytes());
    out.extend_from_slice(&block);
    Ok(out)
}

/// Unwrap a payload read from the data region.  `offset` is the payload's
/// position in the container and only feeds error messages.
pub fn decode(payload: &[u8], offset: u64) -> Result<DecodedPayload> {
    if !is_framed(payload) {
        return Ok(DecodedPayload { data: payload.to_vec(), framing: Framing::Raw });
    }
    if payload.len() < FRAME_HEADER_SIZE {
        return Err(StoreError::format(offset, format!(
            "compressed frame is {} bytes, shorter than its {FRAME_HEADER_SIZE}-byte header",
            payload.len()
        )));
    }
    let descriptor_index  = LittleEndian::read_u32(&payload[4..8]);
    let uncompressed_size = LittleEndian::read_u32(&payload[8..12]) as usize;
    let data = Lz4Codec
        .decompress(&payload[FRAME_HEADER_SIZE..], uncompressed_size)
        .map_err(|e| StoreError::from_codec(offset + FRAME_HEADER_SIZE as u64, e))?;
    Ok(DecodedPayload { data, framing: Framing::Compressed { descriptor_index } })
}
