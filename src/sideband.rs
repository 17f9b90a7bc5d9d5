//! Frame sideband: how each module was framed when it was unpacked.
//!
//! The descriptor index inside a compressed frame is opaque and cannot be
//! recovered from the decompressed module, so unpack records it here and
//! pack reads it back.  Stored as JSON next to the extracted files.
//!
//! A missing sideband, or a module missing from it, is not an error: the
//! module is repacked as a compressed frame with descriptor index 0, which
//! is lossy with respect to the original container.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::frame::Framing;

pub const DEFAULT_SIDEBAND_NAME: &str = "frames.json";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    pub compressed:       bool,
    #[serde(default)]
    pub descriptor_index: u32,
}

impl From<Framing> for FrameRecord {
    fn from(f: Framing) -> Self {
        match f {
            Framing::Raw => FrameRecord { compressed: false, descriptor_index: 0 },
            Framing::Compressed { descriptor_index } => FrameRecord { compressed: true, descriptor_index },
        }
    }
}

impl From<FrameRecord> for Framing {
    fn from(r: FrameRecord) -> Self {
        if r.compressed {
            Framing::Compressed { descriptor_index: r.descriptor_index }
        } else {
            Framing::Raw
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct FrameSideband {
    pub entries: BTreeMap<String, FrameRecord>,
}

impl FrameSideband {
    pub fn record(&mut self, name: &str, framing: Framing) {
        self.entries.insert(name.to_owned(), framing.into());
    }

    pub fn framing(&self, name: &str) -> Option<Framing> {
        self.entries.get(name).map(|r| (*r).into())
    }

    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Load from `path`; `Ok(None)` if the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        Self::from_bytes(&bytes)
            .map(Some)
            .map_err(|e| StoreError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = self
            .to_bytes()
            .map_err(|e| StoreError::io(path, io::Error::new(io::ErrorKind::Other, e)))?;
        fs::write(path, bytes).map_err(|e| StoreError::io(path, e))
    }
}
