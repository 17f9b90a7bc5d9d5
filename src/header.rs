//! Fixed 20-byte container header.
//!
//! ```text
//! offset  size  field
//!      0     4  magic "XABA"
//!      4     4  format version (u32 LE)
//!      8     4  local entry count
//!     12     4  global entry count
//!     16     4  store id
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{Result, StoreError};

pub const MAGIC: &[u8; 4] = b"XABA";
pub const VERSION: u32 = 1;
pub const SUPPORTED_VERSIONS: &[u32] = &[VERSION];
pub const HEADER_SIZE: usize = 20;

/// Size of one local entry record.
pub const LOCAL_ENTRY_SIZE: usize = 24;
/// Size of one record in either global hash table.
pub const HASH_RECORD_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version:            u32,
    pub local_entry_count:  u32,
    pub global_entry_count: u32,
    pub store_id:           u32,
}

impl ContainerHeader {
    /// A version-1 header with one global record per local entry.
    pub fn new(entry_count: u32, store_id: u32) -> Self {
        Self {
            version:            VERSION,
            local_entry_count:  entry_count,
            global_entry_count: entry_count,
            store_id,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.local_entry_count)?;
        writer.write_u32::<LittleEndian>(self.global_entry_count)?;
        writer.write_u32::<LittleEndian>(self.store_id)?;
        Ok(())
    }

    /// Parse a header.  The magic is checked before any further byte is
    /// consumed, the version before the counts.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|e| truncated(0, e))?;
        if &magic != MAGIC {
            return Err(StoreError::format(0, format!(
                "bad magic {:?}, expected {:?}",
                String::from_utf8_lossy(&magic),
                String::from_utf8_lossy(MAGIC),
            )));
        }
        let version = reader.read_u32::<LittleEndian>().map_err(|e| truncated(4, e))?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(StoreError::format(4, format!("unsupported version {version}")));
        }
        let local_entry_count  = reader.read_u32::<LittleEndian>().map_err(|e| truncated(8, e))?;
        let global_entry_count = reader.read_u32::<LittleEndian>().map_err(|e| truncated(12, e))?;
        let store_id           = reader.read_u32::<LittleEndian>().map_err(|e| truncated(16, e))?;
        Ok(Self { version, local_entry_count, global_entry_count, store_id })
    }

    /// Absolute offset of the first local entry record.
    pub fn local_table_start(&self) -> u64 {
        HEADER_SIZE as u64
    }

    /// Absolute offset of the 32-bit hash table.
    pub fn hash32_table_start(&self) -> u64 {
        self.local_table_start() + self.local_entry_count as u64 * LOCAL_ENTRY_SIZE as u64
    }

    /// Absolute offset of the 64-bit hash table.
    pub fn hash64_table_start(&self) -> u64 {
        self.hash32_table_start() + self.global_entry_count as u64 * HASH_RECORD_SIZE as u64
    }

    /// Absolute offset where the data region begins.
    pub fn tables_end(&self) -> u64 {
        self.hash64_table_start() + self.global_entry_count as u64 * HASH_RECORD_SIZE as u64
    }
}

fn truncated(offset: u64, err: io::Error) -> StoreError {
    StoreError::format(offset, format!("truncated header: {err}"))
}
