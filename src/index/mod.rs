//! Global hash tables: digest → (mapping index, local index, store id).
//!
//! Two tables follow the local entry table, one per digest width.  Both use
//! the same 20-byte record:
//!
//! ```text
//! offset  size  field
//!      0     8  digest (32-bit table: u32 LE + 4 zero bytes; 64-bit: u64 LE)
//!      8     4  mapping index
//!     12     4  local store index
//!     16     4  store id
//! ```
//!
//! Records are sorted by ascending digest so a runtime can binary-search them.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use twox_hash::{XxHash32, XxHash64};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashWidth {
    Bits32,
    Bits64,
}

impl HashWidth {
    pub fn bits(self) -> u32 {
        match self {
            HashWidth::Bits32 => 32,
            HashWidth::Bits64 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashTableRecord {
    /// Widened to 64 bits; 32-bit records never set the high half.
    pub digest:            u64,
    pub mapping_index:     u32,
    pub local_store_index: u32,
    pub store_id:          u32,
}

impl HashTableRecord {
    pub fn write<W: Write>(&self, mut writer: W, width: HashWidth) -> io::Result<()> {
        match width {
            HashWidth::Bits32 => {
                writer.write_u32::<LittleEndian>(self.digest as u32)?;
                writer.write_u32::<LittleEndian>(0)?;
            }
            HashWidth::Bits64 => writer.write_u64::<LittleEndian>(self.digest)?,
        }
        writer.write_u32::<LittleEndian>(self.mapping_index)?;
        writer.write_u32::<LittleEndian>(self.local_store_index)?;
        writer.write_u32::<LittleEndian>(self.store_id)?;
        Ok(())
    }

    /// Read one record.  A 32-bit record with non-zero padding is rejected
    /// as `InvalidData`.
    pub fn read<R: Read>(mut reader: R, width: HashWidth) -> io::Result<Self> {
        let digest = match width {
            HashWidth::Bits32 => {
                let digest = reader.read_u32::<LittleEndian>()?;
                let pad = reader.read_u32::<LittleEndian>()?;
                if pad != 0 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, format!(
                        "non-zero padding {pad:#010x} in 32-bit hash record"
                    )));
                }
                digest as u64
            }
            HashWidth::Bits64 => reader.read_u64::<LittleEndian>()?,
        };
        Ok(Self {
            digest,
            mapping_index:     reader.read_u32::<LittleEndian>()?,
            local_store_index: reader.read_u32::<LittleEndian>()?,
            store_id:          reader.read_u32::<LittleEndian>()?,
        })
    }
}

/// Sort records into on-disk order (ascending digest; stable on ties).
pub fn sorted_table(mut records: Vec<HashTableRecord>) -> Vec<HashTableRecord> {
    records.sort_by_key(|r| r.digest);
    records
}

/// Where the writer takes name digests from.
///
/// The manifest's digests and freshly computed ones are not checked against
/// each other; they may differ if the manifest was produced from a different
/// spelling of the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestSource {
    /// Use the `hash32`/`hash64` columns of the manifest verbatim.
    #[default]
    Manifest,
    /// Recompute xxHash32/xxHash64 (seed 0) over the UTF-8 name.
    Computed,
}

pub fn digest32(name: &str) -> u32 {
    XxHash32::oneshot(0, name.as_bytes())
}

pub fn digest64(name: &str) -> u64 {
    XxHash64::oneshot(0, name.as_bytes())
}
