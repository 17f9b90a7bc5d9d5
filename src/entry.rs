//! Local entry records and the in-memory module model.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// An absolute `(offset, size)` span inside the container.
///
/// A side-data region is absent when either half is zero.  Writers emit
/// exactly `(0, 0)`; other zero forms are read as absent too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub offset: u32,
    pub size:   u32,
}

impl Region {
    pub const ABSENT: Region = Region { offset: 0, size: 0 };

    pub fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    pub fn is_absent(&self) -> bool {
        self.offset == 0 || self.size == 0
    }

    /// Absent, but not in the canonical `(0, 0)` form.
    pub fn is_degenerate(&self) -> bool {
        self.is_absent() && *self != Self::ABSENT
    }

    pub fn as_option(&self) -> Option<Region> {
        if self.is_absent() { None } else { Some(*self) }
    }

    /// One past the last byte, widened so it cannot overflow.
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.size as u64
    }
}

/// The 24-byte record in the local entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocalEntry {
    pub data:   Region,
    pub debug:  Region,
    pub config: Region,
}

impl LocalEntry {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for region in [self.data, self.debug, self.config] {
            writer.write_u32::<LittleEndian>(region.offset)?;
            writer.write_u32::<LittleEndian>(region.size)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut region = || -> io::Result<Region> {
            Ok(Region {
                offset: reader.read_u32::<LittleEndian>()?,
                size:   reader.read_u32::<LittleEndian>()?,
            })
        };
        Ok(Self { data: region()?, debug: region()?, config: region()? })
    }
}

/// Order in which a module's side-data follows its payload.
///
/// The writer consults this one value both when it assigns offsets and when
/// it appends bytes to the data region, so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SideDataOrder {
    #[default]
    DebugThenConfig,
    ConfigThenDebug,
}

/// Which side-data slot a region belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideData {
    Debug,
    Config,
}

impl SideDataOrder {
    pub fn slots(self) -> [SideData; 2] {
        match self {
            SideDataOrder::DebugThenConfig => [SideData::Debug, SideData::Config],
            SideDataOrder::ConfigThenDebug => [SideData::Config, SideData::Debug],
        }
    }
}

/// One module as seen by a reader: its local record joined with what the
/// global hash tables say about it.
///
/// The global attachments stay `None` when no table record for this store
/// names the entry, which is normal for secondary stores whose lookup
/// records all live in the primary store's tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub index:         u32,
    pub local:         LocalEntry,
    pub hash32:        Option<u32>,
    pub hash64:        Option<u64>,
    pub mapping_index: Option<u32>,
    pub store_id:      Option<u32>,
}

impl ModuleEntry {
    pub fn new(index: u32, local: LocalEntry) -> Self {
        Self { index, local, hash32: None, hash64: None, mapping_index: None, store_id: None }
    }

    pub fn data(&self) -> Region { self.local.data }
    pub fn debug(&self) -> Option<Region> { self.local.debug.as_option() }
    pub fn config(&self) -> Option<Region> { self.local.config.as_option() }

    pub fn side_data(&self, slot: SideData) -> Option<Region> {
        match slot {
            SideData::Debug  => self.debug(),
            SideData::Config => self.config(),
        }
    }
}
