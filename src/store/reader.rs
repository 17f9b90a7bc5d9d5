use log::{debug, warn};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::entry::{LocalEntry, ModuleEntry, Region, SideData};
use crate::error::{Result, StoreError};
use crate::frame::{self, Framing};
use crate::header::{ContainerHeader, HASH_RECORD_SIZE, LOCAL_ENTRY_SIZE};
use crate::index::{HashTableRecord, HashWidth};

/// One module pulled out of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedModule {
    pub data:    Vec<u8>,
    pub framing: Framing,
    pub debug:   Option<Vec<u8>>,
    pub config:  Option<Vec<u8>>,
}

/// Parsed container plus the source it was parsed from.
///
/// Parsing is all-or-nothing: [`StoreReader::new`] either returns a reader
/// whose `entries` are fully joined with both hash tables, or an error.
pub struct StoreReader<R: Read + Seek> {
    reader:      R,
    source:      PathBuf,
    len:         u64,
    pub header:  ContainerHeader,
    pub entries: Vec<ModuleEntry>,
}

impl StoreReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
        Self::with_source(BufReader::new(file), path)
    }
}

impl<R: Read + Seek> StoreReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        Self::with_source(reader, "<stream>")
    }

    /// Like [`StoreReader::new`]; `source` labels I/O errors.
    pub fn with_source(mut reader: R, source: impl AsRef<Path>) -> Result<Self> {
        let source = source.as_ref().to_owned();
        let len = reader.seek(SeekFrom::End(0)).map_err(|e| StoreError::io(&source, e))?;
        reader.seek(SeekFrom::Start(0)).map_err(|e| StoreError::io(&source, e))?;

        let header = ContainerHeader::read(&mut reader)?;
        debug!(
            "{}: version {} local={} global={} store={}",
            source.display(), header.version, header.local_entry_count,
            header.global_entry_count, header.store_id
        );
        if header.tables_end() > len {
            return Err(StoreError::format(len, format!(
                "tables end at byte {} but the container is {len} bytes",
                header.tables_end()
            )));
        }

        let mut entries = Vec::with_capacity(header.local_entry_count as usize);
        for i in 0..header.local_entry_count {
            let offset = header.local_table_start() + i as u64 * LOCAL_ENTRY_SIZE as u64;
            let local = LocalEntry::read(&mut reader).map_err(|e| StoreError::at(offset, &source, e))?;
            for (what, region) in [("debug", local.debug), ("config", local.config)] {
                if region.is_degenerate() {
                    warn!(
                        "entry {i}: {what} region ({}, {}) has a zero half; treated as absent",
                        region.offset, region.size
                    );
                }
            }
            entries.push(ModuleEntry::new(i, local));
        }

        let mut store = Self { reader, source, len, header, entries };
        store.read_hash_table(HashWidth::Bits32)?;
        store.read_hash_table(HashWidth::Bits64)?;
        Ok(store)
    }

    fn read_hash_table(&mut self, width: HashWidth) -> Result<()> {
        let start = match width {
            HashWidth::Bits32 => self.header.hash32_table_start(),
            HashWidth::Bits64 => self.header.hash64_table_start(),
        };
        let mut seen = vec![false; self.entries.len()];

        for i in 0..self.header.global_entry_count {
            let offset = start + i as u64 * HASH_RECORD_SIZE as u64;
            let rec = HashTableRecord::read(&mut self.reader, width).map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    StoreError::format(offset, e.to_string())
                } else {
                    StoreError::at(offset, &self.source, e)
                }
            })?;

            if rec.store_id != self.header.store_id {
                debug!(
                    "hash{} record {i}: belongs to store {}, skipped",
                    width.bits(), rec.store_id
                );
                continue;
            }
            let idx = rec.local_store_index as usize;
            if idx >= self.entries.len() {
                return Err(StoreError::format(offset, format!(
                    "hash{} record names local index {idx}, store has {} entries",
                    width.bits(), self.entries.len()
                )));
            }
            if std::mem::replace(&mut seen[idx], true) {
                return Err(StoreError::format(offset, format!(
                    "hash{} table names local index {idx} twice", width.bits()
                )));
            }

            let entry = &mut self.entries[idx];
            match width {
                HashWidth::Bits32 => {
                    entry.hash32        = Some(rec.digest as u32);
                    entry.mapping_index = Some(rec.mapping_index);
                    entry.store_id      = Some(rec.store_id);
                }
                // mapping/store fields duplicate the 32-bit table
                HashWidth::Bits64 => entry.hash64 = Some(rec.digest),
            }
        }
        Ok(())
    }

    /// Total container length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: u32) -> Option<&ModuleEntry> {
        self.entries.get(index as usize)
    }

    /// Read the bytes of one region, verbatim.
    pub fn read_region(&mut self, region: Region) -> Result<Vec<u8>> {
        if region.end() > self.len {
            return Err(StoreError::format(region.offset as u64, format!(
                "region of {} bytes runs past the end of the {}-byte container",
                region.size, self.len
            )));
        }
        self.reader
            .seek(SeekFrom::Start(region.offset as u64))
            .map_err(|e| StoreError::io(&self.source, e))?;
        let mut buf = vec![0u8; region.size as usize];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| StoreError::at(region.offset as u64, &self.source, e))?;
        Ok(buf)
    }

    /// The module's data region as stored (possibly a compressed frame).
    pub fn read_raw_data(&mut self, index: u32) -> Result<Vec<u8>> {
        let region = self.require(index)?.data();
        self.read_region(region)
    }

    fn read_side_data(&mut self, index: u32, slot: SideData) -> Result<Option<Vec<u8>>> {
        let region = self.require(index)?.side_data(slot);
        match region {
            Some(region) => self.read_region(region).map(Some),
            None => Ok(None),
        }
    }

    pub fn read_debug(&mut self, index: u32) -> Result<Option<Vec<u8>>> {
        self.read_side_data(index, SideData::Debug)
    }

    pub fn read_config(&mut self, index: u32) -> Result<Option<Vec<u8>>> {
        self.read_side_data(index, SideData::Config)
    }

    /// Read and decode one module together with its side-data.
    pub fn extract(&mut self, index: u32) -> Result<ExtractedModule> {
        let offset = self.require(index)?.data().offset as u64;
        let raw = self.read_raw_data(index)?;
        let decoded = frame::decode(&raw, offset)?;
        Ok(ExtractedModule {
            data:    decoded.data,
            framing: decoded.framing,
            debug:   self.read_debug(index)?,
            config:  self.read_config(index)?,
        })
    }

    /// Check that every present region lies in the data region and inside
    /// the file.  Reading does not require this; `info` reports it.
    pub fn check_layout(&self) -> Result<()> {
        let data_start = self.header.tables_end();
        for entry in &self.entries {
            let regions = [Some(entry.data()), entry.debug(), entry.config()];
            for region in regions.into_iter().flatten() {
                if region.size > 0 && (region.offset as u64) < data_start {
                    return Err(StoreError::format(region.offset as u64, format!(
                        "entry {} has a region inside the tables (data starts at {data_start})",
                        entry.index
                    )));
                }
                if region.end() > self.len {
                    return Err(StoreError::format(region.offset as u64, format!(
                        "entry {} has a region past the end of the container", entry.index
                    )));
                }
            }
        }
        Ok(())
    }

    fn require(&self, index: u32) -> Result<&ModuleEntry> {
        self.entry(index).ok_or(StoreError::NoSuchEntry { index })
    }
}
