use log::{debug, trace};
use std::io::{self, Write};

use crate::entry::{LocalEntry, Region, SideData, SideDataOrder};
use crate::error::{Result, StoreError};
use crate::frame::Framing;
use crate::header::{ContainerHeader, HASH_RECORD_SIZE, HEADER_SIZE, LOCAL_ENTRY_SIZE};
use crate::index::{sorted_table, HashTableRecord, HashWidth};
use crate::perf::{encode_payloads, WriteBuffer};

/// Flush threshold for the output buffer.
const WRITE_BUFFER_SIZE: usize = 256 * 1024;

/// One module queued for packing.  `payload` is the uncompressed module.
#[derive(Debug, Clone)]
pub struct PackEntry {
    pub name:    String,
    pub hash32:  u32,
    pub hash64:  u64,
    pub payload: Vec<u8>,
    pub framing: Framing,
    pub debug:   Option<Vec<u8>>,
    pub config:  Option<Vec<u8>>,
}

impl PackEntry {
    pub fn new(name: impl Into<String>, hash32: u32, hash64: u64, payload: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            hash32,
            hash64,
            payload,
            framing: Framing::default(),
            debug: None,
            config: None,
        }
    }

    fn side_data(&self, slot: SideData) -> Option<&[u8]> {
        match slot {
            SideData::Debug  => self.debug.as_deref(),
            SideData::Config => self.config.as_deref(),
        }
    }
}

/// Builds a container from entries added in local-index order.
///
/// Nothing is written until [`StoreWriter::write`], which frames every
/// payload first, then plans all offsets, then emits the whole container in
/// one pass.  Offsets depend on every preceding entry's encoded size, so no
/// data byte can be placed before the plan is complete.
pub struct StoreWriter {
    store_id:   u32,
    order:      SideDataOrder,
    entries:    Vec<PackEntry>,
}

impl StoreWriter {
    pub fn new(store_id: u32, order: SideDataOrder) -> Self {
        Self { store_id, order, entries: Vec::new() }
    }

    /// Append an entry; its local index is its position.
    pub fn add(&mut self, entry: PackEntry) -> u32 {
        self.entries.push(entry);
        (self.entries.len() - 1) as u32
    }

    pub fn entries(&self) -> &[PackEntry] {
        &self.entries
    }

    pub fn header(&self) -> ContainerHeader {
        ContainerHeader::new(self.entries.len() as u32, self.store_id)
    }

    /// Compute every local entry record given the encoded payload sizes.
    ///
    /// The running offset starts right after the tables and walks each
    /// entry's payload, then its side-data in `self.order`.  The data region
    /// is appended with the same walk, see [`StoreWriter::write_data`].
    fn plan(&self, encoded: &[Vec<u8>]) -> Result<(Vec<LocalEntry>, u64)> {
        let n = self.entries.len() as u64;
        let mut current = HEADER_SIZE as u64
            + n * (LOCAL_ENTRY_SIZE + 2 * HASH_RECORD_SIZE) as u64;

        let mut claim = |len: usize| -> Result<Region> {
            let offset = u32::try_from(current).map_err(|_| StoreError::Overflow)?;
            let size = u32::try_from(len).map_err(|_| StoreError::Overflow)?;
            current += len as u64;
            Ok(Region::new(offset, size))
        };

        let mut layout = Vec::with_capacity(self.entries.len());
        for (entry, data) in self.entries.iter().zip(encoded) {
            let mut local = LocalEntry { data: claim(data.len())?, ..LocalEntry::default() };
            for slot in self.order.slots() {
                let region = match entry.side_data(slot) {
                    Some(bytes) if !bytes.is_empty() => claim(bytes.len())?,
                    _ => Region::ABSENT,
                };
                match slot {
                    SideData::Debug  => local.debug = region,
                    SideData::Config => local.config = region,
                }
            }
            layout.push(local);
        }
        // The last byte must still be addressable by a u32 offset.
        if current > u32::MAX as u64 + 1 {
            return Err(StoreError::Overflow);
        }
        Ok((layout, current))
    }

    /// The local entry table this writer would emit.
    pub fn layout(&self) -> Result<Vec<LocalEntry>> {
        let encoded = self.encode()?;
        Ok(self.plan(&encoded)?.0)
    }

    fn encode(&self) -> Result<Vec<Vec<u8>>> {
        let inputs: Vec<(&[u8], Framing)> = self
            .entries
            .iter()
            .map(|e| (e.payload.as_slice(), e.framing))
            .collect();
        encode_payloads(&inputs)
    }

    fn hash_table(&self, width: HashWidth) -> Vec<HashTableRecord> {
        let records = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| HashTableRecord {
                digest: match width {
                    HashWidth::Bits32 => e.hash32 as u64,
                    HashWidth::Bits64 => e.hash64,
                },
                mapping_index:     i as u32,
                local_store_index: i as u32,
                store_id:          self.store_id,
            })
            .collect();
        sorted_table(records)
    }

    /// Emit the complete container.  Returns the number of bytes written.
    ///
    /// `writer` should be a scratch destination (memory or a temporary file):
    /// on error it holds a partial container.
    pub fn write<W: Write>(&self, writer: W) -> Result<u64> {
        let encoded = self.encode()?;
        let (layout, total) = self.plan(&encoded)?;

        let mut out = WriteBuffer::new(writer, WRITE_BUFFER_SIZE);
        self.write_all_sections(&mut out, &layout, &encoded)
            .map_err(|e| StoreError::io("<container>", e))?;

        if out.bytes_written != total {
            return Err(StoreError::format(out.bytes_written, format!(
                "wrote {} bytes, layout planned {total}", out.bytes_written
            )));
        }
        debug!("container: {} entries, {total} bytes", self.entries.len());
        Ok(total)
    }

    fn write_all_sections<W: Write>(
        &self,
        out:     &mut WriteBuffer<W>,
        layout:  &[LocalEntry],
        encoded: &[Vec<u8>],
    ) -> io::Result<()> {
        self.header().write(&mut *out)?;
        for local in layout {
            local.write(&mut *out)?;
        }
        for width in [HashWidth::Bits32, HashWidth::Bits64] {
            for rec in self.hash_table(width) {
                rec.write(&mut *out, width)?;
            }
        }
        self.write_data(out, layout, encoded)?;
        out.flush()
    }

    fn write_data<W: Write>(
        &self,
        out:     &mut WriteBuffer<W>,
        layout:  &[LocalEntry],
        encoded: &[Vec<u8>],
    ) -> io::Result<()> {
        for ((entry, local), data) in self.entries.iter().zip(layout).zip(encoded) {
            trace!("{}: data at {}", entry.name, local.data.offset);
            debug_assert_eq!(out.bytes_written, local.data.offset as u64);
            out.write_all(data)?;
            for slot in self.order.slots() {
                if let Some(bytes) = entry.side_data(slot) {
                    out.write_all(bytes)?;
                }
            }
        }
        Ok(())
    }

    /// Convenience: emit the container into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }
}
