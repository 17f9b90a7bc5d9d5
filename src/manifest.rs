//! Assembly manifest: the text file that names the entries of each store.
//!
//! ```text
//! Hash 32     Hash 64             Blob ID  Blob idx  Name
//! 0xa2e0939b  0x4288cfb749e4c631  000      0000      Xamarin.AndroidX.Activity
//! ```
//!
//! The first line is a column header and is skipped.  Every other non-empty
//! line carries exactly five whitespace-separated fields.

use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub hash32:  u32,
    pub hash64:  u64,
    pub blob_id: u32,
    pub index:   u32,
    pub name:    String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

const HEADER_LINE: &str = "Hash 32     Hash 64             Blob ID  Blob idx  Name";

impl Manifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (n, line) in text.lines().enumerate().skip(1) {
            let line_no = n + 1;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let &[h32, h64, blob_id, index, name] = &fields[..] else {
                return Err(StoreError::Manifest {
                    line:   line_no,
                    reason: format!("expected 5 fields, found {}", fields.len()),
                });
            };
            let bad = |what: &str, value: &str| StoreError::Manifest {
                line:   line_no,
                reason: format!("invalid {what} '{value}'"),
            };
            if !is_plain_file_name(name) {
                return Err(bad("name (must be a single path component)", name));
            }
            entries.push(ManifestEntry {
                hash32:  u32::from_str_radix(strip_hex(h32), 16).map_err(|_| bad("hash32", h32))?,
                hash64:  u64::from_str_radix(strip_hex(h64), 16).map_err(|_| bad("hash64", h64))?,
                blob_id: blob_id.parse().map_err(|_| bad("blob id", blob_id))?,
                index:   index.parse().map_err(|_| bad("blob index", index))?,
                name:    name.to_owned(),
            });
        }
        Ok(Self { entries })
    }

    /// Render entries in manifest format, column header included.
    pub fn render(entries: &[ManifestEntry]) -> String {
        let mut out = String::from(HEADER_LINE);
        out.push('\n');
        for e in entries {
            let _ = writeln!(
                out,
                "0x{:08x}  0x{:016x}  {:03}      {:04}      {}",
                e.hash32, e.hash64, e.blob_id, e.index, e.name
            );
        }
        out
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// The entries of one store, ordered by index.  Indices must be exactly
    /// `0..N` with no gaps or repeats.
    pub fn for_store(&self, store_id: u32) -> Result<Vec<&ManifestEntry>> {
        let mut selected: Vec<&ManifestEntry> =
            self.entries.iter().filter(|e| e.blob_id == store_id).collect();
        selected.sort_by_key(|e| e.index);
        for (expected, e) in selected.iter().enumerate() {
            if e.index as usize != expected {
                return Err(StoreError::SparseIndex {
                    store_id,
                    expected: expected as u32,
                    found:    e.index,
                    name:     e.name.clone(),
                });
            }
        }
        Ok(selected)
    }

    /// Name of entry `index` in store `store_id`.
    pub fn name(&self, store_id: u32, index: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.blob_id == store_id && e.index == index)
            .map(|e| e.name.as_str())
    }
}

/// Names become file names under the output directory, so they may not
/// contain separators or relative components.
fn is_plain_file_name(name: &str) -> bool {
    !name.contains(['/', '\\'])
        && matches!(
            Path::new(name).components().collect::<Vec<_>>()[..],
            [Component::Normal(_)]
        )
}

fn strip_hex(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}
