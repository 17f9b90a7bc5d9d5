//! Error taxonomy shared by the reader, writer and pipelines.
//!
//! Every variant is fatal.  Nothing in this crate retries or recovers: the
//! operations are deterministic local transformations, so a failure means
//! "no usable output was produced".

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed container or compressed frame.  `offset` is the absolute
    /// byte position in the container (or in the frame, for frame errors).
    #[error("format error at byte {offset}: {reason}")]
    Format { offset: u64, reason: String },

    #[error("missing input for '{name}': {} not found", path.display())]
    MissingInput { name: String, path: PathBuf },

    #[error("container entry {index} has no manifest entry")]
    UnmappedEntry { index: u32 },

    #[error("manifest entry {index} ('{name}') has no container entry")]
    UnusedManifestEntry { index: u32, name: String },

    #[error("no container entry with local index {index}")]
    NoSuchEntry { index: u32 },

    #[error("manifest line {line}: {reason}")]
    Manifest { line: usize, reason: String },

    #[error("manifest store {store_id}: found index {found} ('{name}') where {expected} was expected")]
    SparseIndex { store_id: u32, expected: u32, found: u32, name: String },

    #[error("{}: {source}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("container layout exceeds the 32-bit offset space")]
    Overflow,
}

impl StoreError {
    pub fn format(offset: u64, reason: impl Into<String>) -> Self {
        StoreError::Format { offset, reason: reason.into() }
    }

    /// Wrap a raw I/O failure that happened while parsing at `offset`.
    /// Truncation becomes a format error; anything else stays an I/O error.
    pub fn at(offset: u64, path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            StoreError::format(offset, "unexpected end of data")
        } else {
            StoreError::Io { path: path.to_owned(), source: err }
        }
    }

    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        StoreError::Io { path: path.as_ref().to_owned(), source }
    }

    pub fn from_codec(offset: u64, err: CodecError) -> Self {
        StoreError::format(offset, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
