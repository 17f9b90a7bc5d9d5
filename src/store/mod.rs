//! Container engine: [`StoreReader`] and [`StoreWriter`].
//!
//! # Layout
//! ```text
//! header             20 B
//! local entries      24 B × local_entry_count
//! hash32 table       20 B × global_entry_count   (ascending digest)
//! hash64 table       20 B × global_entry_count   (ascending digest)
//! data region        payload, then side-data, per entry in index order
//! ```
//!
//! All offsets in the local entry table are absolute from the start of the
//! file.  Everything is little-endian.

mod reader;
mod writer;

pub use reader::{ExtractedModule, StoreReader};
pub use writer::{PackEntry, StoreWriter};
