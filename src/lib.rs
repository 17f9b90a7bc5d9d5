pub mod error;
pub mod header;
pub mod entry;
pub mod index;
pub mod codec;
pub mod frame;
pub mod perf;
pub mod store;
pub mod manifest;
pub mod sideband;
pub mod archive;

pub use error::{Result, StoreError};
pub use header::ContainerHeader;
pub use entry::{LocalEntry, ModuleEntry, Region, SideDataOrder};
pub use index::{DigestSource, HashTableRecord, HashWidth};
pub use frame::Framing;
pub use store::{PackEntry, StoreReader, StoreWriter};
pub use manifest::{Manifest, ManifestEntry};
pub use sideband::FrameSideband;
