//! Unpack and pack pipelines: the primary embedding surface.
//!
//! ```no_run
//! use xastore::archive::{pack, unpack, PackOptions, UnpackOptions};
//!
//! unpack("assemblies.blob", "assemblies.manifest", "out", &UnpackOptions::default())?;
//! pack("rebuilt.blob", "assemblies.manifest", "out", &PackOptions::default())?;
//! # Ok::<(), xastore::StoreError>(())
//! ```
//!
//! Extracted files are named after the manifest: `<name>.dll` for the
//! module, `<name>.pdb` for debug data and `<name>.dll.config` for config
//! data.

use log::{debug, info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::entry::{Region, SideDataOrder};
use crate::error::{Result, StoreError};
use crate::frame::{self, Framing, FRAME_HEADER_SIZE};
use crate::index::{digest32, digest64, DigestSource};
use crate::manifest::Manifest;
use crate::sideband::{FrameSideband, DEFAULT_SIDEBAND_NAME};
use crate::store::{PackEntry, StoreReader, StoreWriter};

// ── Options ──────────────────────────────────────────────────────────────────

/// Configuration for [`pack`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub digests:         DigestSource,
    pub side_data_order: SideDataOrder,
    /// Written into the header and every hash record; also selects which
    /// manifest entries (by blob id) make up the store.
    pub store_id:        u32,
    /// Framing for modules the sideband says nothing about.
    pub compress:        bool,
    /// Sideband location; `None` means `<in_dir>/frames.json`.
    pub sideband:        Option<PathBuf>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            digests:         DigestSource::default(),
            side_data_order: SideDataOrder::default(),
            store_id:        0,
            compress:        true,
            sideband:        None,
        }
    }
}

/// Configuration for [`unpack`].
#[derive(Debug, Clone)]
pub struct UnpackOptions {
    /// Sideband location; `None` means `<out_dir>/frames.json`.
    pub sideband:       Option<PathBuf>,
    pub write_sideband: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self { sideband: None, write_sideband: true }
    }
}

// ── Reports ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct UnpackReport {
    pub modules:  usize,
    /// Every file written, in write order.
    pub files:    Vec<PathBuf>,
    pub sideband: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct PackReport {
    pub modules:          usize,
    pub bytes:            u64,
    /// Modules whose framing came from the default rather than the sideband.
    pub default_framings: usize,
    /// Raw modules stored compressed because they begin with the frame magic.
    pub promoted_framings: usize,
}

/// Lightweight descriptor returned by [`list`].
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub index:  u32,
    pub name:   Option<String>,
    pub data:   Region,
    pub debug:  Option<Region>,
    pub config: Option<Region>,
    pub hash32: Option<u32>,
    pub hash64: Option<u64>,
    /// `Some((descriptor index, uncompressed size))` for compressed frames.
    pub frame:  Option<(u32, u32)>,
}

// ── File naming ──────────────────────────────────────────────────────────────

pub fn module_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.dll"))
}

pub fn debug_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.pdb"))
}

pub fn config_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.dll.config"))
}

// ── Unpack ───────────────────────────────────────────────────────────────────

/// Extract every module of `blob` into `out_dir`, creating it if necessary.
pub fn unpack<P, M, O>(blob: P, manifest: M, out_dir: O, opts: &UnpackOptions) -> Result<UnpackReport>
where
    P: AsRef<Path>,
    M: AsRef<Path>,
    O: AsRef<Path>,
{
    let out_dir = out_dir.as_ref();
    let mut store = StoreReader::open(blob.as_ref())?;
    let manifest = Manifest::load(manifest)?;
    let names = join_names(&manifest, store.header.store_id, store.entries.len())?;

    fs::create_dir_all(out_dir).map_err(|e| StoreError::io(out_dir, e))?;

    let mut report = UnpackReport { modules: names.len(), ..UnpackReport::default() };
    let mut sideband = FrameSideband::default();

    for (index, name) in names.iter().enumerate() {
        let module = store.extract(index as u32)?;
        debug!("{index:4}  {name}  {} bytes ({:?})", module.data.len(), module.framing);
        sideband.record(name, module.framing);

        write_file(&module_path(out_dir, name), &module.data, &mut report)?;
        if let Some(debug) = &module.debug {
            write_file(&debug_path(out_dir, name), debug, &mut report)?;
        }
        if let Some(config) = &module.config {
            write_file(&config_path(out_dir, name), config, &mut report)?;
        }
    }

    if opts.write_sideband {
        let path = opts.sideband.clone().unwrap_or_else(|| out_dir.join(DEFAULT_SIDEBAND_NAME));
        sideband.save(&path)?;
        report.sideband = Some(path);
    }

    info!("unpacked {} modules into {}", report.modules, out_dir.display());
    Ok(report)
}

/// Manifest names for a store, checked one-to-one against its entry count.
fn join_names(manifest: &Manifest, store_id: u32, entry_count: usize) -> Result<Vec<String>> {
    let entries = manifest.for_store(store_id)?;
    if entry_count > entries.len() {
        return Err(StoreError::UnmappedEntry { index: entries.len() as u32 });
    }
    if let Some(extra) = entries.get(entry_count) {
        return Err(StoreError::UnusedManifestEntry { index: extra.index, name: extra.name.clone() });
    }
    Ok(entries.into_iter().map(|e| e.name.clone()).collect())
}

fn write_file(path: &Path, data: &[u8], report: &mut UnpackReport) -> Result<()> {
    fs::write(path, data).map_err(|e| StoreError::io(path, e))?;
    report.files.push(path.to_owned());
    Ok(())
}

// ── Pack ─────────────────────────────────────────────────────────────────────

/// Build `out_blob` from the files in `in_dir` named by the manifest.
///
/// All inputs are read before anything is written.  The container is
/// written to a temporary file beside `out_blob` and renamed over it only
/// once complete, so a failed pack never leaves a partial container.
pub fn pack<P, M, I>(out_blob: P, manifest: M, in_dir: I, opts: &PackOptions) -> Result<PackReport>
where
    P: AsRef<Path>,
    M: AsRef<Path>,
    I: AsRef<Path>,
{
    let out_blob = out_blob.as_ref();
    let in_dir = in_dir.as_ref();
    let manifest = Manifest::load(manifest)?;

    let sideband_path = opts.sideband.clone().unwrap_or_else(|| in_dir.join(DEFAULT_SIDEBAND_NAME));
    let sideband = FrameSideband::load(&sideband_path)?;
    if sideband.is_none() {
        info!(
            "no frame sideband at {}; descriptor indices default to 0",
            sideband_path.display()
        );
    }

    let default_framing = if opts.compress { Framing::default() } else { Framing::Raw };
    let mut writer = StoreWriter::new(opts.store_id, opts.side_data_order);
    let mut report = PackReport::default();

    for m in manifest.for_store(opts.store_id)? {
        let framing = match sideband.as_ref().and_then(|s| s.framing(&m.name)) {
            Some(f) => f,
            None => {
                report.default_framings += 1;
                default_framing
            }
        };
        let payload = read_required(&m.name, &module_path(in_dir, &m.name))?;
        let stored = framing.for_payload(&payload);
        if stored != framing {
            warn!("{}: raw payload starts with the frame magic; stored compressed", m.name);
            report.promoted_framings += 1;
        }
        let (hash32, hash64) = match opts.digests {
            DigestSource::Manifest => (m.hash32, m.hash64),
            DigestSource::Computed => (digest32(&m.name), digest64(&m.name)),
        };

        let mut entry = PackEntry::new(m.name.clone(), hash32, hash64, payload);
        entry.framing = stored;
        entry.debug = read_optional(&debug_path(in_dir, &m.name))?;
        entry.config = read_optional(&config_path(in_dir, &m.name))?;
        debug!(
            "{:4}  {}  {} bytes{}{}",
            m.index,
            m.name,
            entry.payload.len(),
            if entry.debug.is_some() { " +pdb" } else { "" },
            if entry.config.is_some() { " +config" } else { "" },
        );
        writer.add(entry);
    }
    if sideband.is_some() && report.default_framings > 0 {
        warn!(
            "{} modules missing from the sideband were framed with defaults",
            report.default_framings
        );
    }

    report.modules = writer.entries().len();
    report.bytes = write_atomically(out_blob, |file| writer.write(file))?;
    info!("packed {} modules into {} ({} bytes)", report.modules, out_blob.display(), report.bytes);
    Ok(report)
}

fn read_required(name: &str, path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => StoreError::MissingInput { name: name.to_owned(), path: path.to_owned() },
        _ => StoreError::io(path, e),
    })
}

/// Side-data file contents, or `None` when the file is absent.  An empty
/// file is treated as absent: a zero-length region would be read back as
/// the absent sentinel anyway.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => {
            warn!("{} is empty; treated as absent", path.display());
            Ok(None)
        }
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Run `emit` against a temporary file next to `dest`, then rename it into
/// place.  On error the temporary file is removed and `dest` is untouched.
fn write_atomically<F>(dest: &Path, emit: F) -> Result<u64>
where
    F: FnOnce(&mut fs::File) -> Result<u64>,
{
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    let written = emit(tmp.as_file_mut())?;
    tmp.as_file_mut().flush().map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(dest).map_err(|e| StoreError::io(dest, e.error))?;
    Ok(written)
}

// ── List ─────────────────────────────────────────────────────────────────────

/// Describe every entry of `blob`, named through `manifest` when given.
pub fn list<P: AsRef<Path>>(blob: P, manifest: Option<&Manifest>) -> Result<Vec<EntryInfo>> {
    let mut store = StoreReader::open(blob)?;
    let store_id = store.header.store_id;
    let entries = store.entries.clone();

    entries
        .into_iter()
        .map(|e| -> Result<EntryInfo> {
            let head = Region::new(e.data().offset, e.data().size.min(FRAME_HEADER_SIZE as u32));
            let frame = frame::peek(&store.read_region(head)?);
            Ok(EntryInfo {
                index:  e.index,
                name:   manifest.and_then(|m| m.name(store_id, e.index)).map(str::to_owned),
                data:   e.data(),
                debug:  e.debug(),
                config: e.config(),
                hash32: e.hash32,
                hash64: e.hash64,
                frame,
            })
        })
        .collect()
}
