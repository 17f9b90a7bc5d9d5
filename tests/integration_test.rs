use std::collections::BTreeSet;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use tempfile::TempDir;
use xastore::archive::{self, config_path, debug_path, module_path, PackOptions, UnpackOptions};
use xastore::header::{HEADER_SIZE, MAGIC};
use xastore::manifest::ManifestEntry;
use xastore::sideband::{FrameSideband, DEFAULT_SIDEBAND_NAME};
use xastore::{
    DigestSource, Framing, Manifest, PackEntry, SideDataOrder, StoreError, StoreReader,
    StoreWriter,
};

fn manifest_entry(index: u32, name: &str) -> ManifestEntry {
    ManifestEntry {
        hash32:  xastore::index::digest32(name),
        hash64:  xastore::index::digest64(name),
        blob_id: 0,
        index,
        name:    name.to_owned(),
    }
}

fn write_manifest(dir: &Path, names: &[&str]) -> std::path::PathBuf {
    let entries: Vec<ManifestEntry> =
        names.iter().enumerate().map(|(i, n)| manifest_entry(i as u32, n)).collect();
    let path = dir.join("assemblies.manifest");
    fs::write(&path, Manifest::render(&entries)).unwrap();
    path
}

fn assembly_bytes(seed: u8, len: usize) -> Vec<u8> {
    let mut v = b"MZ\x90\x00".to_vec();
    v.extend((0..len).map(|i| seed.wrapping_add((i % 37) as u8)));
    v
}

#[test]
fn test_two_entry_scenario() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    fs::create_dir(&input).unwrap();
    let manifest = write_manifest(tmp.path(), &["Mono.Android", "App"]);

    let mono = assembly_bytes(1, 4000);
    let app = assembly_bytes(9, 700);
    let app_config: Vec<u8> = (0..50u8).collect();
    fs::write(module_path(&input, "Mono.Android"), &mono).unwrap();
    fs::write(module_path(&input, "App"), &app).unwrap();
    fs::write(config_path(&input, "App"), &app_config).unwrap();

    let blob = tmp.path().join("assemblies.blob");
    let report = archive::pack(&blob, &manifest, &input, &PackOptions::default()).unwrap();
    assert_eq!(report.modules, 2);
    assert_eq!(report.bytes, fs::metadata(&blob).unwrap().len());

    let store = StoreReader::open(&blob).unwrap();
    assert_eq!(store.header.local_entry_count, 2);
    assert_eq!(store.header.global_entry_count, 2);
    assert!(store.entries[0].debug().is_none());
    assert!(store.entries[0].config().is_none());
    assert!(store.entries[1].debug().is_none());
    assert_eq!(store.entries[1].config().unwrap().size, 50);
    store.check_layout().unwrap();

    let out = tmp.path().join("out");
    archive::unpack(&blob, &manifest, &out, &UnpackOptions::default()).unwrap();
    assert_eq!(fs::read(module_path(&out, "Mono.Android")).unwrap(), mono);
    assert_eq!(fs::read(module_path(&out, "App")).unwrap(), app);
    assert_eq!(fs::read(config_path(&out, "App")).unwrap(), app_config);
    assert!(!debug_path(&out, "App").exists());
    assert!(!config_path(&out, "Mono.Android").exists());
}

#[test]
fn test_total_size_and_tables() {
    let names = ["A", "B", "C", "D"];
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    for (i, name) in names.iter().enumerate() {
        let mut e = PackEntry::new(*name, xastore::index::digest32(name),
                                   xastore::index::digest64(name), assembly_bytes(i as u8, 100 * i));
        if i % 2 == 1 {
            e.debug = Some(vec![0xDB; 17]);
        }
        writer.add(e);
    }
    let bytes = writer.to_bytes().unwrap();

    let store = StoreReader::new(Cursor::new(&bytes)).unwrap();
    let payload_total: u64 = store.entries.iter()
        .map(|e| e.data().size as u64 + e.debug().map_or(0, |r| r.size as u64))
        .sum();
    assert_eq!(bytes.len() as u64, HEADER_SIZE as u64 + 64 * names.len() as u64 + payload_total);

    for (i, e) in store.entries.iter().enumerate() {
        assert_eq!(e.hash32, Some(xastore::index::digest32(names[i])));
        assert_eq!(e.hash64, Some(xastore::index::digest64(names[i])));
        assert_eq!(e.mapping_index, Some(i as u32));
        assert_eq!(e.store_id, Some(0));
    }
}

#[test]
fn test_debug_and_config_together() {
    for order in [SideDataOrder::DebugThenConfig, SideDataOrder::ConfigThenDebug] {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        fs::create_dir(&input).unwrap();
        let manifest = write_manifest(tmp.path(), &["Both"]);

        let module = assembly_bytes(3, 256);
        let pdb = b"BSJB portable pdb".to_vec();
        let config = b"<configuration/>".to_vec();
        fs::write(module_path(&input, "Both"), &module).unwrap();
        fs::write(debug_path(&input, "Both"), &pdb).unwrap();
        fs::write(config_path(&input, "Both"), &config).unwrap();

        let blob = tmp.path().join("both.blob");
        let opts = PackOptions { side_data_order: order, ..PackOptions::default() };
        archive::pack(&blob, &manifest, &input, &opts).unwrap();

        let mut store = StoreReader::open(&blob).unwrap();
        assert_eq!(store.read_debug(0).unwrap(), Some(pdb.clone()));
        assert_eq!(store.read_config(0).unwrap(), Some(config.clone()));

        let out = tmp.path().join("out");
        archive::unpack(&blob, &manifest, &out, &UnpackOptions::default()).unwrap();
        assert_eq!(fs::read(module_path(&out, "Both")).unwrap(), module);
        assert_eq!(fs::read(debug_path(&out, "Both")).unwrap(), pdb);
        assert_eq!(fs::read(config_path(&out, "Both")).unwrap(), config);
    }
}

#[test]
fn test_descriptor_indices_survive_repack() {
    let tmp = TempDir::new().unwrap();
    let manifest = write_manifest(tmp.path(), &["Raw", "Framed"]);

    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    let digests = |n: &str| (xastore::index::digest32(n), xastore::index::digest64(n));
    let (h32, h64) = digests("Raw");
    let mut raw = PackEntry::new("Raw", h32, h64, assembly_bytes(5, 64));
    raw.framing = Framing::Raw;
    let (h32, h64) = digests("Framed");
    let mut framed = PackEntry::new("Framed", h32, h64, assembly_bytes(6, 4096));
    framed.framing = Framing::Compressed { descriptor_index: 42 };
    writer.add(raw);
    writer.add(framed);
    let original = writer.to_bytes().unwrap();
    let blob = tmp.path().join("original.blob");
    fs::write(&blob, &original).unwrap();

    let out = tmp.path().join("out");
    let report = archive::unpack(&blob, &manifest, &out, &UnpackOptions::default()).unwrap();
    let sideband = FrameSideband::load(report.sideband.unwrap()).unwrap().unwrap();
    assert_eq!(sideband.framing("Framed"), Some(Framing::Compressed { descriptor_index: 42 }));
    assert_eq!(sideband.framing("Raw"), Some(Framing::Raw));

    let rebuilt = tmp.path().join("rebuilt.blob");
    let report = archive::pack(&rebuilt, &manifest, &out, &PackOptions::default()).unwrap();
    assert_eq!(report.default_framings, 0);
    assert_eq!(fs::read(&rebuilt).unwrap(), original);
}

#[test]
fn test_missing_sideband_defaults_descriptor() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    fs::create_dir(&input).unwrap();
    let manifest = write_manifest(tmp.path(), &["A"]);
    fs::write(module_path(&input, "A"), assembly_bytes(0, 128)).unwrap();

    let blob = tmp.path().join("a.blob");
    let report = archive::pack(&blob, &manifest, &input, &PackOptions::default()).unwrap();
    assert_eq!(report.default_framings, 1);

    let mut store = StoreReader::open(&blob).unwrap();
    assert_eq!(store.extract(0).unwrap().framing, Framing::Compressed { descriptor_index: 0 });
    assert!(!input.join(DEFAULT_SIDEBAND_NAME).exists());
}

#[test]
fn test_missing_payload_leaves_no_blob() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    fs::create_dir(&input).unwrap();
    let manifest = write_manifest(tmp.path(), &["Present", "Absent"]);
    fs::write(module_path(&input, "Present"), b"MZ").unwrap();

    let blob = tmp.path().join("out.blob");
    match archive::pack(&blob, &manifest, &input, &PackOptions::default()) {
        Err(StoreError::MissingInput { name, .. }) => assert_eq!(name, "Absent"),
        other => panic!("expected MissingInput, got {other:?}"),
    }
    assert!(!blob.exists());
    let leftovers: Vec<_> = fs::read_dir(tmp.path()).unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|n| n != "in" && n != "assemblies.manifest")
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
}

#[test]
fn test_failed_pack_keeps_existing_blob() {
    let tmp = TempDir::new().unwrap();
    let manifest = write_manifest(tmp.path(), &["Gone"]);
    let blob = tmp.path().join("existing.blob");
    fs::write(&blob, b"previous contents").unwrap();

    assert!(archive::pack(&blob, &manifest, tmp.path(), &PackOptions::default()).is_err());
    assert_eq!(fs::read(&blob).unwrap(), b"previous contents");
}

#[test]
fn test_manifest_container_mismatch() {
    let tmp = TempDir::new().unwrap();
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    writer.add(PackEntry::new("A", 1, 1, b"MZ-a".to_vec()));
    writer.add(PackEntry::new("B", 2, 2, b"MZ-b".to_vec()));
    let blob = tmp.path().join("two.blob");
    fs::write(&blob, writer.to_bytes().unwrap()).unwrap();

    let short = write_manifest(tmp.path(), &["A"]);
    assert!(matches!(
        archive::unpack(&blob, &short, tmp.path().join("o1"), &UnpackOptions::default()),
        Err(StoreError::UnmappedEntry { index: 1 })
    ));

    let long = write_manifest(tmp.path(), &["A", "B", "C"]);
    match archive::unpack(&blob, &long, tmp.path().join("o2"), &UnpackOptions::default()) {
        Err(StoreError::UnusedManifestEntry { index: 2, name }) => assert_eq!(name, "C"),
        other => panic!("expected UnusedManifestEntry, got {other:?}"),
    }
}

#[test]
fn test_bad_magic_and_version() {
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    writer.add(PackEntry::new("A", 1, 1, b"MZ".to_vec()));
    let good = writer.to_bytes().unwrap();
    assert_eq!(&good[..4], MAGIC);

    let mut bad_magic = good.clone();
    bad_magic[..4].copy_from_slice(b"XXXX");
    assert!(matches!(StoreReader::new(Cursor::new(bad_magic)),
                     Err(StoreError::Format { offset: 0, .. })));

    let mut bad_version = good.clone();
    bad_version[4..8].copy_from_slice(&99u32.to_le_bytes());
    assert!(matches!(StoreReader::new(Cursor::new(bad_version)),
                     Err(StoreError::Format { offset: 4, .. })));
}

#[test]
fn test_truncated_tables() {
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    writer.add(PackEntry::new("A", 1, 1, b"MZ".to_vec()));
    writer.add(PackEntry::new("B", 2, 2, b"MZ".to_vec()));
    let mut bytes = writer.to_bytes().unwrap();
    bytes.truncate(HEADER_SIZE + 24 + 10);
    assert!(matches!(StoreReader::new(Cursor::new(bytes)), Err(StoreError::Format { .. })));
}

#[test]
fn test_out_of_range_local_index() {
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    writer.add(PackEntry::new("A", 1, 1, b"MZ".to_vec()));
    let mut bytes = writer.to_bytes().unwrap();
    // local_store_index of the only 32-bit record
    let at = HEADER_SIZE + 24 + 12;
    bytes[at..at + 4].copy_from_slice(&5u32.to_le_bytes());
    match StoreReader::new(Cursor::new(bytes)) {
        Err(StoreError::Format { offset, .. }) => assert_eq!(offset, (HEADER_SIZE + 24) as u64),
        other => panic!("expected format error, got {:?}", other.err()),
    }
}

#[test]
fn test_foreign_store_records_are_skipped() {
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    writer.add(PackEntry::new("A", 1, 1, b"MZ".to_vec()));
    let mut bytes = writer.to_bytes().unwrap();
    // store id of the only 64-bit record
    let at = HEADER_SIZE + 24 + 20 + 16;
    bytes[at..at + 4].copy_from_slice(&7u32.to_le_bytes());
    let store = StoreReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(store.entries[0].hash32, Some(1));
    assert_eq!(store.entries[0].hash64, None);
}

#[test]
fn test_computed_digests() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    fs::create_dir(&input).unwrap();
    let manifest_path = tmp.path().join("m.txt");
    fs::write(&manifest_path, "header\n0x00000001  0x0000000000000001  000  0000  Lib\n").unwrap();
    fs::write(module_path(&input, "Lib"), b"MZ lib").unwrap();

    let blob = tmp.path().join("m.blob");
    archive::pack(&blob, &manifest_path, &input, &PackOptions::default()).unwrap();
    assert_eq!(StoreReader::open(&blob).unwrap().entries[0].hash32, Some(1));

    let opts = PackOptions { digests: DigestSource::Computed, ..PackOptions::default() };
    archive::pack(&blob, &manifest_path, &input, &opts).unwrap();
    let entry = &StoreReader::open(&blob).unwrap().entries[0];
    assert_eq!(entry.hash32, Some(xastore::index::digest32("Lib")));
    assert_eq!(entry.hash64, Some(xastore::index::digest64("Lib")));
}

#[test]
fn test_list_names_entries() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    fs::create_dir(&input).unwrap();
    let manifest_path = write_manifest(tmp.path(), &["One", "Two"]);
    fs::write(module_path(&input, "One"), assembly_bytes(1, 2000)).unwrap();
    fs::write(module_path(&input, "Two"), assembly_bytes(2, 10)).unwrap();
    let opts = PackOptions { compress: false, ..PackOptions::default() };
    let blob = tmp.path().join("l.blob");
    archive::pack(&blob, &manifest_path, &input, &opts).unwrap();

    let manifest = Manifest::load(&manifest_path).unwrap();
    let listed = archive::list(&blob, Some(&manifest)).unwrap();
    let names: BTreeSet<_> = listed.iter().filter_map(|e| e.name.clone()).collect();
    assert_eq!(names, BTreeSet::from(["One".to_owned(), "Two".to_owned()]));
    assert!(listed.iter().all(|e| e.frame.is_none()));
    assert_eq!(listed[1].data.size, 14);
}

#[test]
fn test_raw_payload_with_frame_magic_roundtrips() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    fs::create_dir(&input).unwrap();
    let manifest = write_manifest(tmp.path(), &["Lookalike", "Plain"]);
    let lookalike = b"XALZ\0\0\0\0\x10\0\0\0hello world!".to_vec();
    let plain = assembly_bytes(4, 40);
    fs::write(module_path(&input, "Lookalike"), &lookalike).unwrap();
    fs::write(module_path(&input, "Plain"), &plain).unwrap();

    let blob = tmp.path().join("raw.blob");
    let opts = PackOptions { compress: false, ..PackOptions::default() };
    let report = archive::pack(&blob, &manifest, &input, &opts).unwrap();
    assert_eq!(report.promoted_framings, 1);

    let out = tmp.path().join("out");
    let unpacked = archive::unpack(&blob, &manifest, &out, &UnpackOptions::default()).unwrap();
    assert_eq!(fs::read(module_path(&out, "Lookalike")).unwrap(), lookalike);
    assert_eq!(fs::read(module_path(&out, "Plain")).unwrap(), plain);

    let sideband = FrameSideband::load(unpacked.sideband.unwrap()).unwrap().unwrap();
    assert_eq!(sideband.framing("Lookalike"), Some(Framing::Compressed { descriptor_index: 0 }));
    assert_eq!(sideband.framing("Plain"), Some(Framing::Raw));

    let rebuilt = tmp.path().join("rebuilt.blob");
    archive::pack(&rebuilt, &manifest, &out, &opts).unwrap();
    assert_eq!(fs::read(&rebuilt).unwrap(), fs::read(&blob).unwrap());
}

#[test]
fn test_manifest_names_cannot_leave_out_dir() {
    let tmp = TempDir::new().unwrap();
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    writer.add(PackEntry::new("x", 1, 1, b"MZ".to_vec()));
    let blob = tmp.path().join("one.blob");
    fs::write(&blob, writer.to_bytes().unwrap()).unwrap();

    let manifest = tmp.path().join("evil.manifest");
    fs::write(&manifest, "header\n0x1 0x1 000 0000 ../escaped\n").unwrap();
    let out = tmp.path().join("out");
    assert!(matches!(
        archive::unpack(&blob, &manifest, &out, &UnpackOptions::default()),
        Err(StoreError::Manifest { line: 2, .. })
    ));
    assert!(!tmp.path().join("escaped.dll").exists());
    assert!(!out.exists());
}

#[test]
fn test_duplicate_local_index() {
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    writer.add(PackEntry::new("A", 1, 1, b"MZ".to_vec()));
    writer.add(PackEntry::new("B", 2, 2, b"MZ".to_vec()));
    let mut bytes = writer.to_bytes().unwrap();
    // local_store_index of the second 32-bit record, which names entry 1
    let second = HEADER_SIZE + 2 * 24 + 20;
    bytes[second + 12..second + 16].copy_from_slice(&0u32.to_le_bytes());
    match StoreReader::new(Cursor::new(bytes)) {
        Err(StoreError::Format { offset, .. }) => assert_eq!(offset, second as u64),
        other => panic!("expected format error, got {:?}", other.err()),
    }
}

#[test]
fn test_nonzero_hash32_padding() {
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    writer.add(PackEntry::new("A", 1, 1, b"MZ".to_vec()));
    let mut bytes = writer.to_bytes().unwrap();
    let record = HEADER_SIZE + 24;
    bytes[record + 4] = 0xAA;
    match StoreReader::new(Cursor::new(bytes)) {
        Err(StoreError::Format { offset, .. }) => assert_eq!(offset, record as u64),
        other => panic!("expected format error, got {:?}", other.err()),
    }
}

#[test]
fn test_region_past_end_of_container() {
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    let mut e = PackEntry::new("A", 1, 1, b"MZ".to_vec());
    e.framing = Framing::Raw;
    writer.add(e);
    let mut bytes = writer.to_bytes().unwrap();
    let data_offset = (HEADER_SIZE + 24 + 40) as u64;
    // data size of the only local entry
    let at = HEADER_SIZE + 4;
    bytes[at..at + 4].copy_from_slice(&10_000u32.to_le_bytes());

    let mut store = StoreReader::new(Cursor::new(bytes)).unwrap();
    assert!(matches!(store.check_layout(), Err(StoreError::Format { .. })));
    match store.extract(0) {
        Err(StoreError::Format { offset, .. }) => assert_eq!(offset, data_offset),
        other => panic!("expected format error, got {other:?}"),
    }
    assert!(matches!(store.read_raw_data(0),
                     Err(StoreError::Format { offset, .. }) if offset == data_offset));
}

#[test]
fn test_zero_sized_side_data_is_absent() {
    let mut writer = StoreWriter::new(0, SideDataOrder::default());
    let mut e = PackEntry::new("A", 1, 1, b"MZ".to_vec());
    e.framing = Framing::Raw;
    e.debug = Some(b"pdb".to_vec());
    writer.add(e);
    let mut bytes = writer.to_bytes().unwrap();
    // debug size of the only local entry: (offset, 0)
    let at = HEADER_SIZE + 12;
    bytes[at..at + 4].copy_from_slice(&0u32.to_le_bytes());
    // config size of the only local entry, whose offset stays 0: (0, size)
    let at = HEADER_SIZE + 20;
    bytes[at..at + 4].copy_from_slice(&8u32.to_le_bytes());

    let mut store = StoreReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(store.entries[0].debug(), None);
    assert_eq!(store.entries[0].config(), None);
    let module = store.extract(0).unwrap();
    assert_eq!(module.data, b"MZ");
    assert_eq!(module.debug, None);
    assert_eq!(module.config, None);
}
