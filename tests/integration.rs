//! Integration tests for the public `fieldarchive` API.
//!
//! These tests exercise the archive purely through `fieldarchive::archive`,
//! `fieldarchive::field_table`, and `fieldarchive::storage_view` — no
//! internal modules are referenced.
//!
//! ## Coverage areas
//! - **Lifecycle**: open (Read/Write/Append), close, idempotent close, Drop
//! - **Round-trip**: write then reopen-and-read bit-identical bytes
//! - **Append/overwrite**: growing a field's history, replacing one snapshot
//! - **Integrity**: version gate, checksum mismatch on corruption
//! - **Mode exclusivity**: wrong-mode errors for read/write

use fieldarchive::archive::{ArchiveError, ArchiveMode, BinaryArchive};
use fieldarchive::field_table::FieldId;
use fieldarchive::storage_view::RawBuffer;
use tempfile::TempDir;

fn bytes(start: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| start.wrapping_add(i as u8)).collect()
}

#[test]
fn full_lifecycle_write_close_reopen_read() {
    let dir = TempDir::new().unwrap();

    let mut archive = BinaryArchive::open(dir.path(), ArchiveMode::Write).unwrap();
    let view = RawBuffer::new(bytes(0, 16), 1);
    archive.write(&view, &FieldId::new("u", 0)).unwrap();
    archive.close().unwrap();

    let archive = BinaryArchive::open(dir.path(), ArchiveMode::Read).unwrap();
    let mut out = RawBuffer::zeroed(16, 1);
    archive.read(&mut out, &FieldId::new("u", 0)).unwrap();
    assert_eq!(out.into_bytes(), bytes(0, 16));
}

#[test]
fn append_mode_grows_history_across_sessions() {
    let dir = TempDir::new().unwrap();

    let mut archive = BinaryArchive::open(dir.path(), ArchiveMode::Write).unwrap();
    archive
        .write(&RawBuffer::new(bytes(0, 8), 1), &FieldId::new("temp", 0))
        .unwrap();
    archive.close().unwrap();

    for id in 1..5u64 {
        let mut archive = BinaryArchive::open(dir.path(), ArchiveMode::Append).unwrap();
        archive
            .write(
                &RawBuffer::new(bytes(id as u8 * 8, 8), 1),
                &FieldId::new("temp", id),
            )
            .unwrap();
        archive.close().unwrap();
    }

    let archive = BinaryArchive::open(dir.path(), ArchiveMode::Read).unwrap();
    for id in 0..5u64 {
        let mut out = RawBuffer::zeroed(8, 1);
        archive.read(&mut out, &FieldId::new("temp", id)).unwrap();
        assert_eq!(out.into_bytes(), bytes(id as u8 * 8, 8));
    }
}

#[test]
fn overwrite_existing_snapshot_preserves_siblings() {
    let dir = TempDir::new().unwrap();
    let mut archive = BinaryArchive::open(dir.path(), ArchiveMode::Write).unwrap();
    for id in 0..3u64 {
        archive
            .write(
                &RawBuffer::new(bytes(id as u8 * 4, 4), 1),
                &FieldId::new("p", id),
            )
            .unwrap();
    }
    archive
        .write(&RawBuffer::new(vec![0xaa; 4], 1), &FieldId::new("p", 1))
        .unwrap();
    archive.close().unwrap();

    let archive = BinaryArchive::open(dir.path(), ArchiveMode::Read).unwrap();
    let mut out0 = RawBuffer::zeroed(4, 1);
    archive.read(&mut out0, &FieldId::new("p", 0)).unwrap();
    assert_eq!(out0.into_bytes(), bytes(0, 4));

    let mut out1 = RawBuffer::zeroed(4, 1);
    archive.read(&mut out1, &FieldId::new("p", 1)).unwrap();
    assert_eq!(out1.into_bytes(), vec![0xaa; 4]);

    let mut out2 = RawBuffer::zeroed(4, 1);
    archive.read(&mut out2, &FieldId::new("p", 2)).unwrap();
    assert_eq!(out2.into_bytes(), bytes(8, 4));
}

#[test]
fn overwrite_with_wrong_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut archive = BinaryArchive::open(dir.path(), ArchiveMode::Write).unwrap();
    archive
        .write(&RawBuffer::new(bytes(0, 16), 1), &FieldId::new("u", 0))
        .unwrap();

    let err = archive
        .write(&RawBuffer::new(bytes(0, 4), 1), &FieldId::new("u", 0))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::SizeMismatch { .. }));
}

#[test]
fn corrupted_byte_is_caught_by_checksum_on_read() {
    let dir = TempDir::new().unwrap();
    let mut archive = BinaryArchive::open(dir.path(), ArchiveMode::Write).unwrap();
    archive
        .write(&RawBuffer::new(bytes(0, 16), 1), &FieldId::new("u", 0))
        .unwrap();
    archive.close().unwrap();

    let data_path = dir.path().join("u.dat");
    let mut raw = std::fs::read(&data_path).unwrap();
    raw[5] ^= 0x01;
    std::fs::write(&data_path, raw).unwrap();

    let archive = BinaryArchive::open(dir.path(), ArchiveMode::Read).unwrap();
    let mut out = RawBuffer::zeroed(16, 1);
    let err = archive.read(&mut out, &FieldId::new("u", 0)).unwrap_err();
    assert!(matches!(err, ArchiveError::ChecksumMismatch { .. }));
}

#[test]
fn version_mismatch_in_manifest_fails_open() {
    let dir = TempDir::new().unwrap();
    BinaryArchive::open(dir.path(), ArchiveMode::Write)
        .unwrap()
        .close()
        .unwrap();

    let manifest_path = dir.path().join("ArchiveMetaData.json");
    let text = std::fs::read_to_string(&manifest_path).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
    value["binary_archive_version"] = serde_json::json!(999);
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    let err = BinaryArchive::open(dir.path(), ArchiveMode::Read).unwrap_err();
    assert!(matches!(
        err,
        ArchiveError::Manifest(fieldarchive::manifest::ManifestError::VersionMismatch { .. })
    ));
}

#[test]
fn write_in_read_mode_and_read_in_write_mode_both_reject() {
    let dir = TempDir::new().unwrap();
    BinaryArchive::open(dir.path(), ArchiveMode::Write)
        .unwrap()
        .close()
        .unwrap();

    let mut reader = BinaryArchive::open(dir.path(), ArchiveMode::Read).unwrap();
    let err = reader
        .write(&RawBuffer::new(bytes(0, 4), 1), &FieldId::new("u", 0))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::WrongMode { .. }));

    let writer = BinaryArchive::open(dir.path(), ArchiveMode::Append).unwrap();
    let mut out = RawBuffer::zeroed(4, 1);
    let err = writer.read(&mut out, &FieldId::new("u", 0)).unwrap_err();
    assert!(matches!(err, ArchiveError::WrongMode { .. }));
}

#[test]
fn opening_nonempty_directory_for_write_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("stray"), b"data").unwrap();
    let err = BinaryArchive::open(dir.path(), ArchiveMode::Write).unwrap_err();
    assert!(matches!(err, ArchiveError::DirectoryNotEmpty(_)));
}

#[test]
fn drop_without_explicit_close_still_flushes() {
    let dir = TempDir::new().unwrap();
    {
        let mut archive = BinaryArchive::open(dir.path(), ArchiveMode::Write).unwrap();
        archive
            .write(&RawBuffer::new(bytes(0, 4), 1), &FieldId::new("u", 0))
            .unwrap();
    }

    assert!(dir.path().join("ArchiveMetaData.json").is_file());
    let archive = BinaryArchive::open(dir.path(), ArchiveMode::Read).unwrap();
    let mut out = RawBuffer::zeroed(4, 1);
    archive.read(&mut out, &FieldId::new("u", 0)).unwrap();
    assert_eq!(out.into_bytes(), bytes(0, 4));
}
