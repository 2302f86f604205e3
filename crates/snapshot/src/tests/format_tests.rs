use super::helpers::*;
use crate::*;
use anyhow::Result;
use std::fs::{self, OpenOptions};
use tempfile::tempdir;

#[test]
fn file_names_are_zero_padded_and_parse_back() {
    assert_eq!(file_name(42, VersionKind::Delta), "0000000042.delta");
    assert_eq!(file_name(u32::MAX, VersionKind::Base), "4294967295.base");
    assert_eq!(parse_file_name("0000000042.delta"), Some((42, VersionKind::Delta)));
    assert_eq!(parse_file_name("0000000007.base"), Some((7, VersionKind::Base)));
}

#[test]
fn foreign_file_names_are_ignored() {
    for name in ["42.base", "0000000042.base.tmp", "000000004x.base", "0000000042.sst", "cache"] {
        assert_eq!(parse_file_name(name), None, "{}", name);
    }
}

#[test]
fn scan_versions_filters_by_kind_and_tolerates_missing_dir() -> Result<()> {
    let dir = tempdir()?;
    assert!(scan_versions(&dir.path().join("nope"), VersionKind::Base)?.is_empty());

    SnapshotWriter::write(&dir.path().join(file_name(1, VersionKind::Base)), VersionKind::Base, Vec::<Record>::new())?;
    SnapshotWriter::write(&dir.path().join(file_name(2, VersionKind::Delta)), VersionKind::Delta, Vec::<Record>::new())?;
    fs::write(dir.path().join("notes.txt"), b"x")?;

    assert_eq!(scan_versions(dir.path(), VersionKind::Base)?.into_iter().collect::<Vec<_>>(), vec![1]);
    assert_eq!(scan_versions(dir.path(), VersionKind::Delta)?.into_iter().collect::<Vec<_>>(), vec![2]);
    Ok(())
}

#[test]
fn delta_records_replay_in_write_order() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join(file_name(3, VersionKind::Delta));
    let records = vec![put("a", "1"), del("b"), put("a", "2"), put("", "empty-key")];
    let summary = SnapshotWriter::write(&path, VersionKind::Delta, records.clone())?;
    assert_eq!(summary.num_records, 4);
    assert_eq!(summary.num_bytes, fs::metadata(&path)?.len());

    let reader = SnapshotReader::open(&path)?;
    assert_eq!(reader.kind(), VersionKind::Delta);
    assert_eq!(reader.num_records(), 4);
    assert_eq!(reader.records()?, records);
    Ok(())
}

#[test]
fn load_applies_puts_and_deletes() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("d.delta");
    SnapshotWriter::write(&path, VersionKind::Delta, vec![put("a", "1"), put("b", "2"), del("a"), put("b", "3")])?;

    assert_eq!(SnapshotReader::load(&path)?, map(&[("b", "3")]));
    assert_eq!(SnapshotReader::get(&path, b"b")?, Some(b"3".to_vec()));
    assert_eq!(SnapshotReader::get(&path, b"a")?, None);
    Ok(())
}

#[test]
fn empty_file_is_valid() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("e.base");
    let summary = SnapshotWriter::write(&path, VersionKind::Base, Vec::<Record>::new())?;
    assert_eq!(summary.num_records, 0);
    assert_eq!(summary.num_bytes, HEADER_BYTES);
    assert!(SnapshotReader::load(&path)?.is_empty());
    Ok(())
}

#[test]
fn base_refuses_deletes_and_leaves_nothing_behind() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join(file_name(0, VersionKind::Base));
    let err = SnapshotWriter::write(&path, VersionKind::Base, vec![put("a", "1"), del("a")]).unwrap_err();
    assert!(matches!(err, FormatError::DeleteInBase));
    assert!(!path.exists());
    assert_eq!(fs::read_dir(dir.path())?.count(), 0, "temp file must be removed");
    Ok(())
}

#[test]
fn rewrite_replaces_existing_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("x.base");
    SnapshotWriter::write(&path, VersionKind::Base, vec![put("a", "1")])?;
    SnapshotWriter::write(&path, VersionKind::Base, vec![put("b", "2")])?;
    assert_eq!(SnapshotReader::load(&path)?, map(&[("b", "2")]));
    Ok(())
}

fn written(dir: &std::path::Path) -> Result<std::path::PathBuf> {
    let path = dir.join("c.delta");
    SnapshotWriter::write(&path, VersionKind::Delta, vec![put("key", "value"), del("gone")])?;
    Ok(path)
}

#[test]
fn flipped_byte_is_a_crc_error() -> Result<()> {
    let dir = tempdir()?;
    let path = written(dir.path())?;
    let mut bytes = fs::read(&path)?;
    // last byte of the first record's value
    let idx = HEADER_BYTES as usize + 8 + 1 + 4 + 3 + 4 + 4;
    bytes[idx] ^= 0xFF;
    fs::write(&path, &bytes)?;

    let err = SnapshotReader::open(&path)?.records().unwrap_err();
    assert!(matches!(err, FormatError::Corrupt(_)), "{:?}", err);
    Ok(())
}

#[test]
fn truncated_file_is_corrupt() -> Result<()> {
    let dir = tempdir()?;
    let path = written(dir.path())?;
    let len = fs::metadata(&path)?.len();
    OpenOptions::new().write(true).open(&path)?.set_len(len - 2)?;

    let err = SnapshotReader::open(&path)?.records().unwrap_err();
    assert!(matches!(err, FormatError::Corrupt(_)), "{:?}", err);
    Ok(())
}

#[test]
fn trailing_garbage_is_corrupt() -> Result<()> {
    let dir = tempdir()?;
    let path = written(dir.path())?;
    let mut bytes = fs::read(&path)?;
    bytes.extend_from_slice(b"junk");
    fs::write(&path, &bytes)?;

    let err = SnapshotReader::load(&path).unwrap_err();
    assert!(matches!(err, FormatError::Corrupt(_)), "{:?}", err);
    Ok(())
}

#[test]
fn wrong_magic_and_short_files_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let foreign = dir.path().join("foreign.base");
    fs::write(&foreign, b"SST3 not a snapshot")?;
    assert!(matches!(SnapshotReader::open(&foreign).unwrap_err(), FormatError::BadMagic(_)));

    let short = dir.path().join("short.base");
    fs::write(&short, b"VSN")?;
    assert!(matches!(SnapshotReader::open(&short).unwrap_err(), FormatError::Corrupt(_)));
    Ok(())
}

#[test]
fn key_at_limit_round_trips_and_one_more_byte_is_refused() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("k.delta");
    let at_limit = vec![b'k'; MAX_KEY_BYTES];
    SnapshotWriter::write(&path, VersionKind::Delta, vec![Record::put(at_limit.clone(), "v"), Record::del(at_limit.clone())])?;
    assert_eq!(SnapshotReader::open(&path)?.records()?.len(), 2);

    let over = vec![b'k'; MAX_KEY_BYTES + 1];
    for record in [Record::put(over.clone(), "v"), Record::del(over.clone())] {
        let err = SnapshotWriter::write(&path, VersionKind::Delta, vec![record]).unwrap_err();
        assert!(matches!(err, FormatError::TooLarge { what: "key", .. }), "{:?}", err);
    }
    // the earlier file is untouched by the refused writes
    assert_eq!(SnapshotReader::open(&path)?.records()?.len(), 2);
    Ok(())
}

#[test]
fn value_at_limit_round_trips_and_one_more_byte_is_refused() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("v.base");
    SnapshotWriter::write(&path, VersionKind::Base, vec![Record::put("k", vec![b'v'; MAX_VALUE_BYTES])])?;
    assert_eq!(SnapshotReader::get(&path, b"k")?.map(|v| v.len()), Some(MAX_VALUE_BYTES));

    let over = dir.path().join("over.base");
    let err = SnapshotWriter::write(&over, VersionKind::Base, vec![Record::put("k", vec![b'v'; MAX_VALUE_BYTES + 1])])
        .unwrap_err();
    assert!(matches!(err, FormatError::TooLarge { what: "value", .. }), "{:?}", err);
    assert!(!over.exists());
    Ok(())
}
