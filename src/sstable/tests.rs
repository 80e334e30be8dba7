use super::builder::SstableBuilder;
use super::*;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn build_table(dir: &tempfile::TempDir, name: &str, entries: &[(&[u8], &[u8], bool)]) -> Sstable {
    let path = dir.path().join(name);
    let mut builder = SstableBuilder::create(&path).unwrap();
    for (k, v, tomb) in entries {
        builder.add(k, v, *tomb).unwrap();
    }
    builder.finish().unwrap();
    Sstable::open(&path).unwrap()
}

#[test]
fn lookup_finds_live_value() {
    init_tracing();
    let dir = tempdir().unwrap();
    let table = build_table(
        &dir,
        "1.sst",
        &[(b"apple", b"1", false), (b"banana", b"2", false), (b"cherry", b"3", false)],
    );
    assert_eq!(table.get(b"banana").unwrap(), Lookup::Found(b"2".to_vec()));
}

#[test]
fn lookup_reports_tombstone() {
    init_tracing();
    let dir = tempdir().unwrap();
    let table = build_table(&dir, "1.sst", &[(b"key", b"", true)]);
    assert_eq!(table.get(b"key").unwrap(), Lookup::Deleted);
}

#[test]
fn lookup_missing_key_is_not_present() {
    init_tracing();
    let dir = tempdir().unwrap();
    let table = build_table(&dir, "1.sst", &[(b"apple", b"1", false)]);
    assert_eq!(table.get(b"zzz").unwrap(), Lookup::NotPresent);
}

#[test]
fn smallest_and_largest_keys_are_first_and_last() {
    init_tracing();
    let dir = tempdir().unwrap();
    let table = build_table(
        &dir,
        "1.sst",
        &[(b"aaa", b"1", false), (b"mmm", b"2", false), (b"zzz", b"3", false)],
    );
    assert_eq!(table.smallest_key, b"aaa");
    assert_eq!(table.largest_key, b"zzz");
}

#[test]
fn footer_points_at_index_and_file_is_reopenable() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("1.sst");
    {
        let mut builder = SstableBuilder::create(&path).unwrap();
        builder.add(b"k", b"v", false).unwrap();
        builder.finish().unwrap();
    }
    // Reopening from scratch must re-derive the same index.
    let table = Sstable::open(&path).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(b"k").unwrap(), Lookup::Found(b"v".to_vec()));
}

#[test]
fn empty_builder_refuses_to_finish() {
    init_tracing();
    let dir = tempdir().unwrap();
    let builder = SstableBuilder::create(dir.path().join("empty.sst")).unwrap();
    assert!(builder.finish().is_err());
}

#[test]
fn builder_writes_via_tmp_then_rename() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("1.sst");
    let mut builder = SstableBuilder::create(&path).unwrap();
    let tmp_path = path.with_file_name("1.sst.tmp");
    assert!(tmp_path.exists(), "builder must create the .tmp sibling immediately");
    builder.add(b"k", b"v", false).unwrap();
    builder.finish().unwrap();
    assert!(!tmp_path.exists(), "tmp file must be renamed away on finish");
    assert!(path.exists());
}

#[test]
fn iter_entries_preserves_order_and_tombstones() {
    init_tracing();
    let dir = tempdir().unwrap();
    let table = build_table(
        &dir,
        "1.sst",
        &[(b"a", b"1", false), (b"b", b"", true), (b"c", b"3", false)],
    );
    let entries = table.iter_entries().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[1].0, b"b");
    assert!(entries[1].2);
}

#[test]
fn truncated_footer_is_rejected() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.sst");
    std::fs::write(&path, b"short").unwrap();
    assert!(matches!(
        Sstable::open(&path).unwrap_err(),
        SstableError::TooSmall { .. }
    ));
}

#[test]
fn corrupt_footer_offset_is_rejected() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.sst");
    // index_offset equal to file size is invalid (must point strictly inside).
    let mut bytes = vec![0u8; 16];
    bytes[8..16].copy_from_slice(&16u64.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(
        Sstable::open(&path).unwrap_err(),
        SstableError::CorruptFooter { .. }
    ));
}

#[test]
fn may_contain_range_rejects_keys_outside_bounds() {
    init_tracing();
    let dir = tempdir().unwrap();
    let table = build_table(
        &dir,
        "1.sst",
        &[(b"mmm", b"1", false), (b"nnn", b"2", false)],
    );
    assert!(table.may_contain_range(b"mmm"));
    assert!(table.may_contain_range(b"mmo"));
    assert!(table.may_contain_range(b"nnn"));
    assert!(!table.may_contain_range(b"aaa"));
    assert!(!table.may_contain_range(b"zzz"));
}

#[test]
fn key_in_range_is_inclusive_of_both_bounds() {
    assert!(key_in_range(b"mmm", b"mmm", b"nnn"));
    assert!(key_in_range(b"nnn", b"mmm", b"nnn"));
    assert!(key_in_range(b"mmo", b"mmm", b"nnn"));
    assert!(!key_in_range(b"aaa", b"mmm", b"nnn"));
    assert!(!key_in_range(b"zzz", b"mmm", b"nnn"));
}
