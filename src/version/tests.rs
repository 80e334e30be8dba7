use super::*;
use crate::sstable::builder::SstableBuilder;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn write_sstable(dir: &Path, number: u64, entries: &[(&[u8], &[u8], bool)]) -> FileMetaData {
    let path = dir.join(format!("{number}.sst"));
    let mut builder = SstableBuilder::create(&path).unwrap();
    for (k, v, tomb) in entries {
        builder.add(k, v, *tomb).unwrap();
    }
    let built = builder.finish().unwrap();
    FileMetaData {
        number,
        file_size: built.file_size,
        smallest_key: built.smallest_key,
        largest_key: built.largest_key,
    }
}

#[test]
fn empty_version_reports_not_present() {
    init_tracing();
    let dir = tempdir().unwrap();
    let version = Version::empty(dir.path());
    assert_eq!(version.get(b"missing").unwrap(), Lookup::NotPresent);
}

#[test]
fn recover_discovers_existing_sstables() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_sstable(dir.path(), 1, &[(b"a", b"1", false)]);
    write_sstable(dir.path(), 2, &[(b"b", b"2", false)]);

    let vs = VersionSet::recover(dir.path()).unwrap();
    let version = vs.current();
    assert_eq!(version.files(0).len(), 2);
    assert_eq!(version.get(b"a").unwrap(), Lookup::Found(b"1".to_vec()));
    assert_eq!(version.get(b"b").unwrap(), Lookup::Found(b"2".to_vec()));
    assert_eq!(vs.new_file_number(), 3);
}

#[test]
fn newest_file_shadows_older_file_for_same_key() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_sstable(dir.path(), 1, &[(b"k", b"old", false)]);
    write_sstable(dir.path(), 2, &[(b"k", b"new", false)]);

    let vs = VersionSet::recover(dir.path()).unwrap();
    assert_eq!(vs.current().get(b"k").unwrap(), Lookup::Found(b"new".to_vec()));
}

#[test]
fn tombstone_in_newer_file_shadows_older_put() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_sstable(dir.path(), 1, &[(b"k", b"old", false)]);
    write_sstable(dir.path(), 2, &[(b"k", b"", true)]);

    let vs = VersionSet::recover(dir.path()).unwrap();
    assert_eq!(vs.current().get(b"k").unwrap(), Lookup::Deleted);
}

#[test]
fn log_and_apply_swaps_in_successor_version() {
    init_tracing();
    let dir = tempdir().unwrap();
    let vs = VersionSet::recover(dir.path()).unwrap();
    assert_eq!(vs.current().files(0).len(), 0);

    let meta = write_sstable(dir.path(), vs.new_file_number(), &[(b"k", b"v", false)]);
    let successor = vs.current().with_added_file(meta);
    vs.log_and_apply(successor);

    assert_eq!(vs.current().files(0).len(), 1);
    assert_eq!(vs.current().get(b"k").unwrap(), Lookup::Found(b"v".to_vec()));
}

#[test]
fn malformed_sstable_is_skipped_not_fatal() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_sstable(dir.path(), 1, &[(b"a", b"1", false)]);
    std::fs::write(dir.path().join("2.sst"), b"short").unwrap();

    let vs = VersionSet::recover(dir.path()).unwrap();
    assert_eq!(vs.current().files(0).len(), 1);
    assert_eq!(vs.new_file_number(), 2);
}
