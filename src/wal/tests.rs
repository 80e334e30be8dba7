use super::*;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open_wal(dir: &tempfile::TempDir) -> Wal {
    Wal::open(dir.path().join("wal.log"), 1 << 20).expect("open wal")
}

#[test]
fn empty_wal_replays_nothing() {
    init_tracing();
    let dir = tempdir().unwrap();
    let wal = open_wal(&dir);
    assert!(wal.replay().unwrap().is_empty());
}

#[test]
fn put_and_delete_round_trip() {
    init_tracing();
    let dir = tempdir().unwrap();
    let wal = open_wal(&dir);
    wal.append_put(b"key1", b"value1").unwrap();
    wal.append_delete(b"key2").unwrap();
    wal.sync().unwrap();

    let records = wal.replay().unwrap();
    assert_eq!(
        records,
        vec![
            WalRecord { key: b"key1".to_vec(), value: b"value1".to_vec(), tombstone: false },
            WalRecord { key: b"key2".to_vec(), value: Vec::new(), tombstone: true },
        ]
    );
}

#[test]
fn reopening_preserves_prior_records() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");
    {
        let wal = Wal::open(&path, 1 << 20).unwrap();
        wal.append_put(b"a", b"1").unwrap();
        wal.sync().unwrap();
    }
    let wal = Wal::open(&path, 1 << 20).unwrap();
    let records = wal.replay().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, b"a");
}

#[test]
fn truncated_trailing_record_is_discarded_and_file_is_shortened() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let wal = Wal::open(&path, 1 << 20).unwrap();
    wal.append_put(b"good", b"value").unwrap();
    wal.sync().unwrap();

    // Append a partial record directly, simulating a crash mid-write.
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[0u8, 3, 0, 0, 0, b'b', b'a']).unwrap(); // klen=3 but only 2 key bytes
    }

    let wal = Wal::open(&path, 1 << 20).unwrap();
    let records = wal.replay().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, b"good");

    // The truncation must have actually shortened the file on disk.
    let good_only_len = std::fs::metadata(&path).unwrap().len();
    let full_record_len = 1 + 4 + 4 /* "good" */ + 4 + 5 /* "value" */;
    assert_eq!(good_only_len, full_record_len as u64);
}

#[test]
fn invalid_type_byte_truncates_to_prior_records() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");
    let wal = Wal::open(&path, 1 << 20).unwrap();
    wal.append_put(b"k", b"v").unwrap();
    wal.sync().unwrap();
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[7u8]).unwrap();
    }
    let wal = Wal::open(&path, 1 << 20).unwrap();
    let records = wal.replay().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, b"k");
}
