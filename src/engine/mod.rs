//! The database facade: the public entry point tying the memtable, the
//! write-ahead log, and the version set together under a single
//! exclusion lock.
//!
//! All public operations — `put`, `delete`, `get` — take the engine
//! lock for their entire duration. This makes reads and writes mutually
//! exclusive, which is the deliberate simplification this design makes:
//! once a mutation returns, every subsequent `get` observes it, and
//! there is no separate visibility-ordering proof required beyond "the
//! lock serializes everything."


use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::memtable::{Lookup as MemtableLookup, Memtable};
use crate::sstable::builder::SstableBuilder;
use crate::sstable::SstableError;
use crate::version::{Lookup as VersionLookup, VersionError, VersionSet};
use crate::wal::{Wal, WalError};

/// Name of the single write-ahead log file under the database directory.
const WAL_FILE_NAME: &str = "wal.log";

/// Default memtable byte-size threshold that triggers a flush (4 MiB).
pub const DEFAULT_MEMTABLE_SIZE_LIMIT: usize = 4 * 1024 * 1024;

/// Default ceiling on a single WAL record's key or value length.
pub const DEFAULT_MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// Interval at which the background syncer flushes the WAL in
/// asynchronous-durability mode.
const BACKGROUND_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Errors returned by the database facade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Underlying filesystem operation failed.
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A write-ahead log operation failed.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// An SSTable operation failed.
    #[error(transparent)]
    Sstable(#[from] SstableError),

    /// A version-set operation failed.
    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Open-time configuration for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// If `true`, every `put`/`delete` syncs the WAL before returning.
    /// If `false`, durability is provided by a background syncer that
    /// runs roughly once per second, plus a final sync on close.
    pub sync: bool,
    /// Byte-size threshold of live memtable entries that triggers a
    /// flush. See the data model: sum of key+value bytes.
    pub memtable_size_limit: usize,
    /// Defensive ceiling on any single record's key/value length, used
    /// to bound corrupted length prefixes during WAL replay.
    pub max_record_size: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sync: true,
            memtable_size_limit: DEFAULT_MEMTABLE_SIZE_LIMIT,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

/// Result of an [`Engine::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    /// The key has no live value.
    NotFound,
    /// The key's newest value.
    Found(Vec<u8>),
}

/// The mutable state protected by the engine's single exclusion lock:
/// the active memtable and the currently open WAL.
struct Inner {
    memtable: Memtable,
    wal: Wal,
}

struct Shared {
    db_dir: PathBuf,
    options: EngineOptions,
    inner: Mutex<Inner>,
    versions: VersionSet,
    stop_syncer: AtomicBool,
    syncer_cvar: Condvar,
    syncer_gate: Mutex<()>,
}

/// An open embedded key-value database.
///
/// Cloning an `Engine` is cheap (an `Arc` clone internally) and shares
/// the same underlying state, including the exclusion lock.
#[derive(Clone)]
pub struct Engine {
    shared: std::sync::Arc<Shared>,
    syncer: std::sync::Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Engine {
    /// Opens (or creates) a database at `path`.
    ///
    /// Recovery order: scan the directory for existing SSTables, then
    /// replay the WAL into a fresh memtable, then keep the WAL open for
    /// append. Replaying before accepting new writes means a truncation
    /// performed by replay completes before any new record is appended.
    pub fn open(path: impl AsRef<Path>, options: EngineOptions) -> Result<Self, EngineError> {
        let db_dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&db_dir)?;

        let versions = VersionSet::recover(&db_dir)?;

        let memtable = Memtable::new();
        let wal_path = db_dir.join(WAL_FILE_NAME);
        let wal = Wal::open(&wal_path, options.max_record_size)?;
        for record in wal.replay()? {
            if record.tombstone {
                memtable.delete(&record.key);
            } else {
                memtable.put(&record.key, &record.value);
            }
        }

        let shared = std::sync::Arc::new(Shared {
            db_dir: db_dir.clone(),
            options: options.clone(),
            inner: Mutex::new(Inner { memtable, wal }),
            versions,
            stop_syncer: AtomicBool::new(false),
            syncer_cvar: Condvar::new(),
            syncer_gate: Mutex::new(()),
        });

        let engine = Self {
            shared,
            syncer: std::sync::Arc::new(Mutex::new(None)),
        };

        if !options.sync {
            engine.start_background_syncer();
        }

        info!(db_dir = %db_dir.display(), sync = options.sync, "engine opened");
        Ok(engine)
    }

    fn start_background_syncer(&self) {
        let shared = std::sync::Arc::clone(&self.shared);
        let handle = thread::spawn(move || loop {
            let guard = shared.syncer_gate.lock().expect("syncer gate lock poisoned");
            let (_guard, _timeout) = shared
                .syncer_cvar
                .wait_timeout(guard, BACKGROUND_SYNC_INTERVAL)
                .expect("syncer gate lock poisoned");
            if shared.stop_syncer.load(Ordering::SeqCst) {
                break;
            }
            let inner = shared.inner.lock().expect("engine lock poisoned");
            if let Err(err) = inner.wal.sync() {
                warn!(error = %err, "background WAL sync failed");
            }
        });
        *self.syncer.lock().expect("syncer handle lock poisoned") = Some(handle);
    }

    /// Closes the engine: stops the background syncer (if any), issues
    /// a final WAL sync, and releases resources.
    pub fn close(&self) -> Result<(), EngineError> {
        self.shared.stop_syncer.store(true, Ordering::SeqCst);
        self.shared.syncer_cvar.notify_all();
        if let Some(handle) = self.syncer.lock().expect("syncer handle lock poisoned").take() {
            let _ = handle.join();
        }
        let inner = self.shared.inner.lock().expect("engine lock poisoned");
        inner.wal.close()?;
        info!(db_dir = %self.shared.db_dir.display(), "engine closed");
        Ok(())
    }

    /// Inserts or overwrites `key` with `value`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        let mut inner = self.shared.inner.lock().expect("engine lock poisoned");
        self.flush_if_needed(&mut inner)?;
        inner.wal.append_put(key, value)?;
        if self.shared.options.sync {
            inner.wal.sync()?;
        }
        inner.memtable.put(key, value);
        Ok(())
    }

    /// Marks `key` as deleted.
    pub fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
        let mut inner = self.shared.inner.lock().expect("engine lock poisoned");
        self.flush_if_needed(&mut inner)?;
        inner.wal.append_delete(key)?;
        if self.shared.options.sync {
            inner.wal.sync()?;
        }
        inner.memtable.delete(key);
        Ok(())
    }

    /// Looks up `key`, consulting the memtable first and falling back to
    /// the current version's level-0 files.
    pub fn get(&self, key: &[u8]) -> Result<GetResult, EngineError> {
        let inner = self.shared.inner.lock().expect("engine lock poisoned");
        match inner.memtable.lookup(key) {
            MemtableLookup::Live(value) => return Ok(GetResult::Found(value)),
            MemtableLookup::Tombstoned => return Ok(GetResult::NotFound),
            MemtableLookup::NotPresent => {}
        }
        match self.shared.versions.current().get(key)? {
            VersionLookup::Found(value) => Ok(GetResult::Found(value)),
            VersionLookup::Deleted | VersionLookup::NotPresent => Ok(GetResult::NotFound),
        }
    }

    /// Forces a flush of the current memtable to a new SSTable,
    /// publishes a new version, and rotates the WAL. No-op if the
    /// memtable is empty. Exposed so callers (and tests) can force a
    /// flush without waiting for the size threshold.
    pub fn flush(&self) -> Result<(), EngineError> {
        let mut inner = self.shared.inner.lock().expect("engine lock poisoned");
        self.do_flush(&mut inner)
    }

    fn flush_if_needed(&self, inner: &mut Inner) -> Result<(), EngineError> {
        if inner.memtable.memory_usage() < self.shared.options.memtable_size_limit {
            return Ok(());
        }
        self.do_flush(inner)
    }

    /// Builds a new SSTable from the current memtable, publishes a
    /// successor version, then rotates the WAL. Must be called while
    /// holding the engine lock.
    fn do_flush(&self, inner: &mut Inner) -> Result<(), EngineError> {
        if inner.memtable.is_empty() {
            return Ok(());
        }

        let file_number = self.shared.versions.new_file_number();
        let sstable_path = self.shared.db_dir.join(format!("{file_number}.sst"));
        let mut builder = SstableBuilder::create(&sstable_path)?;
        for (key, value, tombstone) in inner.memtable.iterate() {
            builder.add(&key, &value, tombstone)?;
        }
        let built = builder.finish()?;

        let meta = crate::version::FileMetaData {
            number: file_number,
            file_size: built.file_size,
            smallest_key: built.smallest_key,
            largest_key: built.largest_key,
        };
        let successor = self.shared.versions.current().with_added_file(meta);
        self.shared.versions.log_and_apply(successor);

        inner.memtable = Memtable::new();

        inner.wal.close()?;
        let wal_path = inner.wal.path().to_path_buf();
        fs::remove_file(&wal_path)?;
        inner.wal = Wal::open(&wal_path, self.shared.options.max_record_size)?;

        info!(file_number, "flushed memtable to SSTable and rotated WAL");
        Ok(())
    }
}
