//! Version and VersionSet — tracking which SSTables constitute the
//! current database state.
//!
//! Only level 0 is ever populated; the seven-level array shape is kept
//! for fidelity with the layered design this is drawn from, even though
//! this engine never compacts level 0 into lower levels. There is no
//! manifest file: the live file list is reconstructed at open time by
//! scanning the database directory for `<number>.sst` files.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use crate::sstable::{key_in_range, Sstable, SstableError};

/// Number of levels kept in a [`Version`]'s file array. Only level 0 is
/// ever populated by this engine.
pub const NUM_LEVELS: usize = 7;

/// Errors returned by version/version-set operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VersionError {
    /// Underlying filesystem operation failed.
    #[error("version set I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata describing one live SSTable.
#[derive(Debug, Clone)]
pub struct FileMetaData {
    /// The file's number; on-disk path is `<dir>/<number>.sst`.
    pub number: u64,
    /// Total size of the file on disk, in bytes.
    pub file_size: u64,
    /// First key stored in the file.
    pub smallest_key: Vec<u8>,
    /// Last key stored in the file.
    pub largest_key: Vec<u8>,
}

/// Result of a [`Version::get`] lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// No live file contains this key.
    NotPresent,
    /// The key is present with a live value.
    Found(Vec<u8>),
    /// The key is present but marked deleted.
    Deleted,
}

/// An immutable snapshot of the database's on-disk file set.
///
/// Modifications are expressed by constructing a successor `Version`;
/// an existing `Version` is never mutated after publication.
pub struct Version {
    db_dir: PathBuf,
    levels: [Vec<FileMetaData>; NUM_LEVELS],
    table_cache: RwLock<Vec<(u64, Arc<Sstable>)>>,
}

impl Version {
    /// Creates an empty version rooted at `db_dir`.
    pub fn empty(db_dir: impl AsRef<Path>) -> Self {
        Self {
            db_dir: db_dir.as_ref().to_path_buf(),
            levels: std::array::from_fn(|_| Vec::new()),
            table_cache: RwLock::new(Vec::new()),
        }
    }

    /// Builds a successor version that copies every level of `self` and
    /// appends `meta` to level 0 (highest file number last).
    pub fn with_added_file(&self, meta: FileMetaData) -> Self {
        let mut levels: [Vec<FileMetaData>; NUM_LEVELS] = std::array::from_fn(|i| self.levels[i].clone());
        levels[0].push(meta);
        levels[0].sort_by_key(|f| f.number);
        Self {
            db_dir: self.db_dir.clone(),
            levels,
            table_cache: RwLock::new(Vec::new()),
        }
    }

    /// File metadata for `level` (0 for the only populated level here).
    pub fn files(&self, level: usize) -> &[FileMetaData] {
        &self.levels[level]
    }

    fn table_path(&self, number: u64) -> PathBuf {
        self.db_dir.join(format!("{number}.sst"))
    }

    fn get_table(&self, number: u64) -> Result<Arc<Sstable>, SstableError> {
        if let Some((_, table)) = self
            .table_cache
            .read()
            .expect("version table cache lock poisoned")
            .iter()
            .find(|(n, _)| *n == number)
        {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(Sstable::open(self.table_path(number))?);
        self.table_cache
            .write()
            .expect("version table cache lock poisoned")
            .push((number, Arc::clone(&table)));
        Ok(table)
    }

    /// Looks up `key` across level 0, newest file (highest number) first,
    /// stopping at the first decisive answer.
    pub fn get(&self, key: &[u8]) -> Result<Lookup, SstableError> {
        for meta in self.levels[0].iter().rev() {
            if !key_in_range(key, &meta.smallest_key, &meta.largest_key) {
                continue;
            }
            let table = self.get_table(meta.number)?;
            match table.get(key)? {
                crate::sstable::Lookup::Found(v) => return Ok(Lookup::Found(v)),
                crate::sstable::Lookup::Deleted => return Ok(Lookup::Deleted),
                crate::sstable::Lookup::NotPresent => continue,
            }
        }
        Ok(Lookup::NotPresent)
    }
}

/// Owns the current [`Version`] and the next file number to allocate.
pub struct VersionSet {
    db_dir: PathBuf,
    next_file_number: AtomicU64,
    current: RwLock<Arc<Version>>,
}

impl VersionSet {
    /// Scans `db_dir` for `<number>.sst` files and builds the initial
    /// version from whatever is found. Malformed tables are logged and
    /// skipped rather than aborting recovery.
    pub fn recover(db_dir: impl AsRef<Path>) -> Result<Self, VersionError> {
        let db_dir = db_dir.as_ref().to_path_buf();
        let mut files = Vec::new();
        let mut max_number = 0u64;

        for entry in fs::read_dir(&db_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sst") {
                continue;
            }
            let Some(number) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };

            match Sstable::open(&path) {
                Ok(table) => {
                    max_number = max_number.max(number);
                    files.push(FileMetaData {
                        number,
                        file_size: table.file_size,
                        smallest_key: table.smallest_key.clone(),
                        largest_key: table.largest_key.clone(),
                    });
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping malformed SSTable during recovery");
                }
            }
        }
        files.sort_by_key(|f| f.number);

        let mut version = Version::empty(&db_dir);
        version.levels[0] = files;

        info!(
            db_dir = %db_dir.display(),
            files = version.levels[0].len(),
            next_file_number = max_number + 1,
            "recovered version set from directory scan"
        );

        Ok(Self {
            db_dir,
            next_file_number: AtomicU64::new(max_number + 1),
            current: RwLock::new(Arc::new(version)),
        })
    }

    /// Returns the current version (a cheap `Arc` clone).
    pub fn current(&self) -> Arc<Version> {
        Arc::clone(&self.current.read().expect("version set lock poisoned"))
    }

    /// Allocates and returns the next file number.
    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Atomically swaps in `new_version` as the current version.
    pub fn log_and_apply(&self, new_version: Version) {
        let mut current = self.current.write().expect("version set lock poisoned");
        *current = Arc::new(new_version);
    }

    /// Directory this version set is rooted at.
    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }
}
