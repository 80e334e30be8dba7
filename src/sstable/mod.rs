//! Sorted-string table (SSTable) on-disk format and reader.
//!
//! An immutable, disk-backed sorted table produced by flushing a
//! memtable. The format deliberately carries no block splitting, no
//! Bloom filter, no checksums, and no multi-version entries — every key
//! appears exactly once, newest memtable state wins before it is ever
//! written.
//!
//! # On-disk layout
//!
//! ```text
//! data region:   { klen(4 LE) | key | vlen(4 LE) | value | type(1) }*
//! index region:  count(4 LE) { klen(4 LE) | key | offset(8 LE) }*
//! footer:        index_offset(8 LE)
//! ```
//!
//! `type` is `0` for a live value, `1` for a tombstone. The index
//! contains one entry per key, pointing at that key's data record.
//!
//! # Sub-modules
//!
//! - [`builder`] — [`SstableBuilder`] for constructing a table from a
//!   sorted stream of entries, writing atomically via a temp-file
//!   rename.

pub mod builder;

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, trace};

const RECORD_PUT: u8 = 0;
const RECORD_TOMBSTONE: u8 = 1;
/// Footer is a single 8-byte little-endian offset.
const FOOTER_SIZE: u64 = 8;

/// Errors returned by SSTable operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SstableError {
    /// Underlying filesystem operation failed.
    #[error("SSTable I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is too small to even hold a footer.
    #[error("SSTable {path} is smaller than the footer size")]
    TooSmall {
        /// Path of the offending file.
        path: PathBuf,
    },

    /// The footer's `index_offset` does not point inside the file.
    #[error("SSTable {path} has a corrupt footer: index_offset {index_offset} >= file_size {file_size}")]
    CorruptFooter {
        /// Path of the offending file.
        path: PathBuf,
        /// The (invalid) offset read from the footer.
        index_offset: u64,
        /// Total size of the file.
        file_size: u64,
    },

    /// The index region ended before `count` entries were read.
    #[error("SSTable {path} has a truncated index")]
    TruncatedIndex {
        /// Path of the offending file.
        path: PathBuf,
    },
}

/// `true` if `key` falls within `[smallest_key, largest_key]`, inclusive.
///
/// Shared by [`Sstable::may_contain_range`] and callers that only hold a
/// file's metadata (smallest/largest key) and want to skip opening it.
pub fn key_in_range(key: &[u8], smallest_key: &[u8], largest_key: &[u8]) -> bool {
    key >= smallest_key && key <= largest_key
}

/// Result of a point lookup against an [`Sstable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The key was not present in this table's index.
    NotPresent,
    /// The key is present with a live value.
    Found(Vec<u8>),
    /// The key is present but marked deleted.
    Deleted,
}

struct IndexEntry {
    key: Vec<u8>,
    offset: u64,
}

/// An open, immutable SSTable.
pub struct Sstable {
    path: PathBuf,
    file: Mutex<File>,
    index: Vec<IndexEntry>,
    /// First key stored in the table.
    pub smallest_key: Vec<u8>,
    /// Last key stored in the table.
    pub largest_key: Vec<u8>,
    /// Total size of the file on disk, in bytes.
    pub file_size: u64,
}

impl Sstable {
    /// Opens an existing SSTable file, reading its index into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SstableError> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        if file_size < FOOTER_SIZE {
            return Err(SstableError::TooSmall { path });
        }

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; 8];
        file.read_exact(&mut footer)?;
        let index_offset = u64::from_le_bytes(footer);
        if index_offset >= file_size {
            return Err(SstableError::CorruptFooter {
                path,
                index_offset,
                file_size,
            });
        }

        file.seek(SeekFrom::Start(index_offset))?;
        let mut count_buf = [0u8; 4];
        file.read_exact(&mut count_buf)
            .map_err(|_| SstableError::TruncatedIndex { path: path.clone() })?;
        let count = u32::from_le_bytes(count_buf) as usize;

        let mut index = Vec::with_capacity(count);
        for _ in 0..count {
            let mut klen_buf = [0u8; 4];
            file.read_exact(&mut klen_buf)
                .map_err(|_| SstableError::TruncatedIndex { path: path.clone() })?;
            let klen = u32::from_le_bytes(klen_buf) as usize;
            let mut key = vec![0u8; klen];
            file.read_exact(&mut key)
                .map_err(|_| SstableError::TruncatedIndex { path: path.clone() })?;
            let mut offset_buf = [0u8; 8];
            file.read_exact(&mut offset_buf)
                .map_err(|_| SstableError::TruncatedIndex { path: path.clone() })?;
            let offset = u64::from_le_bytes(offset_buf);
            index.push(IndexEntry { key, offset });
        }

        let smallest_key = index.first().map(|e| e.key.clone()).unwrap_or_default();
        let largest_key = index.last().map(|e| e.key.clone()).unwrap_or_default();

        debug!(path = %path.display(), entries = index.len(), "opened SSTable");
        Ok(Self {
            path,
            file: Mutex::new(file),
            index,
            smallest_key,
            largest_key,
            file_size,
        })
    }

    /// Path of this table on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of keys indexed by this table.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// `true` if this table has no entries (never produced by the builder).
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn binary_search(&self, key: &[u8]) -> Option<usize> {
        self.index
            .binary_search_by(|entry| entry.key.as_slice().cmp(key))
            .ok()
    }

    /// `true` if `key` falls within `[smallest_key, largest_key]`.
    pub fn may_contain_range(&self, key: &[u8]) -> bool {
        if self.index.is_empty() {
            return false;
        }
        key_in_range(key, &self.smallest_key, &self.largest_key)
    }

    /// Looks up `key`, reading its data record from disk on a match.
    pub fn get(&self, key: &[u8]) -> Result<Lookup, SstableError> {
        let Some(idx) = self.binary_search(key) else {
            return Ok(Lookup::NotPresent);
        };
        let offset = self.index[idx].offset;

        let mut file = self.file.lock().expect("SSTable file lock poisoned");
        file.seek(SeekFrom::Start(offset))?;

        let mut klen_buf = [0u8; 4];
        file.read_exact(&mut klen_buf)?;
        let klen = u32::from_le_bytes(klen_buf) as u64;
        file.seek(SeekFrom::Current(klen as i64))?;

        let mut vlen_buf = [0u8; 4];
        file.read_exact(&mut vlen_buf)?;
        let vlen = u32::from_le_bytes(vlen_buf) as usize;
        let mut value = vec![0u8; vlen];
        file.read_exact(&mut value)?;

        let mut type_buf = [0u8; 1];
        file.read_exact(&mut type_buf)?;

        trace!(key_len = key.len(), offset, "SSTable point lookup hit index");
        match type_buf[0] {
            RECORD_TOMBSTONE => Ok(Lookup::Deleted),
            _ => Ok(Lookup::Found(value)),
        }
    }

    /// Returns every `(key, value, tombstone)` entry in ascending order.
    ///
    /// Used by recovery to derive `smallest_key`/`largest_key` cheaply
    /// is unnecessary here (kept in the index already); this is used by
    /// tests and by any future multi-file merge.
    pub fn iter_entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>, bool)>, SstableError> {
        let mut file = self.file.lock().expect("SSTable file lock poisoned");
        let mut out = Vec::with_capacity(self.index.len());
        for entry in &self.index {
            file.seek(SeekFrom::Start(entry.offset))?;
            let mut klen_buf = [0u8; 4];
            file.read_exact(&mut klen_buf)?;
            let klen = u32::from_le_bytes(klen_buf) as usize;
            let mut key = vec![0u8; klen];
            file.read_exact(&mut key)?;
            let mut vlen_buf = [0u8; 4];
            file.read_exact(&mut vlen_buf)?;
            let vlen = u32::from_le_bytes(vlen_buf) as usize;
            let mut value = vec![0u8; vlen];
            file.read_exact(&mut value)?;
            let mut type_buf = [0u8; 1];
            file.read_exact(&mut type_buf)?;
            out.push((key, value, type_buf[0] == RECORD_TOMBSTONE));
        }
        Ok(out)
    }
}
