//! Write-ahead log (WAL).
//!
//! A durable, append-only journal of mutations against the memtable.
//! Records use a flat, fixed framing with no header and no checksums —
//! corruption detection is handled at the recovery layer by discarding
//! any trailing bytes that fail to parse as a complete record (the
//! "longest valid prefix" policy), not by verifying a digest.
//!
//! # On-disk record framing
//!
//! ```text
//! type(1) | klen(4 LE) | key(klen) | vlen(4 LE) | value(vlen)
//! ```
//!
//! `type` is `0` for a put, `1` for a tombstone. Tombstone records carry
//! `vlen == 0` and no value bytes.
//!
//! # Concurrency model
//!
//! WAL access is synchronized via `Arc<Mutex<File>>`; append-then-sync
//! runs under a single lock acquisition so two threads can never
//! interleave partial records.

#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::encoding::Encode;

/// Record type tag for a live value.
const RECORD_PUT: u8 = 0;
/// Record type tag for a tombstone.
const RECORD_TOMBSTONE: u8 = 1;

/// Errors returned by WAL operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WalError {
    /// Underlying filesystem operation failed.
    #[error("WAL I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One decoded WAL record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// The affected key.
    pub key: Vec<u8>,
    /// The value for a put record; empty for a tombstone.
    pub value: Vec<u8>,
    /// `true` if this record is a tombstone (delete).
    pub tombstone: bool,
}

fn encode_record(key: &[u8], value: &[u8], tombstone: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 4 + key.len() + 4 + value.len());
    let type_byte: u8 = if tombstone { RECORD_TOMBSTONE } else { RECORD_PUT };
    // encode_to is infallible for these fixed-width types; the buffer
    // grows in memory and never hits the u32-length ceiling in practice.
    type_byte.encode_to(&mut buf).expect("u8 encode cannot fail");
    key.encode_to(&mut buf).expect("key within u32::MAX bytes");
    if tombstone {
        0u32.encode_to(&mut buf).expect("u32 encode cannot fail");
    } else {
        value.encode_to(&mut buf).expect("value within u32::MAX bytes");
    }
    buf
}

/// Append-only write-ahead log over a single file.
pub struct Wal {
    path: PathBuf,
    file: Arc<Mutex<File>>,
    max_record_size: u32,
}

impl Wal {
    /// Opens (creating if absent) the WAL file at `path` for append.
    pub fn open(path: impl AsRef<Path>, max_record_size: u32) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        info!(path = %path.display(), "opened WAL for append");
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
            max_record_size,
        })
    }

    /// Path this WAL is backed by.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a put record.
    pub fn append_put(&self, key: &[u8], value: &[u8]) -> Result<(), WalError> {
        self.append(key, value, false)
    }

    /// Appends a tombstone record.
    pub fn append_delete(&self, key: &[u8]) -> Result<(), WalError> {
        self.append(key, &[], true)
    }

    fn append(&self, key: &[u8], value: &[u8], tombstone: bool) -> Result<(), WalError> {
        let record = encode_record(key, value, tombstone);
        let mut file = self.file.lock().expect("WAL lock poisoned");
        file.write_all(&record)?;
        trace!(bytes = record.len(), tombstone, "appended WAL record");
        Ok(())
    }

    /// Flushes OS buffers so every previously appended record is durable.
    pub fn sync(&self) -> Result<(), WalError> {
        let file = self.file.lock().expect("WAL lock poisoned");
        file.sync_all()?;
        trace!("synced WAL");
        Ok(())
    }

    /// Replays every record currently on disk, in file order.
    ///
    /// On a malformed or truncated trailing record, stops at the last
    /// fully-parsed record and truncates the file to that offset —
    /// the longest-valid-prefix recovery policy. Returns the list of
    /// records that should be re-applied to a freshly created memtable.
    pub fn replay(&self) -> Result<Vec<WalRecord>, WalError> {
        let mut file = self.file.lock().expect("WAL lock poisoned");
        file.seek(SeekFrom::Start(0))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < contents.len() {
            match parse_record(&contents[offset..], self.max_record_size) {
                Some((record, consumed)) => {
                    records.push(record);
                    offset += consumed;
                }
                None => {
                    warn!(
                        valid_prefix = offset,
                        total = contents.len(),
                        "WAL has a trailing partial record; truncating to last valid offset"
                    );
                    break;
                }
            }
        }

        if offset != contents.len() {
            file.set_len(offset as u64)?;
            file.seek(SeekFrom::End(0))?;
        }
        debug!(records = records.len(), "replayed WAL");
        Ok(records)
    }

    /// Closes this handle (also issues a final sync).
    pub fn close(&self) -> Result<(), WalError> {
        self.sync()
    }
}

/// Parses one record from the front of `buf`. Returns `None` if `buf`
/// does not contain a complete record (short read at any framing
/// boundary), signalling the caller to stop and truncate.
fn parse_record(buf: &[u8], max_record_size: u32) -> Option<(WalRecord, usize)> {
    if buf.is_empty() {
        return None;
    }
    let type_byte = buf[0];
    if type_byte != RECORD_PUT && type_byte != RECORD_TOMBSTONE {
        return None;
    }
    if buf.len() < 5 {
        return None;
    }
    let klen = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
    if klen > max_record_size {
        return None;
    }
    let klen = klen as usize;
    let mut pos = 5usize;
    if buf.len() < pos + klen {
        return None;
    }
    let key = buf[pos..pos + klen].to_vec();
    pos += klen;

    if buf.len() < pos + 4 {
        return None;
    }
    let vlen = u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
    if vlen > max_record_size {
        return None;
    }
    let vlen = vlen as usize;
    pos += 4;

    let tombstone = type_byte == RECORD_TOMBSTONE;
    let value = if tombstone {
        Vec::new()
    } else {
        if buf.len() < pos + vlen {
            return None;
        }
        let v = buf[pos..pos + vlen].to_vec();
        pos += vlen;
        v
    };

    Some((WalRecord { key, value, tombstone }, pos))
}
