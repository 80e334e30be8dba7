//! SSTable builder.
//!
//! Writes a sorted stream of `(key, value, tombstone)` entries to a
//! temporary sibling path, then renames it into place once the footer
//! has been flushed and synced. A crash mid-build can never leave a
//! partially-written file at the final path — recovery only ever sees
//! a path after its rename has committed.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::SstableError;

const RECORD_PUT: u8 = 0;
const RECORD_TOMBSTONE: u8 = 1;

/// Builds one SSTable file from an ascending stream of memtable entries.
pub struct SstableBuilder {
    final_path: PathBuf,
    tmp_path: PathBuf,
    writer: BufWriter<File>,
    offset: u64,
    index: Vec<(Vec<u8>, u64)>,
    smallest_key: Option<Vec<u8>>,
    largest_key: Option<Vec<u8>>,
}

impl SstableBuilder {
    /// Creates the temporary file backing a new SSTable at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SstableError> {
        let final_path = path.as_ref().to_path_buf();
        let mut tmp_path = final_path.clone();
        let mut tmp_name = tmp_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        tmp_path.set_file_name(tmp_name);

        let file = File::create(&tmp_path)?;
        Ok(Self {
            final_path,
            tmp_path,
            writer: BufWriter::new(file),
            offset: 0,
            index: Vec::new(),
            smallest_key: None,
            largest_key: None,
        })
    }

    /// Appends one entry. Entries must be supplied in strictly ascending
    /// key order; the caller (the flush path, iterating the memtable) is
    /// responsible for ordering.
    pub fn add(&mut self, key: &[u8], value: &[u8], tombstone: bool) -> Result<(), SstableError> {
        self.index.push((key.to_vec(), self.offset));
        if self.smallest_key.is_none() {
            self.smallest_key = Some(key.to_vec());
        }
        self.largest_key = Some(key.to_vec());

        self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
        self.writer.write_all(key)?;
        let vlen = if tombstone { 0u32 } else { value.len() as u32 };
        self.writer.write_all(&vlen.to_le_bytes())?;
        if !tombstone {
            self.writer.write_all(value)?;
        }
        self.writer
            .write_all(&[if tombstone { RECORD_TOMBSTONE } else { RECORD_PUT }])?;

        self.offset += 4 + key.len() as u64 + 4 + vlen as u64 + 1;
        Ok(())
    }

    /// `true` if no entries have been added yet.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Writes the index region and footer, flushes, syncs, and renames
    /// the temporary file into place. Returns the table's file metadata.
    ///
    /// Refuses to finish an empty builder — an empty memtable must never
    /// produce an SSTable.
    pub fn finish(mut self) -> Result<BuiltTable, SstableError> {
        if self.index.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to finish an SSTable with zero entries",
            )
            .into());
        }

        let index_offset = self.offset;
        self.writer
            .write_all(&(self.index.len() as u32).to_le_bytes())?;
        for (key, offset) in &self.index {
            self.writer.write_all(&(key.len() as u32).to_le_bytes())?;
            self.writer.write_all(key)?;
            self.writer.write_all(&offset.to_le_bytes())?;
        }
        self.writer.write_all(&index_offset.to_le_bytes())?;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        drop(self.writer);

        fs::rename(&self.tmp_path, &self.final_path)?;
        let file_size = fs::metadata(&self.final_path)?.len();

        info!(
            path = %self.final_path.display(),
            entries = self.index.len(),
            file_size,
            "committed SSTable"
        );

        Ok(BuiltTable {
            path: self.final_path,
            file_size,
            smallest_key: self.smallest_key.unwrap_or_default(),
            largest_key: self.largest_key.unwrap_or_default(),
        })
    }
}

/// Metadata describing a freshly committed SSTable.
pub struct BuiltTable {
    /// Final on-disk path.
    pub path: PathBuf,
    /// Total size of the file, in bytes.
    pub file_size: u64,
    /// First key written.
    pub smallest_key: Vec<u8>,
    /// Last key written.
    pub largest_key: Vec<u8>,
}
