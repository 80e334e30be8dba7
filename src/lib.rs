//! # EmberDB
//!
//! An embeddable, persistent key-value storage engine built on a
//! log-structured merge-tree (LSM) architecture: an ordered in-memory
//! index backed by a write-ahead log, flushed to immutable on-disk
//! sorted tables.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      Engine                          │
//! │  ┌────────────┐   ┌──────────────┐   ┌─────────────┐ │
//! │  │  Memtable   │   │     WAL      │   │  Level-0    │ │
//! │  │ (skip list) │   │ wal.log      │   │  SSTables   │ │
//! │  └─────┬───────┘   └──────┬───────┘   └──────┬──────┘ │
//! │        │   flush          │  rotate          │        │
//! │        └────────────────► │ ◄────────────────┘        │
//! │                 VersionSet (directory-scan recovery)  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Database facade — open, close, put, delete, get, flush |
//! | [`memtable`] | Concurrent-safe ordered index (probabilistic skip list) |
//! | [`wal`] | Write-ahead log with flat, unchecksummed record framing |
//! | [`sstable`] | Immutable sorted on-disk tables — builder and reader |
//! | [`version`] | Version/VersionSet tracking level-0 SSTables |
//! | [`encoding`] | Deterministic little-endian binary encoding helpers |
//!
//! ## Key properties
//!
//! - **Write-ahead logging** — every mutation is appended to the WAL
//!   before it is acknowledged; synchronous mode fsyncs before return,
//!   asynchronous mode relies on a background syncer plus a final sync
//!   on close.
//! - **Single-version entries** — a key has at most one live entry per
//!   source (memtable, or a given SSTable); no MVCC, no range
//!   tombstones, no snapshots.
//! - **Manifest-less recovery** — the live SSTable set is reconstructed
//!   by scanning the database directory, not by replaying a manifest
//!   log.
//! - **Level-0-only** — there is no multi-level compaction; flush
//!   simply appends one more file to level 0.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use emberdb::engine::{Engine, EngineOptions, GetResult};
//!
//! let engine = Engine::open("/tmp/my_db", EngineOptions::default()).unwrap();
//!
//! engine.put(b"hello", b"world").unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), GetResult::Found(b"world".to_vec()));
//!
//! engine.delete(b"hello").unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), GetResult::NotFound);
//!
//! engine.close().unwrap();
//! ```

pub mod encoding;
pub mod engine;
pub mod memtable;
pub mod sstable;
pub mod version;
pub mod wal;
