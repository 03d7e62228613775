//! # Engine - DocStore Index
//!
//! The orchestrator that ties together the [`memtable`] and [`wal`] crates
//! into a crash-recoverable key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Caller (IndexTable handle or CLI)
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                    INDEX                      │
//! │                                               │
//! │ write.rs → WAL append + flush → Memtable      │
//! │ read.rs  → Memtable only (no I/O)             │
//! │                                               │
//! │ recovery.rs (on open):                        │
//! │   old segments ──replay──► Memtable           │
//! │                 └─rewrite─► new segment       │
//! │   old segments deleted after flush            │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                 |
//! |---------------|---------------------------------------------------------|
//! | [`lib.rs`]    | `Index` struct, constructor, accessors, `Debug`         |
//! | [`recovery`]  | segment discovery, replay, compaction into one segment  |
//! | [`write`]     | `set()`, `remove()`, `sync()`                           |
//! | [`read`]      | `get()`, `entry()`                                      |
//! | [`clock`]     | non-decreasing nanosecond timestamps                    |
//! | [`table`]     | handle table for callers that share indexes             |
//!
//! ## Crash Safety
//!
//! Every write is appended to the active segment and flushed **before** the
//! Memtable update. Old segments are deleted only after their records have
//! been rewritten into the new active segment and that segment is flushed,
//! so a crash at any point during open leaves every record on disk at least
//! once. Replaying a record twice is harmless: the last one wins either way.
mod clock;
mod read;
mod recovery;
mod table;
mod write;

use anyhow::{Context, Result};
use config::Config;
use memtable::Memtable;
use std::path::{Path, PathBuf};
use wal::WalWriter;

pub use clock::MonotonicClock;
pub use recovery::{replay_segment, RecoveryStats, SegmentReplay};
pub use table::{Handle, IndexTable, TableError};

/// A WAL-backed in-memory key-value index.
///
/// # Write Path
///
/// 1. Take a fresh timestamp from the [`MonotonicClock`].
/// 2. Append the record to the active segment and flush it.
/// 3. Apply the mutation to the Memtable.
///
/// If step 2 fails the Memtable is left untouched and the error is returned.
///
/// # Read Path
///
/// Memtable lookup only. A tombstone and an unknown key both read as `None`.
///
/// # Recovery
///
/// On construction ([`Index::open`]) every `.wal` segment already in the
/// directory is replayed oldest-first into a fresh Memtable and rewritten into
/// one new active segment; the old segments are then deleted.
pub struct Index {
    pub(crate) dir: PathBuf,
    pub(crate) mem: Memtable,
    pub(crate) wal: WalWriter,
    pub(crate) clock: MonotonicClock,
    pub(crate) recovery: RecoveryStats,
    /// If `true`, every WAL flush is followed by `fsync` for durability.
    pub(crate) wal_sync: bool,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("dir", &self.dir)
            .field("active_segment", &self.wal.path())
            .field("wal_sync", &self.wal_sync)
            .field("memtable_size", &self.mem.size())
            .field("memtable_entries", &self.mem.len())
            .field("live_keys", &self.mem.live_len())
            .field("last_timestamp", &self.clock.last())
            .field("recovery", &self.recovery)
            .finish()
    }
}

impl Index {
    /// Opens (creating if needed) the index rooted at `dir` and runs
    /// recovery.
    ///
    /// # Arguments
    ///
    /// * `dir` - storage directory holding the `.wal` segments.
    /// * `wal_sync` - if `true`, every WAL flush calls `fsync`.
    ///
    /// # Errors
    ///
    /// Fails if `dir` cannot be created or is not a directory, if any old
    /// segment cannot be read or is corrupt, or on any I/O error while
    /// writing the new segment or deleting the old ones. No partially
    /// recovered index is ever returned.
    pub fn open<P: AsRef<Path>>(dir: P, wal_sync: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create storage dir {}", dir.display()))?;
        anyhow::ensure!(dir.is_dir(), "{} is not a directory", dir.display());

        let (mem, wal, recovery) = recovery::recover(&dir, wal_sync)?;

        let clock = MonotonicClock::new();
        clock.observe(recovery.max_timestamp);

        Ok(Self {
            dir,
            mem,
            wal,
            clock,
            recovery,
            wal_sync,
        })
    }

    /// Opens the index described by `config`.
    pub fn with_config(config: &Config) -> Result<Self> {
        Self::open(&config.data_dir, config.wal_sync)
    }

    /// Storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the segment currently receiving writes.
    #[must_use]
    pub fn active_segment(&self) -> &Path {
        self.wal.path()
    }

    /// Approximate Memtable footprint in bytes. Informational only.
    #[must_use]
    pub fn memtable_size(&self) -> usize {
        self.mem.size()
    }

    /// Number of keys known to the Memtable, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mem.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    /// What the last open replayed.
    #[must_use]
    pub fn recovery_stats(&self) -> &RecoveryStats {
        &self.recovery
    }

    /// Highest timestamp assigned or replayed so far.
    #[must_use]
    pub fn last_timestamp(&self) -> u64 {
        self.clock.last()
    }
}

#[cfg(test)]
mod tests;
