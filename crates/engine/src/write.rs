/// Write path: `set()`, `remove()`, and `sync()`.
///
/// All mutations flow through this module. Each write is first appended to the
/// active segment and flushed, then applied to the in-memory Memtable. A
/// failed append or flush returns the error before the Memtable is touched,
/// and the segment writer has already cut the file back to its last good
/// flush.
use anyhow::{Context, Result};

use crate::Index;

impl Index {
    /// Inserts or overwrites a key (the `SET` command).
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_key(key)?;

        let timestamp = self.clock.now();

        // Append to WAL first
        self.wal.append_set(key, value, timestamp)?;
        self.wal.flush().context("wal flush failed")?;

        self.mem.set(key.to_vec(), value.to_vec(), timestamp);
        Ok(())
    }

    /// Deletes a key by writing a tombstone (the `DEL` command).
    ///
    /// Removing a key that was never set is legal and still records a
    /// tombstone.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        check_key(key)?;

        let timestamp = self.clock.now();

        self.wal.append_tombstone(key, timestamp)?;
        self.wal.flush().context("wal flush failed")?;

        self.mem.remove(key.to_vec(), timestamp);
        Ok(())
    }

    /// Flushes the active segment again. `set`/`remove` already flush every
    /// record, so this is a no-op unless the segment writer was poisoned,
    /// in which case it reports that.
    pub fn sync(&mut self) -> Result<()> {
        self.wal.flush().context("wal flush failed")?;
        Ok(())
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    anyhow::ensure!(!key.is_empty(), "key must not be empty");
    Ok(())
}
