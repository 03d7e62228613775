/// Handle table: opaque handles over shared indexes.
///
/// Embedders that cannot hold an `Index` directly (a host-language binding,
/// a server) open indexes through an [`IndexTable`] and refer to them by
/// [`Handle`]. Every index sits behind its own `RwLock`: `get` takes the read
/// lock, while `set`/`remove` hold the write lock across the WAL flush and the
/// Memtable update, so a reader never observes an update that is not yet on
/// disk.
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::Index;

/// Opaque reference to an open index. Never reused within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors surfaced through the handle table.
#[derive(Debug, Error)]
pub enum TableError {
    /// The handle does not refer to a live index (never opened, or closed).
    #[error("invalid handle {0}")]
    InvalidHandle(Handle),

    /// The index itself failed (open, I/O, validation).
    #[error(transparent)]
    Index(#[from] anyhow::Error),
}

#[derive(Default)]
pub struct IndexTable {
    next: AtomicU64,
    indexes: RwLock<HashMap<Handle, Arc<RwLock<Index>>>>,
}

impl fmt::Debug for IndexTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexTable")
            .field("open", &self.len())
            .finish()
    }
}

impl IndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the index at `path` (running recovery) and registers it.
    pub fn open<P: AsRef<Path>>(&self, path: P, wal_sync: bool) -> Result<Handle, TableError> {
        let index = Index::open(path, wal_sync)?;
        let handle = Handle(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        debug!(handle = %handle, dir = %index.dir().display(), "registered index");
        self.indexes
            .write()
            .insert(handle, Arc::new(RwLock::new(index)));
        Ok(handle)
    }

    pub fn set(&self, handle: Handle, key: &[u8], value: &[u8]) -> Result<(), TableError> {
        let index = self.lookup(handle)?;
        let mut guard = index.write();
        guard.set(key, value)?;
        Ok(())
    }

    /// Succeeds for unknown keys too.
    pub fn remove(&self, handle: Handle, key: &[u8]) -> Result<(), TableError> {
        let index = self.lookup(handle)?;
        let mut guard = index.write();
        guard.remove(key)?;
        Ok(())
    }

    /// `Ok(None)` means not found; an unknown handle is an error.
    pub fn get(&self, handle: Handle, key: &[u8]) -> Result<Option<Vec<u8>>, TableError> {
        let index = self.lookup(handle)?;
        let guard = index.read();
        Ok(guard.get(key))
    }

    /// Unregisters the handle. The index is dropped once no in-flight call
    /// still holds it.
    pub fn close(&self, handle: Handle) -> Result<(), TableError> {
        self.indexes
            .write()
            .remove(&handle)
            .map(|_| debug!(handle = %handle, "closed index"))
            .ok_or(TableError::InvalidHandle(handle))
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.indexes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.read().is_empty()
    }

    fn lookup(&self, handle: Handle) -> Result<Arc<RwLock<Index>>, TableError> {
        self.indexes
            .read()
            .get(&handle)
            .cloned()
            .ok_or(TableError::InvalidHandle(handle))
    }
}
