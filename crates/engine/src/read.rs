/// Read path: `get()` and `entry()`.
///
/// Lookups are served from the Memtable alone; the WAL is never read after
/// recovery. A tombstone shadows the key exactly like an unknown key.
use memtable::MemEntry;

use crate::Index;

impl Index {
    /// Looks up a key, returning an owned copy of its value if it is live.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.mem.get_value(key).map(<[u8]>::to_vec)
    }

    /// The raw Memtable entry for `key`, tombstones included. Useful for
    /// inspecting the timestamp of the last operation on a key.
    #[must_use]
    pub fn entry(&self, key: &[u8]) -> Option<&MemEntry> {
        self.mem.get(key)
    }
}
