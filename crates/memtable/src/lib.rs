use std::collections::BTreeMap;

/// Fixed per-entry overhead counted by [`Memtable::size`]: an 8-byte
/// timestamp slot, an 8-byte length slot and the tombstone flag.
pub const ENTRY_OVERHEAD: usize = 17;

/// MemEntry stores the timestamp and the optional value.
/// `value == None` signifies a tombstone (delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemEntry {
    pub timestamp: u64,
    pub value: Option<Vec<u8>>,
}

impl MemEntry {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    fn value_len(&self) -> usize {
        self.value.as_ref().map_or(0, Vec::len)
    }
}

/// In-memory map from key to its latest value or tombstone.
///
/// The order of calls decides the winner: every `set`/`remove` replaces what
/// was there, whatever its timestamp. Callers issue operations in increasing
/// timestamp order.
#[derive(Debug, Default)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, MemEntry>,
    /// Approximate footprint in bytes. Adjusted by deltas, never recomputed.
    size: usize,
}

impl Memtable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`.
    ///
    /// A new key adds `key + value + ENTRY_OVERHEAD` to the size; an existing
    /// one adjusts it by the difference in value length.
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>, timestamp: u64) {
        match self.map.get_mut(&key) {
            Some(entry) => {
                self.size = self.size - entry.value_len() + value.len();
                entry.value = Some(value);
                entry.timestamp = timestamp;
            }
            None => {
                self.size += key.len() + value.len() + ENTRY_OVERHEAD;
                self.map.insert(
                    key,
                    MemEntry {
                        timestamp,
                        value: Some(value),
                    },
                );
            }
        }
    }

    /// Tombstone `key`.
    ///
    /// An existing entry drops its value (and that many bytes from the size).
    /// An unknown key still gets a tombstone so the delete is remembered.
    pub fn remove(&mut self, key: Vec<u8>, timestamp: u64) {
        match self.map.get_mut(&key) {
            Some(entry) => {
                self.size -= entry.value_len();
                entry.value = None;
                entry.timestamp = timestamp;
            }
            None => {
                self.size += key.len() + ENTRY_OVERHEAD;
                self.map.insert(
                    key,
                    MemEntry {
                        timestamp,
                        value: None,
                    },
                );
            }
        }
    }

    /// The entry for `key`, tombstones included.
    pub fn get(&self, key: &[u8]) -> Option<&MemEntry> {
        self.map.get(key)
    }

    /// The live value for `key`; `None` if unknown or tombstoned.
    pub fn get_value(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).and_then(|e| e.value.as_deref())
    }

    /// Ordered iterator over entries (key, MemEntry)
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &MemEntry)> {
        self.map.iter()
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Number of entries that are not tombstones.
    pub fn live_len(&self) -> usize {
        self.map.values().filter(|e| !e.is_tombstone()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
