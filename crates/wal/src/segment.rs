//! Segment file naming and discovery.
//!
//! A segment is named after the nanosecond timestamp at which it was created,
//! zero-padded to 20 digits: `{:020}.wal`. `u64::MAX` has 20 digits, so every
//! id renders at the same width and lexical order of file names equals the
//! numeric order of ids.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Extension reserved for segment files.
pub const SEGMENT_EXTENSION: &str = "wal";

const ID_DIGITS: usize = 20;

/// Nanoseconds since the Unix epoch, saturating at `u64::MAX` and reading 0
/// if the system clock is set before the epoch.
pub fn wall_clock_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

/// Identity of a log segment, ordered by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(u64);

impl SegmentId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Id derived from the current wall clock (nanoseconds since the epoch).
    pub fn now() -> Self {
        Self(wall_clock_nanos())
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The smallest id that sorts after `self`.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// File name of this segment, e.g. `01760000000000000000.wal`.
    pub fn file_name(self) -> String {
        format!("{:0width$}.{}", self.0, SEGMENT_EXTENSION, width = ID_DIGITS)
    }

    /// Parses a segment file name. Anything other than exactly 20 ASCII
    /// digits followed by `.wal` is not a segment.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
        if stem.len() != ID_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok().map(Self)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = ID_DIGITS)
    }
}

/// A segment file found on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentFile {
    pub id: SegmentId,
    pub path: PathBuf,
}

/// Lists every segment in `dir`, oldest first.
///
/// Files whose name does not parse as a segment id, and directories, are
/// ignored.
pub fn list_segments<P: AsRef<Path>>(dir: P) -> io::Result<Vec<SegmentFile>> {
    let mut segments = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(id) = name.to_str().and_then(SegmentId::parse) else {
            continue;
        };
        segments.push(SegmentFile {
            id,
            path: entry.path(),
        });
    }
    segments.sort();
    Ok(segments)
}
