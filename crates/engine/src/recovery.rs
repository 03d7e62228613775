/// Startup recovery: segment discovery, replay, and compaction.
///
/// Every segment found in the storage directory is replayed oldest-first into
/// a fresh memtable and, record by record, rewritten into one new active
/// segment. Once that segment is flushed the old ones are deleted, so N
/// segments become 1 on every open.
use anyhow::{Context, Result};
use memtable::Memtable;
use std::path::Path;
use tracing::{debug, info, warn};
use wal::{list_segments, Record, SegmentFile, WalReader, WalWriter};

/// Summary of what an open replayed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Old segments folded into the active one (and deleted).
    pub segments_replayed: usize,
    /// Records replayed across all old segments.
    pub records_replayed: u64,
    /// Old segments whose last record was torn and dropped.
    pub truncated_segments: usize,
    /// Highest timestamp seen during replay, 0 if none.
    pub max_timestamp: u64,
}

/// Outcome of replaying one segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentReplay {
    pub records: u64,
    pub truncated: bool,
    pub max_timestamp: u64,
}

/// Replays the segment at `path` into `mem`, copying every record into
/// `sink` in the same order.
///
/// A torn final record is dropped silently. An unreadable file or a corrupt
/// record is an error.
pub fn replay_segment<P: AsRef<Path>>(
    path: P,
    mem: &mut Memtable,
    sink: &mut WalWriter,
) -> Result<SegmentReplay> {
    let path = path.as_ref();
    let mut reader = WalReader::open(path)
        .with_context(|| format!("failed to open segment {}", path.display()))?;
    let mut out = SegmentReplay::default();

    while let Some(record) = reader
        .next_record()
        .with_context(|| format!("failed to replay segment {}", path.display()))?
    {
        sink.append(&record)?;
        out.max_timestamp = out.max_timestamp.max(record.timestamp());
        match record {
            Record::Set {
                key,
                value,
                timestamp,
            } => mem.set(key, value, timestamp),
            Record::Tombstone { key, timestamp } => mem.remove(key, timestamp),
        }
    }

    out.records = reader.records_read();
    out.truncated = reader.is_truncated();
    Ok(out)
}

/// Runs the full open protocol in `dir` and returns the rebuilt memtable,
/// the new active segment, and what was replayed.
///
/// # Steps
///
/// 1. List the segments already in `dir`, sorted oldest-first.
/// 2. Create the new active segment, named after all of them.
/// 3. Replay each old segment into the memtable and the active segment.
/// 4. Flush the active segment.
/// 5. Delete the old segments.
pub(crate) fn recover(dir: &Path, wal_sync: bool) -> Result<(Memtable, WalWriter, RecoveryStats)> {
    let stale = list_segments(dir)
        .with_context(|| format!("failed to list segments in {}", dir.display()))?;

    let floor = stale.last().map(|s| s.id.next());
    let mut wal = WalWriter::create(dir, floor, wal_sync)
        .with_context(|| format!("failed to create segment in {}", dir.display()))?;

    let mut mem = Memtable::new();
    let stats = match replay_all(&stale, &mut mem, &mut wal) {
        Ok(stats) => stats,
        Err(e) => {
            // Leave the directory as we found it.
            let path = wal.path().to_path_buf();
            drop(wal);
            if let Err(rm) = std::fs::remove_file(&path) {
                warn!(
                    segment = %path.display(),
                    error = %rm,
                    "failed to remove unfinished active segment"
                );
            }
            return Err(e);
        }
    };

    for segment in &stale {
        std::fs::remove_file(&segment.path)
            .with_context(|| format!("failed to delete segment {}", segment.path.display()))?;
        debug!(segment = %segment.path.display(), "deleted old segment");
    }

    info!(
        dir = %dir.display(),
        segments = stats.segments_replayed,
        records = stats.records_replayed,
        keys = mem.len(),
        active = %wal.path().display(),
        "recovery complete"
    );

    Ok((mem, wal, stats))
}

fn replay_all(
    stale: &[SegmentFile],
    mem: &mut Memtable,
    wal: &mut WalWriter,
) -> Result<RecoveryStats> {
    let mut stats = RecoveryStats::default();

    for segment in stale {
        let replay = replay_segment(&segment.path, mem, wal)?;
        if replay.truncated {
            warn!(
                segment = %segment.path.display(),
                records = replay.records,
                "segment ended in a torn record"
            );
            stats.truncated_segments += 1;
        }
        debug!(segment = %segment.path.display(), records = replay.records, "replayed segment");
        stats.segments_replayed += 1;
        stats.records_replayed += replay.records;
        stats.max_timestamp = stats.max_timestamp.max(replay.max_timestamp);
    }

    wal.flush()
        .with_context(|| format!("failed to flush segment {}", wal.path().display()))?;
    Ok(stats)
}
