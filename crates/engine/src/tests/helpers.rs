use std::fs;
use std::path::{Path, PathBuf};
use wal::{encode_record, Record, SegmentId};

pub fn count_wal_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "wal")
                .unwrap_or(false)
        })
        .count()
}

/// Writes a segment file with a chosen id, bypassing `WalWriter`.
pub fn write_segment(dir: &Path, id: u64, records: &[Record]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let mut buf = Vec::new();
    for r in records {
        encode_record(r, &mut buf).unwrap();
    }
    let path = dir.join(SegmentId::new(id).file_name());
    fs::write(&path, buf).unwrap();
    path
}

pub fn set(ts: u64, key: &str, value: &str) -> Record {
    Record::Set {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
        timestamp: ts,
    }
}

pub fn tombstone(ts: u64, key: &str) -> Record {
    Record::Tombstone {
        key: key.as_bytes().to_vec(),
        timestamp: ts,
    }
}
