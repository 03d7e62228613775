use super::helpers::count_wal_files;
use crate::*;
use anyhow::Result;
use tempfile::tempdir;
use wal::WalReader;

// --------------------- Basic set / get / remove ---------------------

#[test]
fn set_and_get() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    index.set(b"name", b"alice")?;
    assert_eq!(index.get(b"name"), Some(b"alice".to_vec()));
    Ok(())
}

#[test]
fn last_write_wins() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    index.set(b"k", b"a")?;
    index.set(b"k", b"b")?;
    assert_eq!(index.get(b"k"), Some(b"b".to_vec()));
    Ok(())
}

#[test]
fn remove_hides_value() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    index.set(b"k", b"a")?;
    index.remove(b"k")?;
    assert!(index.get(b"k").is_none());
    assert!(index.entry(b"k").unwrap().is_tombstone());
    Ok(())
}

#[test]
fn set_after_remove_resurrects() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    index.set(b"k", b"a")?;
    index.remove(b"k")?;
    index.set(b"k", b"b")?;
    assert_eq!(index.get(b"k"), Some(b"b".to_vec()));
    Ok(())
}

#[test]
fn remove_unknown_key_is_ok() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    index.remove(b"ghost")?;
    assert!(index.get(b"ghost").is_none());
    assert_eq!(index.len(), 1);
    Ok(())
}

#[test]
fn empty_value_is_not_absence() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    index.set(b"k", b"")?;
    assert_eq!(index.get(b"k"), Some(Vec::new()));
    Ok(())
}

// --------------------- Validation ---------------------

#[test]
fn empty_key_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    assert!(index.set(b"", b"v").is_err());
    assert!(index.remove(b"").is_err());
    assert!(index.is_empty());
    Ok(())
}

#[test]
fn large_keys_and_values_survive_restart() -> Result<()> {
    let dir = tempdir()?;
    let big_val = vec![b'v'; 10 * 1024 * 1024 + 1];
    let big_key = vec![b'k'; 64 * 1024 + 1];

    {
        let mut index = Index::open(dir.path(), false)?;
        index.set(b"k", &big_val)?;
        index.set(&big_key, b"v")?;
        assert_eq!(index.get(b"k").as_deref(), Some(&big_val[..]));
    }

    let index = Index::open(dir.path(), false)?;
    assert_eq!(index.get(b"k").as_deref(), Some(&big_val[..]));
    assert_eq!(index.get(&big_key), Some(b"v".to_vec()));
    assert_eq!(index.recovery_stats().truncated_segments, 0);
    Ok(())
}

// --------------------- WAL interaction ---------------------

#[test]
fn every_write_is_on_disk_before_return() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), true)?;

    index.set(b"a", b"1")?;
    index.remove(b"a")?;
    index.set(b"b", b"2")?;

    // Read the active segment while the index is still open.
    let recs: Vec<_> = WalReader::open(index.active_segment())?.collect::<Result<_, _>>()?;
    assert_eq!(recs.len(), 3);
    assert!(recs[1].is_tombstone());
    assert_eq!(recs[1].key(), b"a");
    Ok(())
}

#[test]
fn timestamps_never_decrease() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    for i in 0..100u32 {
        index.set(format!("k{}", i % 7).as_bytes(), b"v")?;
    }

    let recs: Vec<_> = WalReader::open(index.active_segment())?.collect::<Result<_, _>>()?;
    assert!(recs.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
    assert_eq!(index.last_timestamp(), recs.last().unwrap().timestamp());
    Ok(())
}

#[test]
fn entry_carries_timestamp() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    index.set(b"k", b"v")?;
    let first = index.entry(b"k").unwrap().timestamp;
    index.remove(b"k")?;
    let second = index.entry(b"k").unwrap().timestamp;
    assert!(second >= first);
    assert!(first > 0);
    Ok(())
}

#[test]
fn writes_stay_in_one_segment() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;

    for i in 0..500u32 {
        index.set(format!("key{i}").as_bytes(), &[b'x'; 64])?;
    }
    assert_eq!(count_wal_files(dir.path()), 1);
    Ok(())
}

#[test]
fn memtable_size_is_tracked() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), false)?;
    assert_eq!(index.memtable_size(), 0);

    index.set(b"ab", b"ccc")?;
    assert_eq!(index.memtable_size(), 5 + memtable::ENTRY_OVERHEAD);
    index.remove(b"ab")?;
    assert_eq!(index.memtable_size(), 2 + memtable::ENTRY_OVERHEAD);
    Ok(())
}

#[test]
fn sync_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let mut index = Index::open(dir.path(), true)?;
    index.sync()?;
    index.set(b"k", b"v")?;
    index.sync()?;
    assert_eq!(index.get(b"k"), Some(b"v".to_vec()));
    Ok(())
}

// --------------------- Failed writes ---------------------

#[test]
fn failed_write_leaves_memtable_and_segment_intact() -> Result<()> {
    let dir = tempdir()?;

    {
        let mut index = Index::open(dir.path(), true)?;
        index.set(b"a", b"1")?;
        index.set(b"k", b"old")?;

        // Only part of the record reaches the disk.
        index.wal.fail_writes_after(100);
        let big = vec![b'x'; 100_000];
        assert!(index.set(b"k", &big).is_err());
        assert_eq!(index.get(b"k"), Some(b"old".to_vec()));

        // Fails in flush rather than append.
        index.wal.fail_writes_after(3);
        assert!(index.remove(b"a").is_err());
        assert_eq!(index.get(b"a"), Some(b"1".to_vec()));

        index.wal.clear_faults();
        index.set(b"z", b"2")?;
        assert_eq!(index.get(b"z"), Some(b"2".to_vec()));
    }

    let index = Index::open(dir.path(), true)?;
    assert_eq!(index.get(b"z"), Some(b"2".to_vec()));
    assert_eq!(index.get(b"k"), Some(b"old".to_vec()));
    assert_eq!(index.get(b"a"), Some(b"1".to_vec()));
    assert_eq!(index.recovery_stats().records_replayed, 3);
    assert_eq!(index.recovery_stats().truncated_segments, 0);
    Ok(())
}

#[test]
fn failed_rollback_stops_further_writes() -> Result<()> {
    let dir = tempdir()?;

    {
        let mut index = Index::open(dir.path(), true)?;
        index.set(b"a", b"1")?;

        index.wal.fail_writes_after(2);
        index.wal.fail_rollback();
        assert!(index.set(b"b", b"2").is_err());

        index.wal.clear_faults();
        let err = index.set(b"c", b"3").unwrap_err();
        assert!(err.to_string().contains("poisoned"), "{err:#}");
        assert!(index.get(b"b").is_none());
        assert!(index.get(b"c").is_none());
    }

    // The torn bytes stay on disk and read as a truncated tail.
    let index = Index::open(dir.path(), true)?;
    assert_eq!(index.get(b"a"), Some(b"1".to_vec()));
    assert!(index.get(b"b").is_none());
    assert_eq!(index.recovery_stats().truncated_segments, 1);
    Ok(())
}
