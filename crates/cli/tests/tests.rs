#[cfg(test)]
mod tests {
    use engine::replay_segment;
    use memtable::Memtable;
    use wal::{Record, SegmentId, WalWriter};

    fn scratch_sink(dir: &std::path::Path) -> WalWriter {
        let out = dir.join("out");
        std::fs::create_dir_all(&out).unwrap();
        WalWriter::create(&out, None, false).unwrap()
    }

    #[test]
    fn segment_replay_rebuilds_memtable() {
        let dir = tempfile::tempdir().unwrap();

        let path = {
            let mut w = WalWriter::create(dir.path(), Some(SegmentId::new(1)), true).unwrap();
            w.append_set(b"a", b"1", 1).unwrap();
            w.append_tombstone(b"a", 2).unwrap();
            w.append_set(b"b", b"2", 3).unwrap();
            w.flush().unwrap();
            w.path().to_path_buf()
        };

        let mut mem = Memtable::new();
        let mut sink = scratch_sink(dir.path());
        let replay = replay_segment(&path, &mut mem, &mut sink).unwrap();

        assert_eq!(replay.records, 3);
        assert_eq!(replay.max_timestamp, 3);
        assert!(!replay.truncated);
        assert!(mem.get_value(b"a").is_none());
        assert_eq!(mem.get_value(b"b").unwrap(), b"2");
        assert_eq!(sink.records_written(), 3);
    }

    #[test]
    fn segment_survives_without_memtable_update() {
        let dir = tempfile::tempdir().unwrap();

        let path = {
            let mut w = WalWriter::create(dir.path(), None, true).unwrap();
            w.append(&Record::Set {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
                timestamp: 7,
            })
            .unwrap();
            w.flush().unwrap();
            // crash here: memtable never updated
            w.path().to_path_buf()
        };

        let mut mem = Memtable::new();
        let mut sink = scratch_sink(dir.path());
        replay_segment(&path, &mut mem, &mut sink).unwrap();

        assert_eq!(mem.get_value(b"k").unwrap(), b"v");
        assert_eq!(mem.get(b"k").unwrap().timestamp, 7);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        use byteorder::{NativeEndian, WriteBytesExt};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SegmentId::new(5).file_name());

        // One good record: key_size=1, flag=Set, value_size=1, 'k', 'v', ts=1
        let mut bytes = Vec::new();
        bytes.write_u64::<NativeEndian>(1).unwrap();
        bytes.write_u8(0).unwrap();
        bytes.write_u64::<NativeEndian>(1).unwrap();
        bytes.extend_from_slice(b"kv");
        bytes.write_u64::<NativeEndian>(1).unwrap();

        // Then a record with flag 9
        bytes.write_u64::<NativeEndian>(1).unwrap();
        bytes.write_u8(9).unwrap();
        bytes.extend_from_slice(b"x");
        bytes.write_u64::<NativeEndian>(2).unwrap();

        std::fs::write(&path, &bytes).unwrap();

        let mut mem = Memtable::new();
        let mut sink = scratch_sink(dir.path());
        let res = replay_segment(&path, &mut mem, &mut sink);

        assert!(res.is_err());
    }

    #[test]
    fn torn_tail_is_dropped() {
        let dir = tempfile::tempdir().unwrap();

        let path = {
            let mut w = WalWriter::create(dir.path(), None, true).unwrap();
            w.append_set(b"whole", b"1", 1).unwrap();
            w.append_set(b"torn", b"2", 2).unwrap();
            w.flush().unwrap();
            w.path().to_path_buf()
        };
        let len = std::fs::metadata(&path).unwrap().len();
        let f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(len - 3).unwrap();

        let mut mem = Memtable::new();
        let mut sink = scratch_sink(dir.path());
        let replay = replay_segment(&path, &mut mem, &mut sink).unwrap();

        assert!(replay.truncated);
        assert_eq!(replay.records, 1);
        assert_eq!(mem.get_value(b"whole").unwrap(), b"1");
        assert!(mem.get(b"torn").is_none());
    }
}

#[cfg(test)]
mod load_test {
    use memtable::Memtable;

    #[test]
    fn write_load_test() {
        let mut mem = Memtable::new();
        let mut ts = 0;

        for i in 0..1_000_000 {
            ts += 1;
            let key = format!("key{}", i % 10_000).into_bytes();
            let val = vec![b'x'; 100];
            mem.set(key, val, ts);
        }

        assert!(mem.len() <= 10_000);
    }

    #[test]
    fn delete_heavy_workload() {
        let mut mem = Memtable::new();
        let mut ts = 0;

        for _i in 0..100_000 {
            ts += 1;
            mem.set(b"k".to_vec(), b"v".to_vec(), ts);
            ts += 1;
            mem.remove(b"k".to_vec(), ts);
        }

        assert!(mem.get_value(b"k").is_none());
        assert_eq!(mem.len(), 1);
    }
}
