//! # WAL - Write-Ahead Log
//!
//! Provides crash-safe durability for the DocStore index.
//!
//! Every mutation (`SET` or `REMOVE`) is encoded into a binary record and
//! appended to the active segment **before** the corresponding in-memory
//! update. On restart every segment in the storage directory is replayed, in
//! name order, to rebuild the memtable.
//!
//! ## Binary Record Format
//!
//! ```text
//! Set:       [key_size: u64][0u8][value_size: u64][key][value][timestamp: u64]
//! Tombstone: [key_size: u64][1u8][key][timestamp: u64]
//! ```
//!
//! Fields are native-endian and written back to back; see [`format`].
//!
//! ## Segments
//!
//! A segment is a file named `{:020}.wal` after its creation timestamp in
//! nanoseconds; see [`segment`]. Segments are append-only and are never
//! rewritten in place.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalReader, WalWriter};
//!
//! let mut w = WalWriter::create("data", None, true).unwrap();
//! w.append_set(b"hello", b"world", 1).unwrap();
//! w.flush().unwrap();
//! let path = w.path().to_path_buf();
//! drop(w);
//!
//! for rec in WalReader::open(&path).unwrap() {
//!     println!("{:?}", rec.unwrap());
//! }
//! ```

pub mod format;
pub mod segment;

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, warn};

pub use format::{decode_record, encode_record, encoded_len, Decoded};
pub use segment::{list_segments, wall_clock_nanos, SegmentFile, SegmentId, SEGMENT_EXTENSION};

/// A single log record: either a write or a tombstone.
///
/// Every record carries the timestamp the index assigned to the operation.
/// The log is ordered by position, not by timestamp; the timestamp is kept as
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A key-value write.
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        /// Nanoseconds since the Unix epoch.
        timestamp: u64,
    },
    /// A deletion marker. Carries no value.
    Tombstone {
        key: Vec<u8>,
        /// Nanoseconds since the Unix epoch.
        timestamp: u64,
    },
}

impl Record {
    pub fn key(&self) -> &[u8] {
        match self {
            Record::Set { key, .. } | Record::Tombstone { key, .. } => key,
        }
    }

    /// The written value, or `None` for a tombstone.
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Record::Set { value, .. } => Some(value),
            Record::Tombstone { .. } => None,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Record::Set { timestamp, .. } | Record::Tombstone { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Record::Tombstone { .. })
    }
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be decoded (e.g. an unknown flag byte).
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// A failed write could not be rolled back, so the segment tail is
    /// unknown. The writer refuses all further appends.
    #[error("wal writer poisoned: {} could not be rolled back", .0.display())]
    Poisoned(PathBuf),
}

/// Pending bytes are handed to the file once they reach this size, even
/// without a `flush`.
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Append-only writer for one segment.
///
/// Appends are buffered; nothing is durable until [`WalWriter::flush`]
/// returns. When `sync` is `true`, `flush` also calls `sync_data()` so the
/// bytes reach stable storage before the call returns.
///
/// # Failed writes
///
/// The writer remembers the file length as of the last successful flush.
/// If an append or flush fails, every byte after that offset is discarded
/// (the file is truncated back to it), so a torn record never sits in front
/// of a later good one. If the truncate fails as well the writer is
/// poisoned and every later call returns [`WalError::Poisoned`].
pub struct WalWriter {
    file: SegmentSink,
    path: PathBuf,
    id: SegmentId,
    sync: bool,
    /// Encoded records not yet handed to the file.
    pending: Vec<u8>,
    /// Bytes handed to the file; also the file cursor.
    written: u64,
    /// File length as of the last successful flush.
    durable: u64,
    records_pending: u64,
    records_durable: u64,
    poisoned: bool,
}

impl std::fmt::Debug for WalWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalWriter")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .field("bytes_written", &self.bytes_written())
            .field("durable", &self.durable)
            .field("records_written", &self.records_written())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

impl WalWriter {
    /// Creates a brand-new segment in `dir`.
    ///
    /// # Arguments
    ///
    /// * `dir` - directory that holds the segments; must already exist.
    /// * `floor` - lowest id the new segment may take. Recovery passes the
    ///   successor of the newest existing segment so the new one always sorts
    ///   last, even if the wall clock went backwards.
    /// * `sync` - if true, every `flush` is followed by `sync_data`.
    ///
    /// The file is opened with `create_new`; if the name is taken the id is
    /// bumped by one and the open retried.
    pub fn create<P: AsRef<Path>>(
        dir: P,
        floor: Option<SegmentId>,
        sync: bool,
    ) -> Result<Self, WalError> {
        let dir = dir.as_ref();
        let mut id = SegmentId::now();
        if let Some(floor) = floor {
            id = id.max(floor);
        }

        let (file, path) = loop {
            let path = dir.join(id.file_name());
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (file, path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && id.as_u64() < u64::MAX => {
                    id = id.next();
                }
                Err(e) => return Err(WalError::Io(e)),
            }
        };

        debug!(segment = %path.display(), "created wal segment");

        Ok(Self {
            file: SegmentSink::new(file),
            path,
            id,
            sync,
            pending: Vec::with_capacity(256),
            written: 0,
            durable: 0,
            records_pending: 0,
            records_durable: 0,
            poisoned: false,
        })
    }

    /// Buffers a write record. Does not flush.
    pub fn append_set(&mut self, key: &[u8], value: &[u8], timestamp: u64) -> Result<(), WalError> {
        self.append(&Record::Set {
            key: key.to_vec(),
            value: value.to_vec(),
            timestamp,
        })
    }

    /// Buffers a tombstone record. Does not flush.
    pub fn append_tombstone(&mut self, key: &[u8], timestamp: u64) -> Result<(), WalError> {
        self.append(&Record::Tombstone {
            key: key.to_vec(),
            timestamp,
        })
    }

    /// Encodes `record` onto the pending buffer, handing the buffer to the
    /// file once it grows past 64 KiB.
    ///
    /// On error everything since the last successful flush is discarded.
    pub fn append(&mut self, record: &Record) -> Result<(), WalError> {
        self.check_poisoned()?;
        if let Err(e) = encode_record(record, &mut self.pending) {
            return Err(self.roll_back(e));
        }
        self.records_pending += 1;

        if self.pending.len() >= WRITE_BUFFER_SIZE {
            if let Err(e) = self.write_pending() {
                return Err(self.roll_back(e));
            }
        }
        Ok(())
    }

    /// Pushes all pending bytes to the file, then fsyncs if `sync` is set.
    ///
    /// An operation is durable only after this returns `Ok`. On error
    /// everything since the previous successful flush is discarded.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.check_poisoned()?;
        if let Err(e) = self.persist() {
            return Err(self.roll_back(e));
        }
        self.durable = self.written;
        self.records_durable += self.records_pending;
        self.records_pending = 0;
        Ok(())
    }

    /// Path of the segment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Encoded bytes appended and not rolled back, flushed or not.
    pub fn bytes_written(&self) -> u64 {
        self.written + self.pending.len() as u64
    }

    /// Segment length as of the last successful flush.
    pub fn durable_len(&self) -> u64 {
        self.durable
    }

    pub fn records_written(&self) -> u64 {
        self.records_durable + self.records_pending
    }

    /// Whether a failed rollback has disabled this writer.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn check_poisoned(&self) -> Result<(), WalError> {
        if self.poisoned {
            return Err(WalError::Poisoned(self.path.clone()));
        }
        Ok(())
    }

    fn write_pending(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.pending)?;
        self.written += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }

    fn persist(&mut self) -> io::Result<()> {
        self.write_pending()?;
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Drops every byte after the durable offset and hands back `cause` as
    /// the caller's error.
    fn roll_back(&mut self, cause: io::Error) -> WalError {
        self.pending.clear();
        self.records_pending = 0;

        match self.file.truncate(self.durable) {
            Ok(()) => {
                self.written = self.durable;
                warn!(
                    segment = %self.path.display(),
                    offset = self.durable,
                    error = %cause,
                    "rolled back failed wal write"
                );
            }
            Err(e) => {
                self.poisoned = true;
                error!(
                    segment = %self.path.display(),
                    offset = self.durable,
                    error = %e,
                    cause = %cause,
                    "wal rollback failed, writer poisoned"
                );
            }
        }
        WalError::Io(cause)
    }
}

/// Hooks for exercising the failure paths.
#[cfg(any(test, feature = "fault-injection"))]
impl WalWriter {
    /// Lets `bytes` more bytes reach the file, then fails every write.
    pub fn fail_writes_after(&mut self, bytes: u64) {
        self.file.faults.write_budget = Some(bytes);
    }

    /// Makes the truncate during rollback fail.
    pub fn fail_rollback(&mut self) {
        self.file.faults.fail_truncate = true;
    }

    pub fn clear_faults(&mut self) {
        self.file.faults = Faults::default();
    }
}

/// Best-effort flush on drop.
impl Drop for WalWriter {
    fn drop(&mut self) {
        if self.poisoned {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(segment = %self.path.display(), error = %e, "wal flush on drop failed");
        }
    }
}

/// The open segment file.
struct SegmentSink {
    file: File,
    #[cfg(any(test, feature = "fault-injection"))]
    faults: Faults,
}

#[cfg(any(test, feature = "fault-injection"))]
#[derive(Debug, Default)]
struct Faults {
    write_budget: Option<u64>,
    fail_truncate: bool,
}

impl SegmentSink {
    fn new(file: File) -> Self {
        Self {
            file,
            #[cfg(any(test, feature = "fault-injection"))]
            faults: Faults::default(),
        }
    }

    fn sync_data(&self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Cuts the file to `len` and moves the cursor there.
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        #[cfg(any(test, feature = "fault-injection"))]
        {
            if self.faults.fail_truncate {
                return Err(io::Error::new(io::ErrorKind::Other, "injected truncate failure"));
            }
        }
        self.file.set_len(len)?;
        self.file.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

impl Write for SegmentSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        #[cfg(any(test, feature = "fault-injection"))]
        {
            if let Some(budget) = self.faults.write_budget.as_mut() {
                if *budget == 0 {
                    return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
                }
                let allowed = buf.len().min(usize::try_from(*budget).unwrap_or(usize::MAX));
                let n = self.file.write(&buf[..allowed])?;
                *budget -= n as u64;
                return Ok(n);
            }
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Forward-only cursor over the records of one segment.
///
/// The reader is generic over any `Read` implementor, allowing it to be used
/// with real files (`WalReader<File>`) or in-memory buffers for testing.
///
/// A truncated tail record (e.g. from a crash mid-write) ends iteration
/// cleanly: all complete records before it are still yielded, and
/// [`WalReader::is_truncated`] reports the torn tail afterwards.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
    offset: u64,
    records_read: u64,
    truncated: bool,
    done: bool,
}

impl WalReader<File> {
    /// Opens an existing segment for sequential replay.
    ///
    /// Returns `WalError::Io` if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(Self::from_reader(f))
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    ///
    /// Useful for unit tests that supply an in-memory buffer (e.g., `Cursor<Vec<u8>>`).
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
            offset: 0,
            records_read: 0,
            truncated: false,
            done: false,
        }
    }

    /// Decodes the next record, `Ok(None)` at end of stream.
    pub fn next_record(&mut self) -> Result<Option<Record>, WalError> {
        if self.done {
            return Ok(None);
        }
        match decode_record(&mut self.rdr, self.offset) {
            Ok(Decoded::Record(record)) => {
                self.offset += encoded_len(&record) as u64;
                self.records_read += 1;
                Ok(Some(record))
            }
            Ok(Decoded::End) => {
                self.done = true;
                Ok(None)
            }
            Ok(Decoded::Truncated) => {
                self.done = true;
                self.truncated = true;
                warn!(offset = self.offset, "discarding truncated wal tail");
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Replays every valid record, calling `apply` for each one.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** -> `Ok(())`.
    /// - **Truncated tail** -> `Ok(())` after yielding all complete records.
    /// - **Unknown flag byte** -> `Err(WalError::Corrupt { .. })`.
    /// - **I/O error** -> `Err(WalError::Io(..))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(Record),
    {
        while let Some(record) = self.next_record()? {
            apply(record);
        }
        Ok(())
    }

    /// Whether the stream ended inside a record. Only meaningful once the
    /// reader is exhausted.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Number of complete records yielded so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Byte offset just past the last complete record.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: Read> Iterator for WalReader<R> {
    type Item = Result<Record, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
