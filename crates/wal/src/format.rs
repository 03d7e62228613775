//! Binary encoding of a single log record.
//!
//! ```text
//! Set:       [key_size: u64][flag=0: u8][value_size: u64][key][value][timestamp: u64]
//! Tombstone: [key_size: u64][flag=1: u8][key][timestamp: u64]
//! ```
//!
//! Integers use the host's native byte order. Segments are therefore not
//! portable between machines of differing endianness. Length fields are
//! always 8 bytes wide, independent of the host word size.
//!
//! There are no markers or checksums: a decoder relies entirely on the field
//! order above.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read};

use crate::{Record, WalError};

/// Flag byte for a write record.
pub const FLAG_SET: u8 = 0;
/// Flag byte for a tombstone record.
pub const FLAG_TOMBSTONE: u8 = 1;

/// Width of the `key_size` and `value_size` fields.
pub const LEN_FIELD_SIZE: usize = 8;
/// Width of the trailing timestamp field.
pub const TIMESTAMP_SIZE: usize = 8;

/// Outcome of decoding one record from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete record.
    Record(Record),
    /// The stream ended exactly on a record boundary.
    End,
    /// The stream ended in the middle of a record (torn write).
    Truncated,
}

/// Returns the number of bytes `record` occupies on disk.
pub fn encoded_len(record: &Record) -> usize {
    match record {
        Record::Set { key, value, .. } => {
            LEN_FIELD_SIZE + 1 + LEN_FIELD_SIZE + key.len() + value.len() + TIMESTAMP_SIZE
        }
        Record::Tombstone { key, .. } => LEN_FIELD_SIZE + 1 + key.len() + TIMESTAMP_SIZE,
    }
}

/// Appends the encoding of `record` to `buf`.
pub fn encode_record(record: &Record, buf: &mut Vec<u8>) -> io::Result<()> {
    buf.reserve(encoded_len(record));
    match record {
        Record::Set {
            key,
            value,
            timestamp,
        } => {
            buf.write_u64::<NativeEndian>(key.len() as u64)?;
            buf.write_u8(FLAG_SET)?;
            buf.write_u64::<NativeEndian>(value.len() as u64)?;
            buf.extend_from_slice(key);
            buf.extend_from_slice(value);
            buf.write_u64::<NativeEndian>(*timestamp)?;
        }
        Record::Tombstone { key, timestamp } => {
            // key_size is the key's byte length, same as for writes
            buf.write_u64::<NativeEndian>(key.len() as u64)?;
            buf.write_u8(FLAG_TOMBSTONE)?;
            buf.extend_from_slice(key);
            buf.write_u64::<NativeEndian>(*timestamp)?;
        }
    }
    Ok(())
}

/// Decodes the next record from `rdr`.
///
/// `offset` is the stream position of the record start and is only used to
/// label corruption errors.
///
/// # Termination
///
/// - no bytes left before `key_size` -> [`Decoded::End`]
/// - any later field cut short -> [`Decoded::Truncated`]
/// - flag byte other than 0 or 1 -> [`WalError::Corrupt`]
pub fn decode_record<R: Read>(rdr: &mut R, offset: u64) -> Result<Decoded, WalError> {
    let key_size = match read_u64_or_eof(rdr)? {
        Field::Value(v) => v,
        Field::Eof { partial: false } => return Ok(Decoded::End),
        Field::Eof { partial: true } => return Ok(Decoded::Truncated),
    };

    let flag = match rdr.read_u8() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Decoded::Truncated),
        Err(e) => return Err(WalError::Io(e)),
    };

    match flag {
        FLAG_SET => {
            let value_size = match read_u64_or_eof(rdr)? {
                Field::Value(v) => v,
                Field::Eof { .. } => return Ok(Decoded::Truncated),
            };
            let Some(key) = read_payload(rdr, key_size)? else {
                return Ok(Decoded::Truncated);
            };
            let Some(value) = read_payload(rdr, value_size)? else {
                return Ok(Decoded::Truncated);
            };
            let timestamp = match read_u64_or_eof(rdr)? {
                Field::Value(v) => v,
                Field::Eof { .. } => return Ok(Decoded::Truncated),
            };
            Ok(Decoded::Record(Record::Set {
                key,
                value,
                timestamp,
            }))
        }
        FLAG_TOMBSTONE => {
            let Some(key) = read_payload(rdr, key_size)? else {
                return Ok(Decoded::Truncated);
            };
            let timestamp = match read_u64_or_eof(rdr)? {
                Field::Value(v) => v,
                Field::Eof { .. } => return Ok(Decoded::Truncated),
            };
            Ok(Decoded::Record(Record::Tombstone { key, timestamp }))
        }
        other => Err(WalError::Corrupt {
            offset,
            reason: format!("unknown record flag {other:#04x}"),
        }),
    }
}

enum Field {
    Value(u64),
    /// `partial` is true when some, but not all, of the field's bytes were read.
    Eof { partial: bool },
}

fn read_u64_or_eof<R: Read>(rdr: &mut R) -> Result<Field, WalError> {
    let mut raw = [0u8; 8];
    let mut filled = 0;
    while filled < raw.len() {
        match rdr.read(&mut raw[filled..]) {
            Ok(0) => return Ok(Field::Eof { partial: filled > 0 }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WalError::Io(e)),
        }
    }
    Ok(Field::Value((&raw[..]).read_u64::<NativeEndian>()?))
}

/// Reads exactly `len` bytes, or returns `None` if the stream ends first.
///
/// The read goes through `take` so a torn length prefix never turns into a
/// multi-gigabyte allocation.
fn read_payload<R: Read>(rdr: &mut R, len: u64) -> Result<Option<Vec<u8>>, WalError> {
    let mut out = Vec::new();
    let n = rdr.by_ref().take(len).read_to_end(&mut out)?;
    if (n as u64) < len {
        return Ok(None);
    }
    Ok(Some(out))
}
