//! WAL record framing.
//!
//! Each physical record is laid out as:
//! - Checksum (4 bytes): CRC32 of type and data
//! - Length (2 bytes): Length of the data
//! - Type (1 byte): Full, First, Middle or Last
//! - Data (variable)
//!
//! Entries larger than [`MAX_RECORD_SIZE`] are split into First/Middle/Last
//! fragments.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;

/// Maximum size of a single record's data portion
pub const MAX_RECORD_SIZE: usize = 32 * 1024;

/// Size of the record header (checksum + length + type)
pub const HEADER_SIZE: usize = 7;

/// Record types for entries that span several records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Complete entry in a single record
    Full = 1,
    /// First fragment of an entry
    First = 2,
    /// Middle fragment of an entry
    Middle = 3,
    /// Last fragment of an entry
    Last = 4,
}

impl RecordType {
    /// Convert from u8 to RecordType
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordType::Full),
            2 => Ok(RecordType::First),
            3 => Ok(RecordType::Middle),
            4 => Ok(RecordType::Last),
            _ => Err(Error::corruption(format!("Invalid record type: {}", value))),
        }
    }
}

/// Frames `entry` into one or more records appended to `buf`.
pub fn encode_entry(entry: &[u8], buf: &mut BytesMut) {
    let chunks: Vec<&[u8]> = if entry.is_empty() {
        vec![entry]
    } else {
        entry.chunks(MAX_RECORD_SIZE).collect()
    };
    let last = chunks.len() - 1;

    for (i, chunk) in chunks.into_iter().enumerate() {
        let record_type = match (i, last) {
            (_, 0) => RecordType::Full,
            (0, _) => RecordType::First,
            (i, last) if i == last => RecordType::Last,
            _ => RecordType::Middle,
        };

        buf.reserve(HEADER_SIZE + chunk.len());
        buf.put_u32_le(checksum(record_type, chunk));
        buf.put_u16_le(chunk.len() as u16);
        buf.put_u8(record_type as u8);
        buf.put_slice(chunk);
    }
}

/// Parsed record header.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    /// Stored checksum
    pub checksum: u32,
    /// Data length
    pub length: usize,
    /// Record type
    pub record_type: RecordType,
}

impl RecordHeader {
    /// Parses a header from exactly [`HEADER_SIZE`] bytes.
    pub fn decode(mut header: &[u8]) -> Result<Self> {
        if header.len() < HEADER_SIZE {
            return Err(Error::corruption(format!(
                "Record header too short: {} bytes",
                header.len()
            )));
        }
        let checksum = header.get_u32_le();
        let length = header.get_u16_le() as usize;
        let record_type = RecordType::from_u8(header.get_u8())?;
        Ok(Self { checksum, length, record_type })
    }

    /// Checks `data` against the stored checksum.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let actual = checksum(self.record_type, data);
        if actual != self.checksum {
            return Err(Error::ChecksumMismatch { expected: self.checksum, actual });
        }
        Ok(())
    }
}

fn checksum(record_type: RecordType, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[record_type as u8]);
    hasher.update(data);
    hasher.finalize()
}
