//! WAL reader implementation for recovery.

use super::record::{RecordHeader, RecordType, HEADER_SIZE};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// WAL reader that reassembles fragmented entries
pub struct WALReader {
    reader: BufReader<File>,
    position: u64,
}

impl WALReader {
    /// Open a WAL file for reading
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self { reader: BufReader::new(file), position: 0 })
    }

    /// Read the next complete entry, or `None` at a clean end of file.
    pub fn read_next(&mut self) -> Result<Option<Vec<u8>>> {
        let mut assembled: Option<Vec<u8>> = None;

        loop {
            let Some((record_type, data)) = self.read_record()? else {
                return match assembled {
                    Some(_) => Err(Error::corruption("EOF while expecting continuation record")),
                    None => Ok(None),
                };
            };

            match record_type {
                RecordType::Full if assembled.is_none() => return Ok(Some(data)),
                RecordType::First if assembled.is_none() => assembled = Some(data),
                RecordType::Middle | RecordType::Last if assembled.is_some() => {
                    if let Some(buf) = assembled.as_mut() {
                        buf.extend_from_slice(&data);
                    }
                    if record_type == RecordType::Last {
                        return Ok(assembled);
                    }
                }
                _ => {
                    return Err(Error::corruption(format!(
                        "Unexpected {:?} record at position {}",
                        record_type, self.position
                    )));
                }
            }
        }
    }

    fn read_record(&mut self) -> Result<Option<(RecordType, Vec<u8>)>> {
        let mut header = [0u8; HEADER_SIZE];
        match self.reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let header = RecordHeader::decode(&header)?;
        let mut data = vec![0u8; header.length];
        match self.reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(Error::corruption("Truncated record"));
            }
            Err(e) => return Err(e.into()),
        }
        header.verify(&data)?;

        self.position += (HEADER_SIZE + header.length) as u64;
        Ok(Some((header.record_type, data)))
    }

    /// Get the current read position
    pub fn position(&self) -> u64 {
        self.position
    }
}
