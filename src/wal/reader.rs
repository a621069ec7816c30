//! Commit log reader used during recovery.

use super::record::{LogRecord, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Sequential reader over a commit log file
pub struct WALReader {
    reader: BufReader<File>,
    /// Current read position
    position: u64,
}

impl WALReader {
    /// Open a log file for reading
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next record.
    ///
    /// Returns `None` at a clean end of file. A record cut short by a crash
    /// surfaces as `Corruption`.
    pub fn read_next(&mut self) -> Result<Option<LogRecord>> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_full(&mut self.reader, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_SIZE {
            return Err(Error::Corruption(format!(
                "Truncated log header at position {}",
                self.position
            )));
        }

        let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(Error::Corruption(format!(
                "Log record at position {} claims {} payload bytes",
                self.position, length
            )));
        }
        let mut buffer = vec![0u8; HEADER_SIZE + length];
        buffer[..HEADER_SIZE].copy_from_slice(&header);
        if read_full(&mut self.reader, &mut buffer[HEADER_SIZE..])? < length {
            return Err(Error::Corruption(format!(
                "Truncated log payload at position {}",
                self.position
            )));
        }

        let record = LogRecord::decode(&buffer)?;
        self.position += buffer.len() as u64;
        Ok(Some(record))
    }

    /// Get the current read position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read every intact record, stopping at the first torn or corrupt one.
    pub fn read_all(&mut self) -> Result<Vec<LogRecord>> {
        let mut records = Vec::new();

        loop {
            match self.read_next() {
                Ok(Some(record)) => records.push(record),
                Ok(None) => break,
                Err(Error::Corruption(msg)) => {
                    log::warn!("Commit log ends in a torn record at position {}: {}", self.position, msg);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }
}

/// Like `read_exact`, but reports how many bytes were read before EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}
