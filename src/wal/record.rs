//! Commit log record format.
//!
//! Each record consists of:
//! - Checksum (4 bytes): CRC32 of kind, transaction id and payload
//! - Length (4 bytes): Length of the payload
//! - Kind (1 byte): Record kind (PageImage, Commit)
//! - Transaction id (8 bytes)
//! - Payload (variable)

use crate::config::MAX_BLOCK_SIZE;
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

/// Size of the record header (checksum + length + kind + txn id)
pub const HEADER_SIZE: usize = 17;

/// Upper bound on a payload: one page image of the largest block size plus
/// its table name and framing.
pub const MAX_PAYLOAD_SIZE: usize = MAX_BLOCK_SIZE + 1024;

/// Record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// After-image of one page written by a transaction
    PageImage = 1,
    /// The transaction's page images are complete and durable
    Commit = 2,
}

impl RecordKind {
    /// Convert from u8 to RecordKind
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RecordKind::PageImage),
            2 => Ok(RecordKind::Commit),
            _ => Err(Error::Corruption(format!("Invalid log record kind: {}", value))),
        }
    }
}

/// Payload of a `PageImage` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    /// Table the page belongs to
    pub table: String,
    /// Block number of the page
    pub block: u32,
    /// Full page contents, checksum header included
    pub data: Vec<u8>,
}

/// A commit log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Kind of the record
    pub kind: RecordKind,
    /// Transaction that wrote the record
    pub txn_id: u64,
    /// Encoded payload
    pub payload: Vec<u8>,
}

impl LogRecord {
    /// Build a page image record
    pub fn page_image(txn_id: u64, image: &PageImage) -> Result<Self> {
        Ok(Self {
            kind: RecordKind::PageImage,
            txn_id,
            payload: bincode::serialize(image)?,
        })
    }

    /// Build a commit marker
    pub fn commit(txn_id: u64) -> Self {
        Self {
            kind: RecordKind::Commit,
            txn_id,
            payload: Vec::new(),
        }
    }

    /// Decode the payload of a page image record
    pub fn to_page_image(&self) -> Result<PageImage> {
        if self.kind != RecordKind::PageImage {
            return Err(Error::internal(format!("{:?} record has no page image", self.kind)));
        }
        Ok(bincode::deserialize(&self.payload)?)
    }

    /// Encode the record into bytes
    ///
    /// Format: [checksum: u32][length: u32][kind: u8][txn_id: u64][payload: bytes]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        buf.put_u32_le(Self::calculate_checksum(self.kind, self.txn_id, &self.payload));
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_u8(self.kind as u8);
        buf.put_u64_le(self.txn_id);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Decode a record from bytes
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corruption(format!("Log record too short: {} bytes", data.len())));
        }

        let checksum = data.get_u32_le();
        let length = data.get_u32_le() as usize;
        let kind = RecordKind::from_u8(data.get_u8())?;
        let txn_id = data.get_u64_le();

        if data.len() < length {
            return Err(Error::Corruption(format!(
                "Incomplete log record: expected {} bytes, got {}",
                length,
                data.len()
            )));
        }

        let payload = data[..length].to_vec();
        let expected = Self::calculate_checksum(kind, txn_id, &payload);
        if checksum != expected {
            return Err(Error::Corruption(format!(
                "Log checksum mismatch: expected {:#x}, got {:#x}",
                expected, checksum
            )));
        }

        Ok(LogRecord { kind, txn_id, payload })
    }

    fn calculate_checksum(kind: RecordKind, txn_id: u64, payload: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&[kind as u8]);
        hasher.update(&txn_id.to_le_bytes());
        hasher.update(payload);
        hasher.finalize()
    }

    /// Get the total size of the encoded record
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}
