//! Hash functions that place index keys on directory slots.

use crate::error::{Error, Result};
use crate::storage::Value;
use std::fmt;
use std::str::FromStr;

const TAG_INT: u8 = 0x01;
const TAG_STR: u8 = 0x02;

/// Hash function of an extendable hash index.
///
/// The hash is persisted with the index, so every variant must be
/// deterministic across processes and platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashFunction {
    /// CRC-32 of a canonical key encoding (type tag followed by the payload).
    #[default]
    Crc32,
    /// Integer keys hash to their own bit pattern. Strings fall back to CRC-32.
    ///
    /// Useful to place keys on chosen slots.
    Identity,
}

impl HashFunction {
    /// Hash a key to 32 bits.
    pub fn hash(&self, key: &Value) -> u32 {
        match (self, key) {
            (HashFunction::Identity, Value::Int(v)) => *v as u32,
            _ => crc32fast::hash(&canonical_bytes(key)),
        }
    }

    /// Numeric id stored in the index header.
    pub fn id(&self) -> i32 {
        match self {
            HashFunction::Crc32 => 1,
            HashFunction::Identity => 2,
        }
    }

    /// Inverse of [`HashFunction::id`].
    pub fn from_id(id: i32) -> Result<Self> {
        match id {
            1 => Ok(HashFunction::Crc32),
            2 => Ok(HashFunction::Identity),
            other => Err(Error::corruption(format!("unknown hash function id {}", other))),
        }
    }
}

impl fmt::Display for HashFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashFunction::Crc32 => write!(f, "crc32"),
            HashFunction::Identity => write!(f, "identity"),
        }
    }
}

impl FromStr for HashFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "crc32" => Ok(HashFunction::Crc32),
            "identity" => Ok(HashFunction::Identity),
            other => Err(Error::invalid_argument(format!("unknown hash function {:?}", other))),
        }
    }
}

fn canonical_bytes(key: &Value) -> Vec<u8> {
    match key {
        Value::Int(v) => {
            let mut buf = Vec::with_capacity(5);
            buf.push(TAG_INT);
            buf.extend_from_slice(&v.to_le_bytes());
            buf
        }
        Value::Str(s) => {
            let mut buf = Vec::with_capacity(1 + s.len());
            buf.push(TAG_STR);
            buf.extend_from_slice(s.as_bytes());
            buf
        }
    }
}

/// The low `depth` bits of `hash`.
pub fn low_bits(hash: u32, depth: u32) -> u32 {
    if depth >= u32::BITS {
        hash
    } else {
        hash & ((1u32 << depth) - 1)
    }
}
