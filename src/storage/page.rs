//! Slotted record page format.
//!
//! A page is a fixed-size block holding a checksum header followed by
//! equally sized slots:
//! ```text
//! [crc32 of body: u32]
//! [slot 0: in_use u32 | fields...]
//! [slot 1: in_use u32 | fields...]
//! ...
//! ```
//! Integers are stored little-endian; a `Varchar(n)` field is stored as
//! `[len: u32][n bytes]`.

use super::schema::{FieldType, Layout, Value, PAGE_HEADER_SIZE};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut};

const SLOT_EMPTY: u32 = 0;
const SLOT_USED: u32 = 1;

/// Read-only view of a record page.
pub struct RecordPage<'a> {
    data: &'a [u8],
    layout: &'a Layout,
}

impl<'a> RecordPage<'a> {
    /// Wrap page bytes with the layout of the table they belong to.
    pub fn new(data: &'a [u8], layout: &'a Layout) -> Self {
        Self { data, layout }
    }

    /// Returns true if the slot holds a record.
    pub fn is_used(&self, slot: u32) -> bool {
        let off = self.layout.slot_offset(slot);
        (&self.data[off..]).get_u32_le() == SLOT_USED
    }

    /// First used slot strictly after `after` (or from the start when `None`).
    pub fn next_used(&self, after: Option<u32>) -> Option<u32> {
        self.search(after, true)
    }

    /// First empty slot strictly after `after` (or from the start when `None`).
    pub fn next_empty(&self, after: Option<u32>) -> Option<u32> {
        self.search(after, false)
    }

    fn search(&self, after: Option<u32>, used: bool) -> Option<u32> {
        let start = after.map_or(0, |s| s + 1);
        (start..self.layout.slots_per_page() as u32).find(|&slot| self.is_used(slot) == used)
    }

    /// Reads an integer field.
    pub fn get_int(&self, slot: u32, field: &str) -> Result<i32> {
        match self.get_value(slot, field)? {
            Value::Int(v) => Ok(v),
            Value::Str(_) => Err(Error::invalid_argument(format!("field {} is not an int", field))),
        }
    }

    /// Reads a field of any type.
    pub fn get_value(&self, slot: u32, field: &str) -> Result<Value> {
        let (field_off, field_type) = self.layout.field(field)?;
        let off = self.layout.slot_offset(slot) + field_off;
        let mut buf = &self.data[off..off + field_type.encoded_len()];
        match field_type {
            FieldType::Int => Ok(Value::Int(buf.get_i32_le())),
            FieldType::Varchar(max_len) => {
                let len = buf.get_u32_le() as usize;
                if len > max_len {
                    return Err(Error::corruption(format!(
                        "varchar length {} exceeds declared {}",
                        len, max_len
                    )));
                }
                let s = std::str::from_utf8(&buf[..len])
                    .map_err(|e| Error::corruption(format!("invalid utf-8 in {}: {}", field, e)))?;
                Ok(Value::Str(s.to_string()))
            }
        }
    }
}

/// Mutable view of a record page.
pub struct RecordPageMut<'a> {
    data: &'a mut [u8],
    layout: &'a Layout,
}

impl<'a> RecordPageMut<'a> {
    /// Wrap page bytes with the layout of the table they belong to.
    pub fn new(data: &'a mut [u8], layout: &'a Layout) -> Self {
        Self { data, layout }
    }

    /// Read-only view over the same bytes.
    pub fn view(&self) -> RecordPage<'_> {
        RecordPage::new(&*self.data, self.layout)
    }

    /// Marks the slot used and resets its fields to their zero values.
    pub fn claim(&mut self, slot: u32) -> Result<()> {
        self.set_flag(slot, SLOT_USED);
        let layout = self.layout;
        for (name, field_type) in layout.field_types() {
            self.set_value(slot, name, &field_type.zero())?;
        }
        Ok(())
    }

    /// Marks the slot empty.
    pub fn release(&mut self, slot: u32) {
        self.set_flag(slot, SLOT_EMPTY);
    }

    fn set_flag(&mut self, slot: u32, flag: u32) {
        let off = self.layout.slot_offset(slot);
        (&mut self.data[off..off + 4]).put_u32_le(flag);
    }

    /// Writes a field, checking the value against the field type.
    pub fn set_value(&mut self, slot: u32, field: &str, value: &Value) -> Result<()> {
        let (field_off, field_type) = self.layout.field(field)?;
        value.check_type(field_type)?;
        let off = self.layout.slot_offset(slot) + field_off;
        let mut buf = &mut self.data[off..off + field_type.encoded_len()];
        match value {
            Value::Int(v) => buf.put_i32_le(*v),
            Value::Str(s) => {
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
        }
        Ok(())
    }
}

/// Allocates a zeroed page: every slot empty.
pub fn empty_page(block_size: usize) -> Vec<u8> {
    vec![0u8; block_size]
}

/// Computes the checksum of a page body.
pub fn body_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(&data[PAGE_HEADER_SIZE..])
}

/// Writes the body checksum into the page header.
pub fn stamp_checksum(data: &mut [u8]) {
    let checksum = body_checksum(data);
    (&mut data[..PAGE_HEADER_SIZE]).put_u32_le(checksum);
}

/// Returns `(stored, computed)` when the header does not match the body.
pub fn verify_checksum(data: &[u8]) -> std::result::Result<(), (u32, u32)> {
    let stored = (&data[..PAGE_HEADER_SIZE]).get_u32_le();
    let computed = body_checksum(data);
    if stored == computed {
        Ok(())
    } else {
        Err((stored, computed))
    }
}
