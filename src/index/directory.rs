//! Directory of an extendable hash index and its header.
//!
//! The header table `<index>.hdr` holds a single row with the global depth
//! and the settings the index was created with. The directory table
//! `<index>.dir` holds one `(slot, bucket)` row per slot, stored densely in
//! slot order: the row of slot `s` lives at a locator computed from `s`, so
//! resolving a slot reads exactly one row.

use super::hash::{low_bits, HashFunction};
use crate::error::{Error, Result};
use crate::storage::{FieldType, Layout, RecordId, Schema, TableScan, Transaction, Value};
use std::sync::Arc;

const SLOT_FIELD: &str = "slot";
const BUCKET_FIELD: &str = "bucket";

const DEPTH_FIELD: &str = "global_depth";
const CAPACITY_FIELD: &str = "capacity";
const HASH_FIELD: &str = "hash_fn";
const KEY_KIND_FIELD: &str = "key_kind";
const KEY_LEN_FIELD: &str = "key_len";

const KEY_KIND_INT: i32 = 0;
const KEY_KIND_VARCHAR: i32 = 1;

/// Physical name of the header table
pub(crate) fn header_table(index: &str) -> String {
    format!("{}.hdr", index)
}

/// Physical name of the directory table
pub(crate) fn directory_table(index: &str) -> String {
    format!("{}.dir", index)
}

/// Persisted index settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    pub global_depth: u32,
    pub bucket_capacity: u32,
    pub hash_function: HashFunction,
    pub key_type: FieldType,
}

fn header_layout(block_size: usize) -> Result<Layout> {
    let mut schema = Schema::new();
    schema
        .add_int_field(DEPTH_FIELD)
        .add_int_field(CAPACITY_FIELD)
        .add_int_field(HASH_FIELD)
        .add_int_field(KEY_KIND_FIELD)
        .add_int_field(KEY_LEN_FIELD);
    Layout::new(schema, block_size)
}

fn directory_layout(block_size: usize) -> Result<Layout> {
    let mut schema = Schema::new();
    schema.add_int_field(SLOT_FIELD).add_int_field(BUCKET_FIELD);
    Layout::new(schema, block_size)
}

pub(crate) struct Directory {
    index: String,
    header_scan: TableScan,
    slots: TableScan,
    slots_per_page: u32,
    header: Header,
}

impl Directory {
    /// Create the header and a directory of two slots pointing at buckets 0 and 1.
    pub fn create(tx: &Transaction, index: &str, mut header: Header) -> Result<Self> {
        header.global_depth = 1;
        let mut dir = Self::open_tables(tx, index, header)?;

        dir.header_scan.insert()?;
        dir.write_header()?;

        for slot in 0..2u32 {
            dir.append_slot(slot, slot)?;
        }
        Ok(dir)
    }

    /// Open an existing directory.
    pub fn open(tx: &Transaction, index: &str) -> Result<Self> {
        let placeholder = Header {
            global_depth: 0,
            bucket_capacity: 0,
            hash_function: HashFunction::default(),
            key_type: FieldType::Int,
        };
        let mut dir = Self::open_tables(tx, index, placeholder)?;
        dir.header = dir.read_header()?;
        Ok(dir)
    }

    fn open_tables(tx: &Transaction, index: &str, header: Header) -> Result<Self> {
        let block_size = tx.block_size();
        let header_scan = TableScan::open(tx, &header_table(index), Arc::new(header_layout(block_size)?))?;
        let layout = Arc::new(directory_layout(block_size)?);
        let slots_per_page = layout.slots_per_page() as u32;
        let slots = TableScan::open(tx, &directory_table(index), layout)?;
        Ok(Self {
            index: index.to_string(),
            header_scan,
            slots,
            slots_per_page,
            header,
        })
    }

    fn read_header(&mut self) -> Result<Header> {
        self.header_scan.move_to(RecordId::new(0, 0))?;
        if !self.header_scan.has_record()? {
            return Err(Error::corruption(format!("index {} has no header row", self.index)));
        }

        let global_depth = self.header_scan.get_int(DEPTH_FIELD)?;
        let capacity = self.header_scan.get_int(CAPACITY_FIELD)?;
        if global_depth < 1 || global_depth as u32 > u32::BITS || capacity < 1 {
            return Err(Error::corruption(format!(
                "index {} has an invalid header (global depth {}, capacity {})",
                self.index, global_depth, capacity
            )));
        }

        let key_len = self.header_scan.get_int(KEY_LEN_FIELD)?;
        let key_type = match self.header_scan.get_int(KEY_KIND_FIELD)? {
            KEY_KIND_INT => FieldType::Int,
            KEY_KIND_VARCHAR if key_len > 0 => FieldType::Varchar(key_len as usize),
            kind => {
                return Err(Error::corruption(format!(
                    "index {} has an invalid key type ({}, {})",
                    self.index, kind, key_len
                )))
            }
        };

        Ok(Header {
            global_depth: global_depth as u32,
            bucket_capacity: capacity as u32,
            hash_function: HashFunction::from_id(self.header_scan.get_int(HASH_FIELD)?)?,
            key_type,
        })
    }

    fn write_header(&mut self) -> Result<()> {
        let (kind, len) = match self.header.key_type {
            FieldType::Int => (KEY_KIND_INT, 0),
            FieldType::Varchar(n) => (KEY_KIND_VARCHAR, n as i32),
        };
        self.header_scan.move_to(RecordId::new(0, 0))?;
        self.header_scan.set_int(DEPTH_FIELD, self.header.global_depth as i32)?;
        self.header_scan.set_int(CAPACITY_FIELD, self.header.bucket_capacity as i32)?;
        self.header_scan.set_int(HASH_FIELD, self.header.hash_function.id())?;
        self.header_scan.set_int(KEY_KIND_FIELD, kind)?;
        self.header_scan.set_int(KEY_LEN_FIELD, len)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn global_depth(&self) -> u32 {
        self.header.global_depth
    }

    /// Number of slots, `2^global_depth`.
    pub fn size(&self) -> u64 {
        1u64 << self.header.global_depth
    }

    /// `hash(key) mod 2^global_depth`
    pub fn slot_for(&self, key: &Value) -> u32 {
        low_bits(self.header.hash_function.hash(key), self.header.global_depth)
    }

    fn locator(&self, slot: u32) -> RecordId {
        RecordId::new(slot / self.slots_per_page, slot % self.slots_per_page)
    }

    fn missing(&self, slot: u32) -> Error {
        Error::CorruptDirectory {
            index: self.index.clone(),
            slot,
            global_depth: self.header.global_depth,
        }
    }

    /// Position the directory cursor on the row of `slot`.
    fn seek(&mut self, slot: u32) -> Result<()> {
        if slot as u64 >= self.size() {
            return Err(self.missing(slot));
        }
        let rid = self.locator(slot);
        self.slots.move_to(rid)?;
        if !self.slots.has_record()? || self.slots.get_int(SLOT_FIELD)? as u32 != slot {
            return Err(self.missing(slot));
        }
        Ok(())
    }

    /// Bucket the slot points to.
    pub fn bucket_for(&mut self, slot: u32) -> Result<u32> {
        self.seek(slot)?;
        Ok(self.slots.get_int(BUCKET_FIELD)? as u32)
    }

    /// Point `slot` at `bucket`.
    pub fn repoint(&mut self, slot: u32, bucket: u32) -> Result<()> {
        self.seek(slot)?;
        self.slots.set_int(BUCKET_FIELD, bucket as i32)
    }

    fn append_slot(&mut self, slot: u32, bucket: u32) -> Result<()> {
        self.slots.insert()?;
        let rid = self.slots.record_id()?;
        if rid != self.locator(slot) {
            return Err(Error::corruption(format!(
                "index {}: directory slot {} landed at {} instead of {}",
                self.index,
                slot,
                rid,
                self.locator(slot)
            )));
        }
        self.slots.set_int(SLOT_FIELD, slot as i32)?;
        self.slots.set_int(BUCKET_FIELD, bucket as i32)
    }

    /// Double the directory: slot `s + 2^old` copies the pointer of slot `s`.
    pub fn double(&mut self) -> Result<()> {
        let old_depth = self.header.global_depth;
        if old_depth >= u32::BITS {
            return Err(Error::invalid_state(format!(
                "index {}: directory cannot grow past depth {}",
                self.index, old_depth
            )));
        }

        let pointers = self.pointers()?;
        let old_size = pointers.len() as u32;
        let last = self.locator(old_size - 1);
        self.slots.move_to(last)?;
        for (slot, bucket) in pointers.into_iter().enumerate() {
            self.append_slot(old_size + slot as u32, bucket)?;
        }

        self.header.global_depth = old_depth + 1;
        self.write_header()?;
        log::info!(
            "Index {}: directory doubled to {} slots (global depth {})",
            self.index,
            self.size(),
            self.header.global_depth
        );
        Ok(())
    }

    /// Bucket pointers of every slot, in slot order.
    pub fn pointers(&mut self) -> Result<Vec<u32>> {
        let size = self.size();
        let mut pointers = Vec::with_capacity(size as usize);
        self.slots.before_first();
        while self.slots.next()? {
            let slot = self.slots.get_int(SLOT_FIELD)? as u32;
            if slot as usize != pointers.len() || slot as u64 >= size {
                return Err(Error::corruption(format!(
                    "index {}: directory row for slot {} found at position {}",
                    self.index,
                    slot,
                    pointers.len()
                )));
            }
            pointers.push(self.slots.get_int(BUCKET_FIELD)? as u32);
        }

        if pointers.len() as u64 != size {
            return Err(self.missing(pointers.len() as u32));
        }
        Ok(pointers)
    }

    pub fn close(&mut self) {
        self.header_scan.close();
        self.slots.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::storage::StorageEngine;
    use tempfile::TempDir;

    fn header() -> Header {
        Header {
            global_depth: 1,
            bucket_capacity: 4,
            hash_function: HashFunction::Identity,
            key_type: FieldType::Varchar(12),
        }
    }

    fn engine(dir: &TempDir) -> Arc<StorageEngine> {
        StorageEngine::open(dir.path(), Options::default().block_size(128).sync_on_commit(false))
            .unwrap()
    }

    #[test]
    fn test_create_and_reopen() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let tx = engine.begin();
        let mut directory = Directory::create(&tx, "idx", header()).unwrap();
        assert_eq!(directory.global_depth(), 1);
        assert_eq!(directory.pointers().unwrap(), vec![0, 1]);
        directory.close();
        tx.commit().unwrap();

        let tx = engine.begin();
        let mut directory = Directory::open(&tx, "idx").unwrap();
        assert_eq!(directory.header(), &header());
        assert_eq!(directory.bucket_for(1).unwrap(), 1);
    }

    #[test]
    fn test_double_copies_pointers() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let tx = engine.begin();

        let mut directory = Directory::create(&tx, "idx", header()).unwrap();
        directory.repoint(1, 7).unwrap();
        // 128 byte pages hold 10 directory rows: depth 5 spans several blocks
        for _ in 0..4 {
            directory.double().unwrap();
        }
        assert_eq!(directory.global_depth(), 5);

        let pointers = directory.pointers().unwrap();
        assert_eq!(pointers.len(), 32);
        for (slot, bucket) in pointers.into_iter().enumerate() {
            assert_eq!(bucket, if slot % 2 == 0 { 0 } else { 7 });
        }
        assert_eq!(Directory::open(&tx, "idx").unwrap().global_depth(), 5);
    }

    #[test]
    fn test_slot_for_uses_low_bits() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let tx = engine.begin();

        let mut directory = Directory::create(&tx, "idx", header()).unwrap();
        directory.double().unwrap();
        assert_eq!(directory.slot_for(&Value::Int(6)), 2);
        assert_eq!(directory.slot_for(&Value::Int(13)), 1);
    }

    #[test]
    fn test_missing_slot_is_corruption() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let tx = engine.begin();

        let mut directory = Directory::create(&tx, "idx", header()).unwrap();
        assert!(matches!(
            directory.bucket_for(2),
            Err(Error::CorruptDirectory { slot: 2, global_depth: 1, .. })
        ));

        // Drop slot 1's row behind the directory's back
        let layout = Arc::new(directory_layout(128).unwrap());
        let mut scan = TableScan::open(&tx, "idx.dir", layout).unwrap();
        scan.move_to(RecordId::new(0, 1)).unwrap();
        scan.delete().unwrap();

        assert!(matches!(
            directory.bucket_for(1),
            Err(Error::CorruptDirectory { slot: 1, .. })
        ));
        assert!(directory.pointers().is_err());
    }
}
