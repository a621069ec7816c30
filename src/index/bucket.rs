//! Bucket store: one table of `(block, id, dataval)` entries per bucket.

use crate::error::Result;
use crate::storage::{FieldType, Layout, RecordId, Schema, TableScan, Transaction, Value};
use std::sync::Arc;

const BLOCK_FIELD: &str = "block";
const ID_FIELD: &str = "id";
const KEY_FIELD: &str = "dataval";

/// Physical name of a bucket table
pub(crate) fn bucket_table(index: &str, bucket: u32) -> String {
    format!("{}.b{}", index, bucket)
}

/// Layout of an index entry for the given key type.
pub(crate) fn bucket_layout(key_type: FieldType, block_size: usize) -> Result<Layout> {
    let mut schema = Schema::new();
    schema
        .add_int_field(BLOCK_FIELD)
        .add_int_field(ID_FIELD)
        .add_field(KEY_FIELD, key_type);
    Layout::new(schema, block_size)
}

/// Cursor over the entries of one bucket. The table is created by the first
/// insert.
pub(crate) struct Bucket {
    id: u32,
    scan: TableScan,
}

impl Bucket {
    pub fn open(tx: &Transaction, index: &str, id: u32, layout: Arc<Layout>) -> Result<Self> {
        Ok(Self {
            id,
            scan: TableScan::open(tx, &bucket_table(index, id), layout)?,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn before_first(&mut self) {
        self.scan.before_first();
    }

    /// Move to the next entry.
    pub fn next(&mut self) -> Result<bool> {
        self.scan.next()
    }

    /// Key of the current entry.
    pub fn key(&self) -> Result<Value> {
        self.scan.get_value(KEY_FIELD)
    }

    /// Record locator stored in the current entry.
    pub fn locator(&self) -> Result<RecordId> {
        Ok(RecordId::new(
            self.scan.get_int(BLOCK_FIELD)? as u32,
            self.scan.get_int(ID_FIELD)? as u32,
        ))
    }

    pub fn insert(&mut self, key: &Value, rid: RecordId) -> Result<()> {
        self.scan.insert()?;
        self.scan.set_int(BLOCK_FIELD, rid.block as i32)?;
        self.scan.set_int(ID_FIELD, rid.slot as i32)?;
        self.scan.set_value(KEY_FIELD, key)
    }

    /// Delete the current entry.
    pub fn delete(&mut self) -> Result<()> {
        self.scan.delete()
    }

    /// Number of entries. Leaves the cursor before the first entry.
    pub fn count(&mut self) -> Result<usize> {
        let mut count = 0;
        self.scan.before_first();
        while self.scan.next()? {
            count += 1;
        }
        self.scan.before_first();
        Ok(count)
    }

    /// All entries. Leaves the cursor before the first entry.
    pub fn entries(&mut self) -> Result<Vec<(Value, RecordId)>> {
        let mut entries = Vec::new();
        self.scan.before_first();
        while self.scan.next()? {
            entries.push((self.key()?, self.locator()?));
        }
        self.scan.before_first();
        Ok(entries)
    }

    pub fn close(&mut self) {
        self.scan.close();
    }
}
