//! Bucket catalog: local depth and capacity of every bucket of one index.
//!
//! Rows live in `<index>.cat`. The catalog is read once when the index is
//! opened and mirrored in memory for the lifetime of that index handle; every
//! change is written through to the table inside the handle's transaction.

use crate::error::{Error, Result};
use crate::storage::{Layout, RecordId, Schema, TableScan, Transaction};
use std::collections::BTreeMap;
use std::sync::Arc;

const BUCKET_FIELD: &str = "bucket";
const DEPTH_FIELD: &str = "local_depth";
const CAPACITY_FIELD: &str = "capacity";

/// Physical name of the catalog table
pub(crate) fn catalog_table(index: &str) -> String {
    format!("{}.cat", index)
}

fn catalog_layout(block_size: usize) -> Result<Layout> {
    let mut schema = Schema::new();
    schema
        .add_int_field(BUCKET_FIELD)
        .add_int_field(DEPTH_FIELD)
        .add_int_field(CAPACITY_FIELD);
    Layout::new(schema, block_size)
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    local_depth: u32,
    rid: RecordId,
}

pub(crate) struct Catalog {
    index: String,
    scan: TableScan,
    buckets: BTreeMap<u32, Entry>,
}

impl Catalog {
    /// Open the catalog and load every row.
    pub fn open(tx: &Transaction, index: &str) -> Result<Self> {
        let layout = Arc::new(catalog_layout(tx.block_size())?);
        let mut scan = TableScan::open(tx, &catalog_table(index), layout)?;

        let mut buckets = BTreeMap::new();
        while scan.next()? {
            let bucket = scan.get_int(BUCKET_FIELD)? as u32;
            let entry = Entry {
                local_depth: scan.get_int(DEPTH_FIELD)? as u32,
                rid: scan.record_id()?,
            };
            if buckets.insert(bucket, entry).is_some() {
                return Err(Error::corruption(format!(
                    "index {}: bucket {} is registered twice",
                    index, bucket
                )));
            }
        }

        Ok(Self {
            index: index.to_string(),
            scan,
            buckets,
        })
    }

    /// Local depth of a bucket.
    pub fn depth_of(&self, bucket: u32) -> Result<u32> {
        self.buckets
            .get(&bucket)
            .map(|entry| entry.local_depth)
            .ok_or_else(|| Error::UnknownBucket {
                index: self.index.clone(),
                bucket,
            })
    }

    /// Insert or update the row of a bucket.
    pub fn register(&mut self, bucket: u32, local_depth: u32, capacity: u32) -> Result<()> {
        let rid = match self.buckets.get(&bucket) {
            Some(entry) => {
                self.scan.move_to(entry.rid)?;
                entry.rid
            }
            None => {
                self.scan.insert()?;
                self.scan.set_int(BUCKET_FIELD, bucket as i32)?;
                self.scan.record_id()?
            }
        };
        self.scan.set_int(DEPTH_FIELD, local_depth as i32)?;
        self.scan.set_int(CAPACITY_FIELD, capacity as i32)?;
        self.buckets.insert(bucket, Entry { local_depth, rid });
        Ok(())
    }

    /// Ids of all registered buckets, ascending.
    pub fn bucket_ids(&self) -> Vec<u32> {
        self.buckets.keys().copied().collect()
    }

    /// Number of registered buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn close(&mut self) {
        self.scan.close();
    }
}
