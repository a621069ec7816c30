//! Extendable hash index.
//!
//! A key is placed by the low `global_depth` bits of its hash: they select a
//! directory slot, and the slot names the bucket that holds the key. Several
//! slots may share a bucket; a bucket of local depth `d` is referenced by
//! exactly the `2^(global_depth - d)` slots whose low `d` bits equal its id.
//!
//! When a bucket overflows it is split along hash bit `d` into itself and the
//! sibling `id | 1 << d`, and the directory doubles first if `d` already
//! equals the global depth. Buckets are never merged.
//!
//! All state lives in tables accessed through the index's transaction, so a
//! split or doubling is undone together with everything else if the
//! transaction rolls back.

use super::bucket::{bucket_layout, Bucket};
use super::catalog::Catalog;
use super::directory::{header_table, Directory, Header};
use super::hash::{low_bits, HashFunction};
use super::{validate_index_name, Index};
use crate::config::IndexOptions;
use crate::error::{Error, Result};
use crate::storage::{FieldType, Layout, RecordId, Transaction, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shape of an index at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of hash bits used by the directory
    pub global_depth: u32,
    /// Number of directory slots
    pub directory_size: u64,
    /// Number of buckets
    pub bucket_count: usize,
    /// Number of entries over all buckets
    pub entry_count: usize,
}

struct Search {
    key: Value,
    bucket: Bucket,
    /// True right after `advance` returned true
    on_match: bool,
}

/// Extendable hash index bound to one transaction.
///
/// The handle performs no locking; use one handle per transaction.
pub struct ExtendableHashIndex {
    name: String,
    tx: Transaction,
    max_depth: u32,
    directory: Directory,
    catalog: Catalog,
    layout: Arc<Layout>,
    search: Option<Search>,
    closed: bool,
}

impl ExtendableHashIndex {
    /// Open the index `name`, creating it on first use.
    ///
    /// A new index starts with global depth 1 and buckets 0 and 1. When the
    /// index already exists, its stored capacity, hash function and key type
    /// take precedence over `options`.
    pub fn open(tx: &Transaction, name: &str, options: IndexOptions) -> Result<Self> {
        validate_index_name(name)?;
        options.validate()?;

        let (directory, catalog) = if tx.table_exists(&header_table(name))? {
            let directory = Directory::open(tx, name)?;
            warn_on_override(name, directory.header(), &options);
            let catalog = Catalog::open(tx, name)?;
            log::debug!(
                "Opened index {} (global depth {}, {} buckets)",
                name,
                directory.global_depth(),
                catalog.len()
            );
            (directory, catalog)
        } else {
            let header = Header {
                global_depth: 1,
                bucket_capacity: options.bucket_capacity,
                hash_function: options.hash_function,
                key_type: options.key_type,
            };
            let directory = Directory::create(tx, name, header)?;
            let mut catalog = Catalog::open(tx, name)?;
            for bucket in 0..2 {
                catalog.register(bucket, 1, options.bucket_capacity)?;
            }
            log::info!(
                "Created index {} (capacity {}, hash {}, key {:?})",
                name,
                options.bucket_capacity,
                options.hash_function,
                options.key_type
            );
            (directory, catalog)
        };

        let layout = Arc::new(bucket_layout(directory.header().key_type, tx.block_size())?);
        Ok(Self {
            name: name.to_string(),
            tx: tx.clone(),
            max_depth: options.max_depth,
            directory,
            catalog,
            layout,
            search: None,
            closed: false,
        })
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current global depth
    pub fn global_depth(&self) -> u32 {
        self.directory.global_depth()
    }

    /// Entries a bucket holds before it splits
    pub fn bucket_capacity(&self) -> u32 {
        self.directory.header().bucket_capacity
    }

    /// Hash function placing the keys
    pub fn hash_function(&self) -> HashFunction {
        self.directory.header().hash_function
    }

    /// Type of the indexed key
    pub fn key_type(&self) -> FieldType {
        self.directory.header().key_type
    }

    /// Number of buckets
    pub fn bucket_count(&self) -> usize {
        self.catalog.len()
    }

    /// Bucket the directory currently routes `key` to.
    pub fn bucket_of(&mut self, key: &Value) -> Result<u32> {
        self.check_open()?;
        let slot = self.directory.slot_for(key);
        self.directory.bucket_for(slot)
    }

    /// Cost in block accesses of one lookup over an index of `num_blocks`
    /// blocks spread over `bucket_count` buckets.
    pub fn search_cost(num_blocks: u64, bucket_count: u64) -> u64 {
        (num_blocks / bucket_count.max(1)).max(1)
    }

    /// [`ExtendableHashIndex::search_cost`] with the live bucket count of
    /// this index. Entries per block do not change the estimate.
    pub fn estimated_search_cost(&self, num_blocks: u64, _records_per_block: u64) -> u64 {
        Self::search_cost(num_blocks, self.catalog.len() as u64)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::invalid_state(format!("index {} is closed", self.name)))
        } else {
            Ok(())
        }
    }

    fn open_bucket(&self, id: u32) -> Result<Bucket> {
        Bucket::open(&self.tx, &self.name, id, Arc::clone(&self.layout))
    }

    fn end_search(&mut self) {
        if let Some(mut search) = self.search.take() {
            search.bucket.close();
        }
    }

    fn search_mut(&mut self) -> Result<&mut Search> {
        let name = &self.name;
        self.search
            .as_mut()
            .ok_or_else(|| Error::invalid_state(format!("index {} has no active search", name)))
    }

    fn degenerate(&self, bucket: u32, local_depth: u32) -> Error {
        Error::DegenerateKeyDistribution {
            index: self.name.clone(),
            bucket,
            local_depth,
        }
    }

    /// Split an overflowing bucket, doubling the directory if needed.
    fn split(&mut self, bucket_id: u32, key: &Value) -> Result<()> {
        self.end_search();

        let depth = self.catalog.depth_of(bucket_id)?;
        let hash_fn = self.hash_function();
        let capacity = self.bucket_capacity();
        let mut bucket = self.open_bucket(bucket_id)?;

        // Keys sharing their low max_depth bits can never be told apart
        let key_bits = low_bits(hash_fn.hash(key), self.max_depth);
        let entries = bucket.entries()?;
        let separable = entries
            .iter()
            .any(|(k, _)| low_bits(hash_fn.hash(k), self.max_depth) != key_bits);
        if !separable || depth >= self.max_depth {
            bucket.close();
            return Err(self.degenerate(bucket_id, depth));
        }

        let global_depth = self.directory.global_depth();
        if depth > global_depth || u64::from(bucket_id) >> depth != 0 {
            return Err(Error::corruption(format!(
                "index {}: bucket {} has local depth {} (global depth {})",
                self.name, bucket_id, depth, global_depth
            )));
        }
        if depth == global_depth {
            self.directory.double()?;
        }

        let new_depth = depth + 1;
        let sibling = bucket_id | (1 << depth);
        if self.catalog.depth_of(sibling).is_ok() {
            return Err(Error::corruption(format!(
                "index {}: split sibling {} of bucket {} already exists",
                self.name, sibling, bucket_id
            )));
        }
        self.catalog.register(sibling, new_depth, capacity)?;
        self.catalog.register(bucket_id, new_depth, capacity)?;

        let mut sibling_bucket = self.open_bucket(sibling)?;
        let mut moved = 0;
        bucket.before_first();
        while bucket.next()? {
            let k = bucket.key()?;
            if low_bits(hash_fn.hash(&k), new_depth) == sibling {
                let rid = bucket.locator()?;
                sibling_bucket.insert(&k, rid)?;
                bucket.delete()?;
                moved += 1;
                log::trace!("Index {}: moved {} {} to bucket {}", self.name, k, rid, sibling);
            }
        }
        bucket.close();
        sibling_bucket.close();

        // Slots agreeing with the sibling in the low new_depth bits
        let size = self.directory.size();
        let mut slot = u64::from(sibling);
        while slot < size {
            let current = self.directory.bucket_for(slot as u32)?;
            if current != bucket_id {
                return Err(Error::corruption(format!(
                    "index {}: slot {} points at bucket {} instead of {}",
                    self.name, slot, current, bucket_id
                )));
            }
            self.directory.repoint(slot as u32, sibling)?;
            slot += 1u64 << new_depth;
        }

        log::debug!(
            "Index {}: split bucket {} into {} at local depth {}, moved {} of {} entries",
            self.name,
            bucket_id,
            sibling,
            new_depth,
            moved,
            entries.len()
        );
        Ok(())
    }

    /// Check every structural invariant of the index.
    ///
    /// Verifies that the directory is complete, that each slot points at a
    /// registered bucket agreeing with it in the bucket's low local-depth
    /// bits, that each bucket is referenced by exactly
    /// `2^(global_depth - local_depth)` slots, and that every entry hashes to
    /// the bucket holding it.
    pub fn verify_integrity(&mut self) -> Result<()> {
        self.check_open()?;
        let global_depth = self.directory.global_depth();
        let pointers = self.directory.pointers()?;

        let mut references: BTreeMap<u32, u64> = BTreeMap::new();
        for (slot, &bucket) in pointers.iter().enumerate() {
            let depth = self.catalog.depth_of(bucket)?;
            if depth == 0 || depth > global_depth {
                return Err(Error::corruption(format!(
                    "index {}: bucket {} has local depth {} (global depth {})",
                    self.name, bucket, depth, global_depth
                )));
            }
            if low_bits(slot as u32, depth) != bucket {
                return Err(Error::corruption(format!(
                    "index {}: slot {} points at bucket {} which differs in the low {} bits",
                    self.name, slot, bucket, depth
                )));
            }
            *references.entry(bucket).or_default() += 1;
        }

        let hash_fn = self.hash_function();
        let capacity = self.bucket_capacity() as usize;
        for bucket_id in self.catalog.bucket_ids() {
            let depth = self.catalog.depth_of(bucket_id)?;
            let expected = 1u64 << (global_depth - depth.min(global_depth));
            let actual = references.get(&bucket_id).copied().unwrap_or(0);
            if actual != expected {
                return Err(Error::corruption(format!(
                    "index {}: bucket {} at local depth {} is referenced by {} slots, expected {}",
                    self.name, bucket_id, depth, actual, expected
                )));
            }

            let mut bucket = self.open_bucket(bucket_id)?;
            let entries = bucket.entries()?;
            bucket.close();
            if entries.len() > capacity {
                return Err(Error::corruption(format!(
                    "index {}: bucket {} holds {} entries, capacity {}",
                    self.name,
                    bucket_id,
                    entries.len(),
                    capacity
                )));
            }
            if let Some((key, _)) = entries
                .iter()
                .find(|(key, _)| low_bits(hash_fn.hash(key), depth) != bucket_id)
            {
                return Err(Error::corruption(format!(
                    "index {}: key {} does not belong in bucket {}",
                    self.name, key, bucket_id
                )));
            }
        }
        Ok(())
    }

    /// Collect index statistics.
    pub fn stats(&mut self) -> Result<IndexStats> {
        self.check_open()?;
        let mut entry_count = 0;
        for bucket_id in self.catalog.bucket_ids() {
            let mut bucket = self.open_bucket(bucket_id)?;
            entry_count += bucket.count()?;
            bucket.close();
        }
        Ok(IndexStats {
            global_depth: self.directory.global_depth(),
            directory_size: self.directory.size(),
            bucket_count: self.catalog.len(),
            entry_count,
        })
    }
}

fn warn_on_override(name: &str, stored: &Header, options: &IndexOptions) {
    if stored.bucket_capacity != options.bucket_capacity {
        log::warn!(
            "Index {}: using stored bucket capacity {} instead of {}",
            name,
            stored.bucket_capacity,
            options.bucket_capacity
        );
    }
    if stored.hash_function != options.hash_function {
        log::warn!(
            "Index {}: using stored hash function {} instead of {}",
            name,
            stored.hash_function,
            options.hash_function
        );
    }
    if stored.key_type != options.key_type {
        log::warn!(
            "Index {}: using stored key type {:?} instead of {:?}",
            name,
            stored.key_type,
            options.key_type
        );
    }
}

impl Index for ExtendableHashIndex {
    fn position(&mut self, key: &Value) -> Result<()> {
        self.check_open()?;
        self.end_search();

        let bucket_id = self.bucket_of(key)?;
        self.catalog.depth_of(bucket_id)?;

        let bucket = self.open_bucket(bucket_id)?;
        self.search = Some(Search {
            key: key.clone(),
            bucket,
            on_match: false,
        });
        Ok(())
    }

    fn advance(&mut self) -> Result<bool> {
        self.check_open()?;
        let search = self.search_mut()?;
        search.on_match = false;
        while search.bucket.next()? {
            if search.bucket.key()? == search.key {
                search.on_match = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn current_locator(&self) -> Result<RecordId> {
        self.check_open()?;
        match &self.search {
            Some(search) if search.on_match => search.bucket.locator(),
            _ => Err(Error::invalid_state(format!(
                "index {} is not positioned on a matching entry",
                self.name
            ))),
        }
    }

    fn insert(&mut self, key: &Value, rid: RecordId) -> Result<()> {
        self.check_open()?;
        key.check_type(self.key_type())?;
        let capacity = self.bucket_capacity() as usize;

        let mut last = (0, 0);
        for _ in 0..=self.max_depth {
            self.position(key)?;
            let search = self.search_mut()?;
            let bucket_id = search.bucket.id();
            if search.bucket.count()? < capacity {
                search.bucket.insert(key, rid)?;
                search.bucket.before_first();
                log::trace!("Index {}: inserted {} {} into bucket {}", self.name, key, rid, bucket_id);
                return Ok(());
            }
            last = (bucket_id, self.catalog.depth_of(bucket_id)?);
            self.split(bucket_id, key)?;
        }
        Err(self.degenerate(last.0, last.1))
    }

    fn delete(&mut self, key: &Value, rid: RecordId) -> Result<bool> {
        self.position(key)?;
        while self.advance()? {
            if self.current_locator()? == rid {
                let search = self.search_mut()?;
                search.bucket.delete()?;
                search.on_match = false;
                log::trace!("Index {}: deleted {} {}", self.name, key, rid);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.end_search();
        self.directory.close();
        self.catalog.close();
        self.closed = true;
    }
}
