//! Configuration options for the storage engine and the extendable hash index.

use crate::index::HashFunction;
use crate::storage::FieldType;

/// Smallest block size accepted by [`Options::validate`].
pub const MIN_BLOCK_SIZE: usize = 128;

/// Largest block size accepted by [`Options::validate`].
pub const MAX_BLOCK_SIZE: usize = 1024 * 1024;

/// Width of the index hash in bits; bounds every local and global depth.
pub const HASH_BITS: u32 = 32;

/// Configuration options for opening a database.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create the database directory if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Error if the database directory already exists.
    /// Default: false
    pub error_if_exists: bool,

    /// Size of every table page (in bytes).
    /// Default: 4KB
    pub block_size: usize,

    /// Page cache size (in bytes).
    /// Set to 0 to disable caching.
    /// Default: 8MB
    pub page_cache_size: usize,

    /// Sync the commit log to disk before a commit returns.
    /// Default: true
    pub sync_on_commit: bool,

    /// Commit log size that triggers a checkpoint after a commit (in bytes).
    /// Default: 4MB
    pub wal_checkpoint_size: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            block_size: 4 * 1024,             // 4KB
            page_cache_size: 8 * 1024 * 1024, // 8MB
            sync_on_commit: true,
            wal_checkpoint_size: 4 * 1024 * 1024, // 4MB
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether opening an existing directory is an error.
    pub fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets the page size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the page cache size.
    pub fn page_cache_size(mut self, size: usize) -> Self {
        self.page_cache_size = size;
        self
    }

    /// Enables or disables syncing the commit log on every commit.
    pub fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the commit log checkpoint threshold.
    pub fn wal_checkpoint_size(mut self, size: u64) -> Self {
        self.wal_checkpoint_size = size;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(crate::Error::invalid_argument(format!(
                "block_size must be >= {}",
                MIN_BLOCK_SIZE
            )));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(crate::Error::invalid_argument(format!(
                "block_size must be <= {}",
                MAX_BLOCK_SIZE
            )));
        }
        if self.wal_checkpoint_size == 0 {
            return Err(crate::Error::invalid_argument("wal_checkpoint_size must be > 0"));
        }
        Ok(())
    }
}

/// Options applied when an extendable hash index is created.
///
/// Capacity and hash function are persisted in the index header the first
/// time the index is opened; later opens use the persisted values.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Maximum number of entries per bucket before it splits.
    /// Default: 30
    pub bucket_capacity: u32,

    /// Upper bound for global and local depth.
    /// Default: 20 (a directory of at most 2^20 slots)
    pub max_depth: u32,

    /// Hash function used to place keys.
    /// Default: HashFunction::Crc32
    pub hash_function: HashFunction,

    /// Type of the indexed key.
    /// Default: FieldType::Int
    pub key_type: FieldType,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            bucket_capacity: 30,
            max_depth: 20,
            hash_function: HashFunction::Crc32,
            key_type: FieldType::Int,
        }
    }
}

impl IndexOptions {
    /// Creates a new IndexOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bucket capacity.
    pub fn bucket_capacity(mut self, capacity: u32) -> Self {
        self.bucket_capacity = capacity;
        self
    }

    /// Sets the maximum depth.
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the hash function.
    pub fn hash_function(mut self, hash_function: HashFunction) -> Self {
        self.hash_function = hash_function;
        self
    }

    /// Sets the key type.
    pub fn key_type(mut self, key_type: FieldType) -> Self {
        self.key_type = key_type;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.bucket_capacity == 0 {
            return Err(crate::Error::invalid_argument("bucket_capacity must be > 0"));
        }
        if self.max_depth == 0 || self.max_depth > HASH_BITS {
            return Err(crate::Error::invalid_argument(format!(
                "max_depth must be between 1 and {}",
                HASH_BITS
            )));
        }
        if let FieldType::Varchar(0) = self.key_type {
            return Err(crate::Error::invalid_argument("varchar key length must be > 0"));
        }
        Ok(())
    }
}
