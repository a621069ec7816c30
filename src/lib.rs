//! # ehash - A Persistent Extendable Hash Index
//!
//! ehash is the indexing layer of a small relational storage engine. Its core
//! is an extendable hash index that grows one bucket split at a time, doubling
//! its directory only when needed, and never rehashes the whole data set.
//!
//! ## Architecture
//!
//! The crate consists of several components:
//!
//! - **Storage**: named tables of fixed-size slotted pages, typed records and
//!   the `TableScan` cursor
//! - **Transactions**: private page write sets, optimistic serializable commits
//! - **Commit log**: page after-images logged before table files are written,
//!   replayed after a crash
//! - **Page Cache**: LRU cache of committed pages
//! - **Extendable Hash Index**: directory, bucket catalog and bucket tables,
//!   all stored as ordinary tables
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ehash::index::Index;
//! use ehash::{Database, IndexOptions, Options, RecordId, Value};
//!
//! # fn main() -> Result<(), ehash::Error> {
//! // Open or create a database
//! let db = Database::open("./data", Options::default())?;
//!
//! // Index a few records inside one transaction
//! let tx = db.begin();
//! let mut index = db.open_index(&tx, "student_id", IndexOptions::default())?;
//! index.insert(&Value::Int(42), RecordId::new(0, 3))?;
//! index.insert(&Value::Int(7), RecordId::new(1, 0))?;
//!
//! // Equality lookup
//! index.position(&Value::Int(42))?;
//! while index.advance()? {
//!     println!("Found: {}", index.current_locator()?);
//! }
//!
//! index.close();
//! tx.commit()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod storage;
pub mod wal;

// Re-exports
pub use config::{IndexOptions, Options};
pub use error::{Error, Result};
pub use index::{ExtendableHashIndex, HashFunction, Index, IndexKind, IndexStats};
pub use storage::{FieldType, Layout, RecordId, Schema, TableScan, Transaction, Value};

use cache::CacheStats;
use std::path::Path;
use std::sync::Arc;
use storage::StorageEngine;

/// The main database handle.
///
/// Owns one database directory. All reads and writes happen inside a
/// [`Transaction`] obtained from [`Database::begin`].
///
/// # Thread Safety
///
/// `Database` can be shared across threads; each thread should run its own
/// transactions. A transaction that touches a page committed by another
/// transaction after it began fails with [`Error::TransactionConflict`],
/// either on the read or at commit, and should be retried.
pub struct Database {
    engine: Arc<StorageEngine>,
}

impl Database {
    /// Opens a database at the specified path with the given options.
    ///
    /// If the database does not exist, it will be created. If it exists,
    /// committed transactions left in the commit log are replayed first.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options are invalid
    /// - The path is invalid or inaccessible
    /// - Recovery fails due to corrupted data
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use ehash::{Database, Options};
    ///
    /// # fn main() -> Result<(), ehash::Error> {
    /// let db = Database::open("./my_database", Options::default().block_size(1024))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let engine = StorageEngine::open(path, options)?;
        Ok(Self { engine })
    }

    /// Starts a new transaction.
    pub fn begin(&self) -> Transaction {
        self.engine.begin()
    }

    /// Opens (creating on first use) an extendable hash index inside `tx`.
    pub fn open_index(
        &self,
        tx: &Transaction,
        name: &str,
        options: IndexOptions,
    ) -> Result<ExtendableHashIndex> {
        ExtendableHashIndex::open(tx, name, options)
    }

    /// Syncs every table file and empties the commit log.
    pub fn checkpoint(&self) -> Result<()> {
        self.engine.checkpoint()
    }

    /// Closes the database after a final checkpoint.
    pub fn close(&self) -> Result<()> {
        self.checkpoint()?;
        log::info!("Database closed successfully");
        Ok(())
    }

    /// Page cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.engine.cache_stats()
    }

    /// Names of every table with committed data.
    pub fn tables(&self) -> Result<Vec<String>> {
        self.engine.tables()
    }

    /// Database directory.
    pub fn path(&self) -> &Path {
        self.engine.path()
    }

    /// Options the database was opened with.
    pub fn options(&self) -> &Options {
        self.engine.options()
    }
}
