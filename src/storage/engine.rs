//! The storage engine: table files, page cache and the commit log.

use super::file::{parse_table_filename, table_filename, TableFile};
use super::page;
use super::transaction::Transaction;
use crate::cache::{CacheStats, PageCache, PageId};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::wal::{self, PageImage, WAL};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pseudo block number whose version tracks the length of a table
const TABLE_LENGTH_BLOCK: u32 = u32::MAX;

/// Key under which changes to a table's length are versioned.
pub(crate) fn table_length_id(table: &str) -> PageId {
    PageId::new(table, TABLE_LENGTH_BLOCK)
}

/// A page written by a committing transaction.
pub(crate) struct PageWrite {
    pub id: PageId,
    pub data: Vec<u8>,
}

/// Everything a transaction hands to the engine at commit.
pub(crate) struct CommitRequest {
    pub txn_id: u64,
    /// Last commit visible when the transaction began
    pub start_seq: u64,
    /// Pages read from committed state, including table lengths
    pub reads: Vec<PageId>,
    pub writes: Vec<PageWrite>,
    /// Tables the transaction appended blocks to
    pub grown: Vec<String>,
}

/// Shared state behind every transaction of one database directory.
pub struct StorageEngine {
    dir: PathBuf,
    options: Options,
    files: RwLock<HashMap<String, Arc<TableFile>>>,
    cache: PageCache,
    /// Also serializes commits
    wal: Mutex<WAL>,
    /// Commit sequence number that last changed each page
    page_versions: Mutex<HashMap<PageId, u64>>,
    last_commit: AtomicU64,
    next_txn_id: AtomicU64,
}

/// Longest accepted table name
pub const MAX_TABLE_NAME_LEN: usize = 128;

/// Checks that a table name maps to a safe, unique file name.
pub fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table.len() <= MAX_TABLE_NAME_LEN
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!("invalid table name {:?}", table)))
    }
}

impl StorageEngine {
    /// Open the database directory, replaying committed transactions left in
    /// the commit log by an earlier crash.
    pub fn open<P: AsRef<Path>>(dir: P, options: Options) -> Result<Arc<Self>> {
        options.validate()?;
        let dir = dir.as_ref().to_path_buf();

        if !dir.exists() {
            if options.create_if_missing {
                std::fs::create_dir_all(&dir)?;
            } else {
                return Err(Error::NotFound(format!("Database directory does not exist: {:?}", dir)));
            }
        } else if options.error_if_exists {
            return Err(Error::AlreadyExists(format!("Database already exists: {:?}", dir)));
        }

        let wal_path = dir.join(wal::WAL_FILENAME);
        let committed = if wal_path.exists() {
            WAL::recover(&wal_path)?
        } else {
            Vec::new()
        };

        let engine = StorageEngine {
            cache: PageCache::new(options.page_cache_size),
            files: RwLock::new(HashMap::new()),
            wal: Mutex::new(WAL::open(&wal_path)?),
            page_versions: Mutex::new(HashMap::new()),
            last_commit: AtomicU64::new(0),
            next_txn_id: AtomicU64::new(1),
            dir,
            options,
        };

        if !committed.is_empty() {
            let pages: usize = committed.iter().map(|(_, images)| images.len()).sum();
            log::info!(
                "Replaying {} committed transaction(s), {} page image(s) from {:?}",
                committed.len(),
                pages,
                wal_path
            );
            for (_, images) in &committed {
                for image in images {
                    engine.create_file(&image.table)?.write_block(image.block, &image.data)?;
                }
            }
        }
        // Uncommitted images and torn tails go before new commits are appended
        if engine.wal.lock().size() > 0 {
            engine.checkpoint()?;
        }

        log::info!("Opened database at {:?}", engine.dir);
        Ok(Arc::new(engine))
    }

    /// Start a new transaction.
    pub fn begin(self: &Arc<Self>) -> Transaction {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let start_seq = self.last_commit.load(Ordering::SeqCst);
        Transaction::new(id, start_seq, Arc::clone(self))
    }

    /// Get the database directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Get the options the engine was opened with
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Size of every page
    pub fn block_size(&self) -> usize {
        self.options.block_size
    }

    /// Page cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Names of all tables with at least one committed block.
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut tables = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str().and_then(parse_table_filename) {
                tables.push(name.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }

    fn file(&self, table: &str) -> Result<Option<Arc<TableFile>>> {
        if let Some(file) = self.files.read().get(table) {
            return Ok(Some(Arc::clone(file)));
        }

        let path = self.dir.join(table_filename(table));
        if !path.exists() {
            return Ok(None);
        }
        self.create_file(table).map(Some)
    }

    fn create_file(&self, table: &str) -> Result<Arc<TableFile>> {
        let mut files = self.files.write();
        if let Some(file) = files.get(table) {
            return Ok(Arc::clone(file));
        }
        let file = Arc::new(TableFile::open(
            self.dir.join(table_filename(table)),
            self.options.block_size,
        )?);
        files.insert(table.to_string(), Arc::clone(&file));
        Ok(file)
    }

    /// Number of committed blocks of a table (0 if it has never been written).
    pub(crate) fn committed_block_count(&self, table: &str) -> Result<u32> {
        match self.file(table)? {
            Some(file) => file.block_count(),
            None => Ok(0),
        }
    }

    /// Read the committed image of a page, through the page cache.
    ///
    /// A page read from disk is cached only if no commit changed it while it
    /// was being read; commits publish under the same lock.
    pub(crate) fn read_committed(&self, id: &PageId) -> Result<Bytes> {
        if let Some(data) = self.cache.get(id) {
            return Ok(data);
        }

        let version = self.page_version(id);
        let file = self
            .file(&id.table)?
            .ok_or_else(|| Error::not_found(format!("table {} has no blocks", id.table)))?;
        if id.block >= file.block_count()? {
            return Err(Error::not_found(format!("page {} is past the end of its table", id)));
        }

        let data = file.read_block(id.block)?;
        let never_written = data.iter().all(|&b| b == 0);
        if !never_written {
            if let Err((expected, actual)) = page::verify_checksum(&data) {
                return Err(Error::ChecksumMismatch {
                    table: id.table.clone(),
                    block: id.block,
                    expected,
                    actual,
                });
            }
        }

        let data = Bytes::from(data);
        let versions = self.page_versions.lock();
        if versions.get(id).copied().unwrap_or(0) == version {
            self.cache.insert(id.clone(), data.clone());
        }
        Ok(data)
    }

    fn page_version(&self, id: &PageId) -> u64 {
        self.page_versions.lock().get(id).copied().unwrap_or(0)
    }

    /// Fails with `TransactionConflict` if a commit after `start_seq` changed the page.
    ///
    /// Callers read the page first and check afterwards, so a commit racing
    /// with the read is always detected.
    pub(crate) fn check_unchanged(&self, txn_id: u64, start_seq: u64, id: &PageId) -> Result<()> {
        if self.page_version(id) > start_seq {
            return Err(conflict(txn_id, id));
        }
        Ok(())
    }

    /// Make a transaction's page writes durable and visible.
    ///
    /// Every page the transaction read or wrote must be unchanged since it
    /// began, otherwise nothing is applied.
    pub(crate) fn commit(&self, request: CommitRequest) -> Result<()> {
        let CommitRequest {
            txn_id,
            start_seq,
            reads,
            mut writes,
            grown,
        } = request;
        // Reads were validated as they happened
        if writes.is_empty() {
            return Ok(());
        }

        let mut wal = self.wal.lock();
        let grown: Vec<PageId> = grown.iter().map(|table| table_length_id(table)).collect();
        {
            let versions = self.page_versions.lock();
            let touched = reads
                .iter()
                .chain(writes.iter().map(|write| &write.id))
                .chain(grown.iter());
            for id in touched {
                if versions.get(id).copied().unwrap_or(0) > start_seq {
                    return Err(conflict(txn_id, id));
                }
            }
        }

        writes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut images = Vec::with_capacity(writes.len());
        for write in writes.iter_mut() {
            page::stamp_checksum(&mut write.data);
            images.push(PageImage {
                table: write.id.table.clone(),
                block: write.id.block,
                data: write.data.clone(),
            });
        }
        wal.log_commit(txn_id, &images, self.options.sync_on_commit)?;

        let seq = self.last_commit.load(Ordering::SeqCst) + 1;
        {
            let mut versions = self.page_versions.lock();
            for write in writes {
                self.create_file(&write.id.table)?
                    .write_block(write.id.block, &write.data)?;
                versions.insert(write.id.clone(), seq);
                self.cache.insert(write.id, Bytes::from(write.data));
            }
            for id in grown {
                versions.insert(id, seq);
            }
        }
        self.last_commit.store(seq, Ordering::SeqCst);
        log::debug!("Committed transaction {} ({} pages)", txn_id, images.len());

        if wal.size() >= self.options.wal_checkpoint_size {
            self.checkpoint_locked(&mut wal)?;
        }
        Ok(())
    }

    /// Sync every table file and empty the commit log.
    pub fn checkpoint(&self) -> Result<()> {
        let mut wal = self.wal.lock();
        self.checkpoint_locked(&mut wal)
    }

    fn checkpoint_locked(&self, wal: &mut WAL) -> Result<()> {
        let files: Vec<Arc<TableFile>> = self.files.read().values().cloned().collect();
        for file in &files {
            file.sync()?;
        }
        wal.reset()?;
        log::info!("Checkpoint complete: {} table file(s) synced", files.len());
        Ok(())
    }
}

fn conflict(txn_id: u64, id: &PageId) -> Error {
    Error::TransactionConflict {
        txn: txn_id,
        table: id.table.clone(),
        block: id.block,
    }
}
