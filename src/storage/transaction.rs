//! Transactions over the storage engine.
//!
//! A transaction keeps a private copy of every page it modifies. Nothing is
//! visible to other transactions until [`Transaction::commit`], which hands
//! the copies to the engine in one commit-log entry; [`Transaction::rollback`]
//! simply drops them. Reads see the transaction's own writes first and the
//! latest committed state otherwise.
//!
//! Transactions are optimistic. Every page a transaction reads or writes, and
//! the length of every table it scans, must be unchanged since it began:
//! reading a page another transaction has committed since fails right away,
//! and a commit whose reads or writes were overtaken by a later commit fails
//! as a whole. Both surface as [`Error::TransactionConflict`]; the caller
//! retries with a new transaction.

use super::engine::{table_length_id, CommitRequest, PageWrite, StorageEngine};
use super::page;
use crate::cache::PageId;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Committed,
    RolledBack,
}

struct State {
    status: Status,
    /// Pages read from committed state
    reads: HashSet<PageId>,
    writes: HashMap<PageId, Vec<u8>>,
    /// Block counts of tables this transaction appended to
    block_counts: HashMap<String, u32>,
}

struct Inner {
    id: u64,
    start_seq: u64,
    engine: Arc<StorageEngine>,
    state: Mutex<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.status == Status::Active && !state.writes.is_empty() {
            log::debug!(
                "Transaction {} dropped without commit, discarding {} page(s)",
                self.id,
                state.writes.len()
            );
        }
    }
}

/// Handle to one transaction.
///
/// Cloning the handle is cheap; every cursor opened inside the transaction
/// holds a clone. The transaction itself performs no locking beyond what
/// keeps its own bookkeeping consistent.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

impl Transaction {
    pub(crate) fn new(id: u64, start_seq: u64, engine: Arc<StorageEngine>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                start_seq,
                engine,
                state: Mutex::new(State {
                    status: Status::Active,
                    reads: HashSet::new(),
                    writes: HashMap::new(),
                    block_counts: HashMap::new(),
                }),
            }),
        }
    }

    /// Transaction id
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Page size of the underlying engine
    pub fn block_size(&self) -> usize {
        self.inner.engine.block_size()
    }

    /// Returns true until the transaction commits or rolls back.
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().status == Status::Active
    }

    fn check_active(&self, state: &State) -> Result<()> {
        match state.status {
            Status::Active => Ok(()),
            status => Err(Error::invalid_state(format!(
                "transaction {} is no longer active ({:?})",
                self.inner.id, status
            ))),
        }
    }

    /// Read a committed page and record it in the read set.
    fn read_committed(&self, id: &PageId) -> Result<bytes::Bytes> {
        let engine = &self.inner.engine;
        let data = engine.read_committed(id)?;
        engine.check_unchanged(self.inner.id, self.inner.start_seq, id)?;
        self.inner.state.lock().reads.insert(id.clone());
        Ok(data)
    }

    /// Number of blocks of a table as seen by this transaction.
    pub fn block_count(&self, table: &str) -> Result<u32> {
        let local = {
            let state = self.inner.state.lock();
            self.check_active(&state)?;
            state.block_counts.get(table).copied()
        };
        if let Some(count) = local {
            return Ok(count);
        }

        let engine = &self.inner.engine;
        let length_id = table_length_id(table);
        let committed = engine.committed_block_count(table)?;
        engine.check_unchanged(self.inner.id, self.inner.start_seq, &length_id)?;
        self.inner.state.lock().reads.insert(length_id);
        Ok(committed)
    }

    /// Returns true if the table has at least one block.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.block_count(table)? > 0)
    }

    /// Run `f` over the current image of a page.
    pub fn with_block<R>(&self, table: &str, block: u32, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let id = PageId::new(table, block);
        {
            let state = self.inner.state.lock();
            self.check_active(&state)?;
            if let Some(data) = state.writes.get(&id) {
                return Ok(f(data));
            }
        }
        let data = self.read_committed(&id)?;
        Ok(f(&data))
    }

    /// Run `f` over a private, writable copy of a page.
    pub fn modify_block<R>(
        &self,
        table: &str,
        block: u32,
        f: impl FnOnce(&mut [u8]) -> Result<R>,
    ) -> Result<R> {
        let id = PageId::new(table, block);
        let dirty = {
            let state = self.inner.state.lock();
            self.check_active(&state)?;
            state.writes.contains_key(&id)
        };
        if !dirty {
            let data = self.read_committed(&id)?.to_vec();
            self.inner.state.lock().writes.insert(id.clone(), data);
        }

        let mut state = self.inner.state.lock();
        match state.writes.get_mut(&id) {
            Some(data) => f(data),
            None => Err(Error::internal(format!("page {} vanished from the write set", id))),
        }
    }

    /// Append an empty block to a table, returning its block number.
    pub fn append_block(&self, table: &str) -> Result<u32> {
        let block = self.block_count(table)?;

        let mut state = self.inner.state.lock();
        self.check_active(&state)?;
        state
            .writes
            .insert(PageId::new(table, block), page::empty_page(self.block_size()));
        state.block_counts.insert(table.to_string(), block + 1);
        log::trace!("Transaction {} appended block {} to {}", self.inner.id, block, table);
        Ok(block)
    }

    /// Number of pages this transaction has modified.
    pub fn dirty_pages(&self) -> usize {
        self.inner.state.lock().writes.len()
    }

    /// Commit all writes atomically.
    ///
    /// On failure (including [`Error::TransactionConflict`]) the transaction
    /// is rolled back.
    pub fn commit(&self) -> Result<()> {
        let request = {
            let mut state = self.inner.state.lock();
            self.check_active(&state)?;
            CommitRequest {
                txn_id: self.inner.id,
                start_seq: self.inner.start_seq,
                reads: state.reads.drain().collect(),
                writes: state
                    .writes
                    .drain()
                    .map(|(id, data)| PageWrite { id, data })
                    .collect(),
                grown: state.block_counts.drain().map(|(table, _)| table).collect(),
            }
        };

        let result = self.inner.engine.commit(request);
        self.inner.state.lock().status = match result {
            Ok(()) => Status::Committed,
            Err(_) => Status::RolledBack,
        };
        result
    }

    /// Discard all writes. Rolling back a finished transaction is a no-op.
    pub fn rollback(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.status != Status::Active {
            return Ok(());
        }
        log::debug!(
            "Rolling back transaction {} ({} pages)",
            self.inner.id,
            state.writes.len()
        );
        state.reads.clear();
        state.writes.clear();
        state.block_counts.clear();
        state.status = Status::RolledBack;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Arc<StorageEngine> {
        StorageEngine::open(dir.path(), Options::default().block_size(256).sync_on_commit(false))
            .unwrap()
    }

    #[test]
    fn test_writes_are_private_until_commit() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let tx1 = engine.begin();
        let block = tx1.append_block("t").unwrap();
        tx1.modify_block("t", block, |data| {
            data[8] = 9;
            Ok(())
        })
        .unwrap();

        let tx2 = engine.begin();
        assert_eq!(tx2.block_count("t").unwrap(), 0);
        assert_eq!(tx1.with_block("t", 0, |data| data[8]).unwrap(), 9);
        tx1.commit().unwrap();

        let tx3 = engine.begin();
        assert_eq!(tx3.block_count("t").unwrap(), 1);
        assert_eq!(tx3.with_block("t", 0, |data| data[8]).unwrap(), 9);
    }

    #[test]
    fn test_reading_newer_commit_conflicts() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let setup = engine.begin();
        setup.append_block("t").unwrap();
        setup.commit().unwrap();

        let reader = engine.begin();
        let writer = engine.begin();
        writer
            .modify_block("t", 0, |data| {
                data[8] = 1;
                Ok(())
            })
            .unwrap();
        writer.commit().unwrap();

        let result = reader.with_block("t", 0, |data| data[8]);
        assert!(matches!(result, Err(Error::TransactionConflict { .. })));
        // A table whose length did not change is still readable
        assert_eq!(reader.block_count("t").unwrap(), 1);
    }

    #[test]
    fn test_read_only_commit_succeeds() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let setup = engine.begin();
        setup.append_block("t").unwrap();
        setup.commit().unwrap();

        let reader = engine.begin();
        reader.with_block("t", 0, |_| ()).unwrap();
        let writer = engine.begin();
        writer.modify_block("t", 0, |_| Ok(())).unwrap();
        writer.commit().unwrap();

        reader.commit().unwrap();
    }

    #[test]
    fn test_write_skew_is_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let setup = engine.begin();
        setup.append_block("a").unwrap();
        setup.append_block("b").unwrap();
        setup.commit().unwrap();

        // tx1 reads a and writes b, tx2 writes a
        let tx1 = engine.begin();
        let tx2 = engine.begin();
        tx1.with_block("a", 0, |_| ()).unwrap();
        tx1.modify_block("b", 0, |_| Ok(())).unwrap();
        tx2.modify_block("a", 0, |_| Ok(())).unwrap();

        tx2.commit().unwrap();
        assert!(matches!(tx1.commit(), Err(Error::TransactionConflict { .. })));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let tx = engine.begin();
        tx.append_block("t").unwrap();
        assert_eq!(tx.dirty_pages(), 1);
        tx.rollback().unwrap();
        assert!(!tx.is_active());
        assert!(tx.block_count("t").is_err());

        let tx = engine.begin();
        assert!(!tx.table_exists("t").unwrap());
    }

    #[test]
    fn test_finished_transaction_rejects_work() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let tx = engine.begin();
        tx.commit().unwrap();
        assert!(matches!(tx.append_block("t"), Err(Error::InvalidState(_))));
        assert!(tx.commit().is_err());
        assert!(tx.rollback().is_ok());
    }

    #[test]
    fn test_concurrent_append_conflicts() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);

        let tx1 = engine.begin();
        let tx2 = engine.begin();
        tx1.append_block("t").unwrap();
        tx2.append_block("t").unwrap();

        tx1.commit().unwrap();
        let result = tx2.commit();
        assert!(matches!(result, Err(Error::TransactionConflict { .. })));
        assert!(!tx2.is_active());
    }
}
