//! Commit log implementation.
//!
//! Every committing transaction appends the after-image of each page it
//! wrote, followed by a commit marker, before any table file is touched.
//! After a crash the log is replayed: page images of transactions whose
//! commit marker made it to disk are written again, everything else is
//! ignored. Replaying a page image twice is harmless.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ehash::wal::{PageImage, WAL};
//!
//! # fn main() -> Result<(), ehash::Error> {
//! let mut wal = WAL::open("commit.log")?;
//! let image = PageImage { table: "t".to_string(), block: 0, data: vec![0; 4096] };
//! wal.log_commit(1, &[image], true)?;
//!
//! for (txn_id, images) in WAL::recover("commit.log")? {
//!     println!("txn {} wrote {} pages", txn_id, images.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::WALReader;
pub use record::{LogRecord, PageImage, RecordKind};
pub use writer::WALWriter;

use crate::error::Result;
use std::collections::HashMap;
use std::path::Path;

/// File name of the commit log inside the database directory
pub const WAL_FILENAME: &str = "commit.log";

/// Commit log manager
pub struct WAL {
    writer: WALWriter,
}

impl WAL {
    /// Open or create a commit log file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let writer = WALWriter::new(path)?;
        Ok(Self { writer })
    }

    /// Append a transaction's page images and its commit marker.
    pub fn log_commit(&mut self, txn_id: u64, images: &[PageImage], sync: bool) -> Result<()> {
        for image in images {
            self.writer.append(&LogRecord::page_image(txn_id, image)?)?;
        }
        self.writer.append(&LogRecord::commit(txn_id))?;

        if sync {
            self.writer.sync()
        } else {
            self.writer.flush()
        }
    }

    /// Discard all records; callers must have made the table files durable first.
    pub fn reset(&mut self) -> Result<()> {
        self.writer.reset()
    }

    /// Get the current file size
    pub fn size(&self) -> u64 {
        self.writer.file_size()
    }

    /// Get the path to the log file
    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    /// Collect the page images of every committed transaction, in commit order.
    pub fn recover<P: AsRef<Path>>(path: P) -> Result<Vec<(u64, Vec<PageImage>)>> {
        let mut reader = WALReader::new(path)?;
        let records = reader.read_all()?;

        let mut pending: HashMap<u64, Vec<PageImage>> = HashMap::new();
        let mut committed = Vec::new();
        for record in records {
            match record.kind {
                RecordKind::PageImage => {
                    let image = record.to_page_image()?;
                    pending.entry(record.txn_id).or_default().push(image);
                }
                RecordKind::Commit => {
                    let images = pending.remove(&record.txn_id).unwrap_or_default();
                    committed.push((record.txn_id, images));
                }
            }
        }

        if !pending.is_empty() {
            log::warn!(
                "Discarding {} uncommitted transaction(s) found in the commit log",
                pending.len()
            );
        }

        Ok(committed)
    }
}
