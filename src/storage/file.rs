//! Table files: a flat array of fixed-size pages.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Extension of table files inside the database directory
pub const TABLE_FILE_EXT: &str = "tbl";

/// Build the file name of a table
pub fn table_filename(table: &str) -> String {
    format!("{}.{}", table, TABLE_FILE_EXT)
}

/// Parse a table file name back to the table name
pub fn parse_table_filename(filename: &str) -> Option<&str> {
    filename
        .strip_suffix(TABLE_FILE_EXT)
        .and_then(|s| s.strip_suffix('.'))
        .filter(|s| !s.is_empty())
}

/// A table file addressed by block number.
pub struct TableFile {
    block_size: usize,
    file: Mutex<File>,
}

impl TableFile {
    /// Open (creating if needed) the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len % block_size as u64 != 0 {
            return Err(Error::corruption(format!(
                "{:?} has length {} which is not a multiple of the block size {}",
                path, len, block_size
            )));
        }

        Ok(Self {
            block_size,
            file: Mutex::new(file),
        })
    }

    /// Number of blocks in the file
    pub fn block_count(&self) -> Result<u32> {
        let len = self.file.lock().metadata()?.len();
        Ok((len / self.block_size as u64) as u32)
    }

    /// Read one block
    pub fn read_block(&self, block: u32) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.block_size];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block as u64 * self.block_size as u64))?;
        file.read_exact(&mut data)?;
        Ok(data)
    }

    /// Write one block, extending the file if needed
    pub fn write_block(&self, block: u32, data: &[u8]) -> Result<()> {
        if data.len() != self.block_size {
            return Err(Error::internal(format!(
                "page of {} bytes written to a file with {} byte blocks",
                data.len(),
                self.block_size
            )));
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block as u64 * self.block_size as u64))?;
        file.write_all(data)?;
        Ok(())
    }

    /// Force written blocks to disk
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_table_filename() {
        assert_eq!(table_filename("idx.dir"), "idx.dir.tbl");
        assert_eq!(parse_table_filename("idx.dir.tbl"), Some("idx.dir"));
        assert_eq!(parse_table_filename("commit.log"), None);
        assert_eq!(parse_table_filename(".tbl"), None);
    }

    #[test]
    fn test_write_and_read_blocks() {
        let dir = TempDir::new().unwrap();
        let file = TableFile::open(dir.path().join("t.tbl"), 128).unwrap();
        assert_eq!(file.block_count().unwrap(), 0);

        file.write_block(1, &[7u8; 128]).unwrap();
        assert_eq!(file.block_count().unwrap(), 2);
        assert_eq!(file.read_block(1).unwrap(), vec![7u8; 128]);
        // The hole before block 1 reads back as zeros
        assert_eq!(file.read_block(0).unwrap(), vec![0u8; 128]);
        assert!(file.write_block(0, &[1u8; 64]).is_err());
    }

    #[test]
    fn test_rejects_partial_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.tbl");
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        assert!(TableFile::open(&path, 128).is_err());
    }
}
