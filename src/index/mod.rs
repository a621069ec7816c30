//! Secondary indexes mapping key values to record locators.
//!
//! Every index kind implements the [`Index`] contract: position on a search
//! key, advance through the matching entries, and insert or delete
//! `(key, locator)` pairs. The kind of an index is chosen when it is created
//! (`sh`, `ex` or `bt` in the creation metadata); only the extendable hash
//! index is provided by this crate.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ehash::index::{open_index, IndexKind};
//! use ehash::{Database, IndexOptions, Options, RecordId, Value};
//!
//! # fn main() -> Result<(), ehash::Error> {
//! let db = Database::open("./data", Options::default())?;
//! let tx = db.begin();
//!
//! let kind: IndexKind = "ex".parse()?;
//! let mut index = open_index(kind, &tx, "student_id", IndexOptions::default())?;
//! index.insert(&Value::Int(42), RecordId::new(3, 7))?;
//!
//! index.position(&Value::Int(42))?;
//! while index.advance()? {
//!     println!("found at {}", index.current_locator()?);
//! }
//! index.close();
//! tx.commit()?;
//! # Ok(())
//! # }
//! ```

mod bucket;
mod catalog;
mod directory;
mod extendable;
mod hash;

pub use extendable::{ExtendableHashIndex, IndexStats};
pub use hash::HashFunction;

use crate::config::IndexOptions;
use crate::error::{Error, Result};
use crate::storage::{RecordId, Transaction, Value};
use std::fmt;
use std::str::FromStr;

/// Contract shared by every index kind.
pub trait Index {
    /// Start a new search for `key`, superseding any previous one.
    fn position(&mut self, key: &Value) -> Result<()>;

    /// Move to the next entry matching the search key; false when exhausted.
    fn advance(&mut self) -> Result<bool>;

    /// Locator of the entry the last successful `advance` stopped on.
    fn current_locator(&self) -> Result<RecordId>;

    /// Add an entry.
    fn insert(&mut self, key: &Value, rid: RecordId) -> Result<()>;

    /// Remove the entry `(key, rid)`; returns false if there was none.
    fn delete(&mut self, key: &Value, rid: RecordId) -> Result<bool>;

    /// Release all cursors. Safe to call more than once.
    fn close(&mut self);
}

/// Kind of an index, as named in index creation metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Static hash index (`sh`)
    StaticHash,
    /// Extendable hash index (`ex`)
    Extendable,
    /// B-tree index (`bt`)
    BTree,
}

impl IndexKind {
    /// Token used in index creation metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::StaticHash => "sh",
            IndexKind::Extendable => "ex",
            IndexKind::BTree => "bt",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sh" => Ok(IndexKind::StaticHash),
            "ex" => Ok(IndexKind::Extendable),
            "bt" => Ok(IndexKind::BTree),
            other => Err(Error::invalid_argument(format!("unknown index kind {:?}", other))),
        }
    }
}

/// Checks that an index name yields unique physical table names.
pub fn validate_index_name(name: &str) -> Result<()> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!("invalid index name {:?}", name)))
    }
}

/// Open (creating if needed) an index of the given kind.
pub fn open_index(
    kind: IndexKind,
    tx: &Transaction,
    name: &str,
    options: IndexOptions,
) -> Result<Box<dyn Index>> {
    match kind {
        IndexKind::Extendable => Ok(Box::new(ExtendableHashIndex::open(tx, name, options)?)),
        IndexKind::StaticHash | IndexKind::BTree => Err(Error::NotImplemented(format!(
            "{} indexes are not supported (index {})",
            kind, name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index_kind() {
        assert_eq!("ex".parse::<IndexKind>().unwrap(), IndexKind::Extendable);
        assert_eq!("SH".parse::<IndexKind>().unwrap(), IndexKind::StaticHash);
        assert_eq!(" bt ".parse::<IndexKind>().unwrap(), IndexKind::BTree);
        assert!("hash".parse::<IndexKind>().is_err());
        assert_eq!(IndexKind::Extendable.to_string(), "ex");
    }

    #[test]
    fn test_validate_index_name() {
        assert!(validate_index_name("student_id").is_ok());
        assert!(validate_index_name("Idx2").is_ok());
        assert!(validate_index_name("").is_err());
        assert!(validate_index_name("a.b").is_err());
        assert!(validate_index_name("a-b").is_err());
    }
}
