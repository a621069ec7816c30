//! Error types for the ehash storage and index layers.

use std::io;
use thiserror::Error;

/// The result type used throughout ehash.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for ehash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The requested table, record or file was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A feature or function is not implemented.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// The handle is in a state that does not allow the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A page checksum mismatch was detected.
    #[error("Checksum mismatch on {table} block {block}: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Table the page belongs to.
        table: String,
        /// Block number of the page.
        block: u32,
        /// The checksum stored in the page header.
        expected: u32,
        /// The checksum computed over the page body.
        actual: u32,
    },

    /// The database directory already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Another transaction committed a page this transaction also wrote.
    #[error("Transaction {txn} conflicts on {table} block {block}")]
    TransactionConflict {
        /// Id of the transaction that lost.
        txn: u64,
        /// Table of the conflicting page.
        table: String,
        /// Block number of the conflicting page.
        block: u32,
    },

    /// A bucket referenced by the directory has no catalog row.
    #[error("Index {index}: bucket {bucket} is missing from the bucket catalog")]
    UnknownBucket {
        /// Index name.
        index: String,
        /// Bucket id that could not be resolved.
        bucket: u32,
    },

    /// A directory slot that must exist has no row.
    #[error("Index {index}: directory slot {slot} is missing (global depth {global_depth})")]
    CorruptDirectory {
        /// Index name.
        index: String,
        /// Slot that could not be resolved.
        slot: u32,
        /// Global depth at the time of the lookup.
        global_depth: u32,
    },

    /// An overflowing bucket cannot be relieved by further splitting.
    #[error("Index {index}: bucket {bucket} at local depth {local_depth} cannot be split further")]
    DegenerateKeyDistribution {
        /// Index name.
        index: String,
        /// The overflowing bucket.
        bucket: u32,
        /// Its local depth when the split was refused.
        local_depth: u32,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Returns true for errors that signal a broken index structure.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownBucket { .. }
                | Error::CorruptDirectory { .. }
                | Error::Corruption(_)
                | Error::ChecksumMismatch { .. }
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
