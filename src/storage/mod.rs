//! Record-table storage layer.
//!
//! Named tables are stored as files of fixed-size slotted pages. All access
//! goes through a [`Transaction`], which buffers modified pages privately
//! until commit, and a [`TableScan`] cursor that reads and writes typed
//! records.

mod engine;
mod file;
mod page;
mod rid;
mod schema;
mod table_scan;
mod transaction;

pub use engine::{validate_table_name, StorageEngine};
pub use file::{table_filename, TABLE_FILE_EXT};
pub use rid::RecordId;
pub use schema::{FieldType, Layout, Schema, Value};
pub use table_scan::TableScan;
pub use transaction::Transaction;
