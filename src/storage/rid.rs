//! Record locator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical address of a record: block number plus slot inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    /// Block number within the table file.
    pub block: u32,
    /// Slot number within the block.
    pub slot: u32,
}

impl RecordId {
    /// Create a new record locator
    pub fn new(block: u32, slot: u32) -> Self {
        Self { block, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[block {}, slot {}]", self.block, self.slot)
    }
}
