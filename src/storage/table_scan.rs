//! Cursor over the records of one table.

use super::engine::validate_table_name;
use super::page::{RecordPage, RecordPageMut};
use super::rid::RecordId;
use super::schema::{Layout, Value};
use super::transaction::Transaction;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Cursor that walks a table block by block, slot by slot.
///
/// The cursor sits either before the first record of the table, or on a
/// slot. Field access is only valid while positioned on a used slot.
///
/// # Example
///
/// ```rust,no_run
/// use ehash::{Database, Layout, Options, Schema, TableScan, Value};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), ehash::Error> {
/// let db = Database::open("./data", Options::default())?;
/// let tx = db.begin();
///
/// let mut schema = Schema::new();
/// schema.add_int_field("id").add_string_field("name", 16);
/// let layout = Arc::new(Layout::new(schema, tx.block_size())?);
///
/// let mut scan = TableScan::open(&tx, "student", layout)?;
/// scan.insert()?;
/// scan.set_int("id", 7)?;
/// scan.set_value("name", &Value::from("ada"))?;
///
/// scan.before_first();
/// while scan.next()? {
///     println!("{} at {}", scan.get_value("name")?, scan.record_id()?);
/// }
/// scan.close();
/// tx.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct TableScan {
    tx: Transaction,
    table: String,
    layout: Arc<Layout>,
    block: u32,
    /// `None` means before the first slot of `block`
    slot: Option<u32>,
    closed: bool,
}

impl TableScan {
    /// Open a cursor on `table`, positioned before the first record.
    pub fn open(tx: &Transaction, table: &str, layout: Arc<Layout>) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            tx: tx.clone(),
            table: table.to_string(),
            layout,
            block: 0,
            slot: None,
            closed: false,
        })
    }

    /// Name of the scanned table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Layout of the scanned table
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::invalid_state(format!("scan on {} is closed", self.table)))
        } else {
            Ok(())
        }
    }

    fn current_slot(&self) -> Result<u32> {
        self.check_open()?;
        self.slot.ok_or_else(|| {
            Error::invalid_state(format!("scan on {} is not positioned on a record", self.table))
        })
    }

    /// Move before the first record.
    pub fn before_first(&mut self) {
        self.block = 0;
        self.slot = None;
    }

    /// Advance to the next record; returns false past the last one.
    pub fn next(&mut self) -> Result<bool> {
        self.check_open()?;
        let block_count = self.tx.block_count(&self.table)?;

        while self.block < block_count {
            let layout = &self.layout;
            let after = self.slot;
            let found = self
                .tx
                .with_block(&self.table, self.block, |data| RecordPage::new(data, layout).next_used(after))?;
            match found {
                Some(slot) => {
                    self.slot = Some(slot);
                    return Ok(true);
                }
                None => {
                    self.block += 1;
                    self.slot = None;
                }
            }
        }
        Ok(false)
    }

    /// Returns true if the cursor sits on a slot that holds a record.
    pub fn has_record(&self) -> Result<bool> {
        self.check_open()?;
        let Some(slot) = self.slot else {
            return Ok(false);
        };
        if self.block >= self.tx.block_count(&self.table)? {
            return Ok(false);
        }
        let layout = &self.layout;
        self.tx
            .with_block(&self.table, self.block, |data| RecordPage::new(data, layout).is_used(slot))
    }

    /// Read an integer field of the current record.
    pub fn get_int(&self, field: &str) -> Result<i32> {
        match self.get_value(field)? {
            Value::Int(v) => Ok(v),
            Value::Str(_) => Err(Error::invalid_argument(format!("field {} is not an int", field))),
        }
    }

    /// Read a field of the current record.
    pub fn get_value(&self, field: &str) -> Result<Value> {
        let slot = self.current_slot()?;
        let layout = &self.layout;
        self.tx.with_block(&self.table, self.block, |data| {
            let page = RecordPage::new(data, layout);
            if !page.is_used(slot) {
                return Err(Error::invalid_state(format!("slot {} holds no record", slot)));
            }
            page.get_value(slot, field)
        })?
    }

    /// Write an integer field of the current record.
    pub fn set_int(&mut self, field: &str, value: i32) -> Result<()> {
        self.set_value(field, &Value::Int(value))
    }

    /// Write a field of the current record.
    pub fn set_value(&mut self, field: &str, value: &Value) -> Result<()> {
        let slot = self.current_slot()?;
        let layout = &self.layout;
        self.tx.modify_block(&self.table, self.block, |data| {
            let mut page = RecordPageMut::new(data, layout);
            if !page.view().is_used(slot) {
                return Err(Error::invalid_state(format!("slot {} holds no record", slot)));
            }
            page.set_value(slot, field, value)
        })
    }

    /// Position on a fresh record with zeroed fields.
    ///
    /// The search for an empty slot starts at the current position; a new
    /// block is appended when every remaining slot is taken.
    pub fn insert(&mut self) -> Result<()> {
        self.check_open()?;
        loop {
            let block_count = self.tx.block_count(&self.table)?;
            if self.block >= block_count {
                self.block = self.tx.append_block(&self.table)?;
                self.slot = None;
            }

            let layout = &self.layout;
            let after = self.slot;
            let empty = self
                .tx
                .with_block(&self.table, self.block, |data| RecordPage::new(data, layout).next_empty(after))?;
            match empty {
                Some(slot) => {
                    self.tx.modify_block(&self.table, self.block, |data| {
                        RecordPageMut::new(data, layout).claim(slot)
                    })?;
                    self.slot = Some(slot);
                    return Ok(());
                }
                None => {
                    self.block += 1;
                    self.slot = None;
                }
            }
        }
    }

    /// Delete the current record. The cursor stays on the freed slot, so a
    /// following `next` continues with the record after it.
    pub fn delete(&mut self) -> Result<()> {
        let slot = self.current_slot()?;
        let layout = &self.layout;
        self.tx.modify_block(&self.table, self.block, |data| {
            RecordPageMut::new(data, layout).release(slot);
            Ok(())
        })
    }

    /// Locator of the current record.
    pub fn record_id(&self) -> Result<RecordId> {
        let slot = self.current_slot()?;
        Ok(RecordId::new(self.block, slot))
    }

    /// Position on the given locator.
    pub fn move_to(&mut self, rid: RecordId) -> Result<()> {
        self.check_open()?;
        if rid.slot as usize >= self.layout.slots_per_page() {
            return Err(Error::invalid_argument(format!(
                "slot {} is out of range for table {}",
                rid.slot, self.table
            )));
        }
        self.block = rid.block;
        self.slot = Some(rid.slot);
        Ok(())
    }

    /// Release the cursor. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.closed = true;
        self.slot = None;
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
