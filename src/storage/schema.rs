//! Table schemas, field values and the physical slot layout derived from them.

use crate::error::{Error, Result};
use std::fmt;

/// Size of the in-use flag at the start of every slot.
pub const SLOT_FLAG_SIZE: usize = 4;

/// Size of the checksum header at the start of every page.
pub const PAGE_HEADER_SIZE: usize = 4;

/// Type of a table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit signed integer.
    Int,
    /// UTF-8 string of at most the given number of bytes.
    Varchar(usize),
}

impl FieldType {
    /// Number of bytes the field occupies inside a slot.
    pub fn encoded_len(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Varchar(n) => 4 + n,
        }
    }

    /// Default value stored in a freshly inserted slot.
    pub fn zero(&self) -> Value {
        match self {
            FieldType::Int => Value::Int(0),
            FieldType::Varchar(_) => Value::Str(String::new()),
        }
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    /// Integer value.
    Int(i32),
    /// String value.
    Str(String),
}

impl Value {
    /// Returns the integer payload, if any.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Str(_) => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Int(_) => None,
            Value::Str(s) => Some(s),
        }
    }

    /// Checks that the value can be stored in a field of the given type.
    pub fn check_type(&self, field_type: FieldType) -> Result<()> {
        match (self, field_type) {
            (Value::Int(_), FieldType::Int) => Ok(()),
            (Value::Str(s), FieldType::Varchar(n)) => {
                if s.len() > n {
                    Err(Error::invalid_argument(format!(
                        "string of {} bytes exceeds varchar({})",
                        s.len(),
                        n
                    )))
                } else {
                    Ok(())
                }
            }
            (value, field_type) => Err(Error::invalid_argument(format!(
                "value {} does not match field type {:?}",
                value, field_type
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// Ordered list of named, typed fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<(String, FieldType)>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field of the given type.
    pub fn add_field(&mut self, name: &str, field_type: FieldType) -> &mut Self {
        self.fields.push((name.to_string(), field_type));
        self
    }

    /// Adds an integer field.
    pub fn add_int_field(&mut self, name: &str) -> &mut Self {
        self.add_field(name, FieldType::Int)
    }

    /// Adds a string field holding at most `max_len` bytes.
    pub fn add_string_field(&mut self, name: &str, max_len: usize) -> &mut Self {
        self.add_field(name, FieldType::Varchar(max_len))
    }

    /// Type of the named field.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    /// Field names in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Returns true if the schema declares the field.
    pub fn has_field(&self, name: &str) -> bool {
        self.field_type(name).is_some()
    }
}

/// Physical placement of a schema's fields inside fixed-size slots.
///
/// Slot format:
/// ```text
/// [in_use: u32][field 0][field 1]...
/// ```
#[derive(Debug, Clone)]
pub struct Layout {
    schema: Schema,
    offsets: Vec<(String, FieldType, usize)>,
    slot_size: usize,
    slots_per_page: usize,
}

impl Layout {
    /// Computes the layout of `schema` for pages of `block_size` bytes.
    pub fn new(schema: Schema, block_size: usize) -> Result<Self> {
        if schema.fields.is_empty() {
            return Err(Error::invalid_argument("schema must declare at least one field"));
        }

        let mut offsets = Vec::with_capacity(schema.fields.len());
        let mut pos = SLOT_FLAG_SIZE;
        for (name, field_type) in &schema.fields {
            if offsets.iter().any(|(n, _, _)| n == name) {
                return Err(Error::invalid_argument(format!("duplicate field {}", name)));
            }
            offsets.push((name.clone(), *field_type, pos));
            pos += field_type.encoded_len();
        }

        let slot_size = pos;
        let usable = block_size.saturating_sub(PAGE_HEADER_SIZE);
        let slots_per_page = usable / slot_size;
        if slots_per_page == 0 {
            return Err(Error::invalid_argument(format!(
                "slot of {} bytes does not fit a {} byte page",
                slot_size, block_size
            )));
        }

        Ok(Self {
            schema,
            offsets,
            slot_size,
            slots_per_page,
        })
    }

    /// The schema this layout was computed from.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Byte offset and type of a field inside a slot.
    pub fn field(&self, name: &str) -> Result<(usize, FieldType)> {
        self.offsets
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, t, off)| (*off, *t))
            .ok_or_else(|| Error::invalid_argument(format!("unknown field {}", name)))
    }

    /// Fields with their types, in slot order.
    pub(crate) fn field_types(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.offsets.iter().map(|(n, t, _)| (n.as_str(), *t))
    }

    /// Size of one slot in bytes.
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Number of slots that fit on one page.
    pub fn slots_per_page(&self) -> usize {
        self.slots_per_page
    }

    /// Byte offset of a slot inside its page.
    pub fn slot_offset(&self, slot: u32) -> usize {
        PAGE_HEADER_SIZE + slot as usize * self.slot_size
    }
}
