use std::borrow::Cow;

use csv::ByteRecord;
use serde::{Deserialize, Serialize};

/// A single cell. Blank fields are `Missing`, never an empty string or a zero.
///
/// Fields that are not valid UTF-8 are kept as `Raw` bytes so they are
/// written back exactly as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Raw(Vec<u8>),
    Missing,
}

impl Value {
    pub fn from_field(raw: &str) -> Self {
        if raw.is_empty() {
            Value::Missing
        } else {
            Value::Text(raw.to_string())
        }
    }

    pub fn from_bytes(raw: &[u8]) -> Self {
        if raw.is_empty() {
            Value::Missing
        } else {
            match String::from_utf8(raw.to_vec()) {
                Ok(text) => Value::Text(text),
                Err(e) => Value::Raw(e.into_bytes()),
            }
        }
    }

    /// Text view used by predicates; `Missing` reads as `""` and raw bytes
    /// are decoded lossily.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Value::Text(s) => Cow::Borrowed(s),
            Value::Raw(bytes) => String::from_utf8_lossy(bytes),
            Value::Missing => Cow::Borrowed(""),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::Text(s) => s.as_bytes(),
            Value::Raw(bytes) => bytes,
            Value::Missing => b"",
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

/// A row aligned to its table's [`Schema`].
pub type Row = Vec<Value>;

/// Ordered column names discovered from a source header.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn from_byte_record(header: &ByteRecord) -> Self {
        let columns = header
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let name = String::from_utf8_lossy(raw);
                // A UTF-8 BOM can survive on the first header cell
                if i == 0 {
                    name.trim_start_matches('\u{feff}').to_string()
                } else {
                    name.into_owned()
                }
            })
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of the first column with this name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub(crate) fn remove(&mut self, index: usize) -> String {
        self.columns.remove(index)
    }
}

/// Positional text access shared by streamed records and loaded rows.
pub trait Fields {
    /// Text of the field at `index`; absent fields read as `""`.
    fn text(&self, index: usize) -> Cow<'_, str>;
}

impl Fields for ByteRecord {
    fn text(&self, index: usize) -> Cow<'_, str> {
        match self.get(index) {
            Some(raw) => String::from_utf8_lossy(raw),
            None => Cow::Borrowed(""),
        }
    }
}

impl Fields for [Value] {
    fn text(&self, index: usize) -> Cow<'_, str> {
        self.get(index).map(Value::text).unwrap_or(Cow::Borrowed(""))
    }
}
