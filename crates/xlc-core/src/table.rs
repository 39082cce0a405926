//! Core table types: raw worksheet cells, field metadata and compiled rows

use crate::tags::Tags;
use crate::types::TypeDescriptor;
use crate::value::Value;
use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::PathBuf;

/// A cell as delivered by a worksheet source, before coercion
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    /// Missing cell
    Empty,
    Text(String),
    /// Native number cell
    Number(f64),
    /// Native boolean cell
    Bool(bool),
    /// Native date/time cell, no timezone
    DateTime(NaiveDateTime),
}

impl RawCell {
    /// Wrap text, mapping blank text to `Empty`
    pub fn from_text(s: &str) -> Self {
        if s.trim().is_empty() {
            RawCell::Empty
        } else {
            RawCell::Text(s.to_string())
        }
    }

    /// Convert a JSON scalar. Integers stay textual so 64-bit values keep
    /// their precision; arrays and objects become their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawCell::Empty,
            serde_json::Value::Bool(b) => RawCell::Bool(*b),
            serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => {
                RawCell::Text(n.to_string())
            }
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(RawCell::Number)
                .unwrap_or_else(|| RawCell::Text(n.to_string())),
            serde_json::Value::String(s) => RawCell::from_text(s),
            other => RawCell::Text(other.to_string()),
        }
    }

    /// Missing cell or whitespace-only text
    pub fn is_blank(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Name of the primitive kind, used in cast errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            RawCell::Empty => "empty",
            RawCell::Text(_) => "text",
            RawCell::Number(_) => "number",
            RawCell::Bool(_) => "bool",
            RawCell::DateTime(_) => "datetime",
        }
    }

    /// Convert to a display string
    pub fn to_string_value(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(s) => s.clone(),
            RawCell::Number(n) => n.to_string(),
            RawCell::Bool(b) => b.to_string(),
            RawCell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl std::fmt::Display for RawCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_value())
    }
}

/// One worksheet as a grid of raw cells
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<RawCell>>,
}

static EMPTY_CELL: RawCell = RawCell::Empty;

impl RawSheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<RawCell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Cell at a 1-based position; out-of-range cells are empty
    pub fn cell(&self, row: usize, column: usize) -> &RawCell {
        row.checked_sub(1)
            .and_then(|r| self.rows.get(r))
            .and_then(|cells| column.checked_sub(1).and_then(|c| cells.get(c)))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// Metadata of one declared column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMeta {
    /// Header text; ignored fields keep their `#` prefix
    pub name: String,
    #[serde(rename = "type")]
    pub descriptor: TypeDescriptor,
    pub tags: Tags,
    pub doc: String,
    /// 1-based source column
    pub column: usize,
    /// Excluded from row data
    pub ignored: bool,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
            tags: Tags::default(),
            doc: String::new(),
            column: 0,
            ignored: false,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}

/// A compiled row: field name to value, in field order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.cells.iter().find(|(n, _)| n == field).map(|(_, v)| v)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.cells.iter().any(|(n, _)| n == field)
    }

    /// Set a field, replacing any previous value
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        match self.cells.iter_mut().find(|(n, _)| *n == field) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((field, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (field, value) in iter {
            row.insert(field, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One worksheet compiled against its header, before merging
#[derive(Debug, Clone, PartialEq)]
pub struct TableRecord {
    pub export_name: String,
    /// Fields in column order
    pub fields: Vec<FieldMeta>,
    pub rows: Vec<Row>,
    pub sheet: String,
    pub source: PathBuf,
    /// Content fingerprint of the source file
    pub fingerprint: String,
}

impl TableRecord {
    pub fn find_field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// `file:sheet`, used in diagnostics
    pub fn location(&self) -> String {
        format!("{}:{}", self.source.display(), self.sheet)
    }
}

/// Every sheet sharing one export name, unified into a single table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedTable {
    pub export_name: String,
    pub fields: Vec<FieldMeta>,
    pub rows: Vec<Row>,
    /// Contributing sheet names, in merge order
    pub sheets: Vec<String>,
    /// Source file of the first contributing sheet
    pub source: PathBuf,
    pub fingerprint: String,
}

impl MergedTable {
    pub fn find_field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that carry row data
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().filter(|f| !f.ignored)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
