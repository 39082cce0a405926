//! Error types for xlc-core

use crate::table::RawCell;
use crate::validate::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compiling tables
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A workbook file that could not be understood
    #[error("failed to parse workbook '{path}': {message}")]
    Workbook { path: PathBuf, message: String },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Custom type declarations are malformed
    #[error("type registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A worksheet does not follow the header layout
    #[error("layout error [{path}:{sheet}]: {message}")]
    Layout {
        path: PathBuf,
        sheet: String,
        message: String,
    },

    /// A data cell could not be coerced to its field type
    #[error("failed to parse row [{path}:{sheet} row {row} column {column}]: {source}")]
    Row {
        path: PathBuf,
        sheet: String,
        row: usize,
        column: usize,
        #[source]
        source: CastError,
    },

    /// Two sheets merged under one export name declare a field differently
    #[error(
        "field type conflict in '{table}.{field}': '{existing_type}' at {existing_location} vs '{new_type}' at {new_location}"
    )]
    FieldTypeConflict {
        table: String,
        field: String,
        existing_type: String,
        existing_location: String,
        new_type: String,
        new_location: String,
    },

    /// A merged field's default could not be resolved while back-filling rows
    #[error("failed to resolve default for '{table}.{field}': {source}")]
    BackFill {
        table: String,
        field: String,
        #[source]
        source: CastError,
    },

    /// Validators reported at least one diagnostic
    #[error("validation reported {} problem(s)", .0.len())]
    Validation(Vec<Diagnostic>),

    /// Every error collected while a phase ran to completion
    #[error("{} workbook(s) failed to compile", .0.len())]
    Phase(Vec<Error>),

    /// No compiled table has the requested export name
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Worker pool construction failed
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while loading custom type declarations. All of them are fatal.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("malformed declaration file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("type declarations must be a mapping of type name to definition")]
    NotAMapping,

    #[error("illegal type name '{0}'")]
    IllegalTypeName(String),

    #[error("type '{0}' is declared more than once")]
    DuplicateType(String),

    #[error("type '{name}' is missing required key '{key}'")]
    MissingKey { name: String, key: &'static str },

    #[error("type '{name}' has unsupported kind '{kind}'")]
    UnknownKind { name: String, kind: String },

    #[error("type '{name}' is malformed: {message}")]
    Malformed { name: String, message: String },

    #[error("type '{name}' has illegal field name '{field}'")]
    IllegalFieldName { name: String, field: String },

    #[error("type '{name}' field '{field}' uses undefined type '{ty}'")]
    UndefinedFieldType {
        name: String,
        field: String,
        ty: String,
    },

    #[error("enum '{0}' must declare at least one value")]
    EmptyEnum(String),

    #[error("enum '{name}' has duplicate values: {}", .duplicates.join(", "))]
    DuplicateEnumValues {
        name: String,
        duplicates: Vec<String>,
    },

    #[error("type '{name}' has an invalid default: {message}")]
    InvalidDefault { name: String, message: String },
}

/// A raw cell value that could not be coerced to its declared type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CastError {
    /// Scalar or container conversion failure
    #[error("cannot cast '{value}' ({kind}) to {target}: {reason}")]
    Cast {
        value: String,
        kind: &'static str,
        target: String,
        reason: String,
    },

    /// A whole number outside the target width
    #[error("value '{value}' ({kind}) is out of range for {target}")]
    Overflow {
        value: String,
        kind: &'static str,
        target: String,
    },

    /// Struct/class literal failures
    #[error(transparent)]
    Struct(#[from] StructCastError),

    /// A failure inside a struct/class field; nests to form a field path
    #[error("field '{field}': {source}")]
    Field {
        field: String,
        #[source]
        source: Box<CastError>,
    },
}

impl CastError {
    pub(crate) fn cast(cell: &RawCell, target: impl Into<String>, reason: impl Into<String>) -> Self {
        CastError::Cast {
            value: cell.to_string_value(),
            kind: cell.kind_name(),
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn overflow(cell: &RawCell, target: impl Into<String>) -> Self {
        CastError::Overflow {
            value: cell.to_string_value(),
            kind: cell.kind_name(),
            target: target.into(),
        }
    }

    /// Wrap this error with the name of the struct field it occurred in.
    pub fn in_field(self, field: impl Into<String>) -> Self {
        CastError::Field {
            field: field.into(),
            source: Box::new(self),
        }
    }

    /// Field names from the outermost struct down to the failing value.
    pub fn field_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = self;
        while let CastError::Field { field, source } = current {
            path.push(field.as_str());
            current = source;
        }
        path
    }

    /// The innermost error, with any field wrapping removed.
    pub fn root_cause(&self) -> &CastError {
        let mut current = self;
        while let CastError::Field { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Struct/class coercion failure carrying the offending literal.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (type {data_type}, value '{original}')")]
pub struct StructCastError {
    pub data_type: String,
    pub original: String,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    /// Line and column reported by the JSON parser
    pub position: Option<(usize, usize)>,
    pub message: String,
}

impl StructCastError {
    pub(crate) fn malformed(
        data_type: &str,
        original: &str,
        line: usize,
        column: usize,
        detail: &str,
    ) -> Self {
        Self {
            data_type: data_type.to_string(),
            original: original.to_string(),
            missing: Vec::new(),
            extra: Vec::new(),
            position: Some((line, column)),
            message: format!("invalid object literal at line {line} column {column}: {detail}"),
        }
    }

    pub(crate) fn mismatch(
        data_type: &str,
        original: &str,
        missing: Vec<String>,
        extra: Vec<String>,
    ) -> Self {
        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!("missing fields: {}", missing.join(", ")));
        }
        if !extra.is_empty() {
            parts.push(format!("unexpected fields: {}", extra.join(", ")));
        }
        Self {
            data_type: data_type.to_string(),
            original: original.to_string(),
            missing,
            extra,
            position: None,
            message: parts.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_accumulates() {
        let inner = CastError::cast(&RawCell::Text("x".into()), "int", "not a whole number");
        let err = inner.in_field("b").in_field("a");

        assert_eq!(err.field_path(), vec!["a", "b"]);
        assert!(matches!(err.root_cause(), CastError::Cast { .. }));
        assert!(err.to_string().starts_with("field 'a': field 'b': cannot cast 'x'"));
    }

    #[test]
    fn test_mismatch_message_lists_every_name() {
        let err = StructCastError::mismatch(
            "Point",
            "{x:1}",
            vec!["y".into(), "z".into()],
            vec!["w".into()],
        );
        assert_eq!(err.message, "missing fields: y, z; unexpected fields: w");
    }
}
