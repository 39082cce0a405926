//! xlc-core: Core library for compiling spreadsheet config tables
//!
//! This library provides functionality to:
//! - Load custom enum/struct/class declarations into a type registry
//! - Scan directories for CSV/JSON workbooks and read their sheets
//! - Coerce raw cells into typed values against declared field types
//! - Merge sheets sharing an export name into one table
//! - Validate uniqueness, cross-table links and export names
//! - Export compiled tables as JSON

pub mod coerce;
pub mod datetime;
pub mod error;
pub mod export;
pub mod literal;
pub mod merger;
mod numeric;
pub mod parallel;
pub mod parser;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod scanner;
pub mod table;
pub mod tags;
pub mod types;
pub mod validate;
pub mod value;

pub use coerce::{Coercer, Coercion};
pub use error::{CastError, Error, RegistryError, Result, StructCastError};
pub use export::{export_dataset, ExportResult, JsonExporter, TableSink};
pub use merger::merge_tables;
pub use parser::{parse_workbook, Workbook};
pub use pipeline::{compile, CompileOptions, CompiledDataset};
pub use reader::{read_sheet, read_workbook};
pub use registry::{TypeDefinition, TypeKind, TypeRegistry};
pub use scanner::scan_directory;
pub use table::{FieldMeta, MergedTable, RawCell, RawSheet, Row, TableRecord};
pub use tags::{LinkSpec, Tags};
pub use types::{Builtin, TypeDescriptor};
pub use validate::{Diagnostic, DiagnosticKind, Validator};
pub use value::{DecimalValue, Value};
