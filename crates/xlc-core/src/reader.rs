//! Sheet reader: applies the header layout and coerces data rows
//!
//! Layout of every sheet:
//! - row 1: export name in A1, field names from column 2
//! - row 2: field types
//! - row 3: `;`-separated tags
//! - row 4: doc comments
//! - row 5+: data
//!
//! A sheet whose name or A1 starts with `#` is skipped, as is a column whose
//! header or type cell is blank. A `#`-prefixed header keeps the column's
//! metadata but excludes it from row data.

use crate::coerce::Coercer;
use crate::error::{Error, Result};
use crate::parser::Workbook;
use crate::registry::TypeRegistry;
use crate::table::{FieldMeta, RawSheet, Row, TableRecord};
use crate::tags::Tags;
use crate::types::{is_identifier, Builtin, TypeDescriptor};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const HEADER_ROWS: usize = 4;
const FIRST_DATA_ROW: usize = HEADER_ROWS + 1;
const FIRST_FIELD_COLUMN: usize = 2;

/// Marks a sheet, export name or field as excluded
pub const IGNORE_PREFIX: char = '#';

/// Read every sheet of a workbook, in sheet order. Skipped sheets are omitted.
pub fn read_workbook(registry: &TypeRegistry, book: &Workbook) -> Result<Vec<TableRecord>> {
    let mut records = Vec::new();
    for sheet in &book.sheets {
        if let Some(record) = read_sheet(registry, &book.path, &book.fingerprint, sheet)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Read one sheet into a table record.
///
/// Data rows are coerced in parallel on the current rayon pool. When several
/// rows fail, the error of the first one in sheet order is returned.
pub fn read_sheet(
    registry: &TypeRegistry,
    path: &Path,
    fingerprint: &str,
    sheet: &RawSheet,
) -> Result<Option<TableRecord>> {
    if sheet.name.starts_with(IGNORE_PREFIX) {
        debug!(sheet = %sheet.name, path = %path.display(), "skipping commented-out sheet");
        return Ok(None);
    }

    let layout_error = |message: String| Error::Layout {
        path: path.to_path_buf(),
        sheet: sheet.name.clone(),
        message,
    };

    if sheet.row_count() < HEADER_ROWS || sheet.column_count() < FIRST_FIELD_COLUMN {
        return Err(layout_error(format!(
            "expected at least {HEADER_ROWS} rows and {FIRST_FIELD_COLUMN} columns, found {}x{}",
            sheet.row_count(),
            sheet.column_count()
        )));
    }

    let export_name = sheet.cell(1, 1).to_string_value().trim().to_string();
    if export_name.is_empty() {
        return Err(layout_error("missing export name in A1".to_string()));
    }
    if export_name.starts_with(IGNORE_PREFIX) {
        debug!(sheet = %sheet.name, export_name = %export_name, "skipping sheet with commented-out export name");
        return Ok(None);
    }

    let fields = read_header(registry, sheet).map_err(layout_error)?;

    let coercer = Coercer::new(registry);
    let data_fields: Vec<&FieldMeta> = fields.iter().filter(|f| !f.ignored).collect();
    let rows = (FIRST_DATA_ROW..=sheet.row_count())
        .into_par_iter()
        .map(|r| {
            if data_fields.iter().all(|f| sheet.cell(r, f.column).is_blank()) {
                return Ok(None);
            }
            data_fields
                .iter()
                .map(|field| {
                    coercer
                        .coerce_field(field, sheet.cell(r, field.column))
                        .map(|value| (field.name.clone(), value))
                        .map_err(|source| Error::Row {
                            path: path.to_path_buf(),
                            sheet: sheet.name.clone(),
                            row: r,
                            column: field.column,
                            source,
                        })
                })
                .collect::<Result<Row>>()
                .map(Some)
        })
        .collect::<Vec<Result<Option<Row>>>>()
        .into_iter()
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    debug!(
        sheet = %sheet.name,
        export_name = %export_name,
        fields = fields.len(),
        rows = rows.len(),
        "read sheet"
    );

    Ok(Some(TableRecord {
        export_name,
        fields,
        rows,
        sheet: sheet.name.clone(),
        source: path.to_path_buf(),
        fingerprint: fingerprint.to_string(),
    }))
}

fn read_header(registry: &TypeRegistry, sheet: &RawSheet) -> std::result::Result<Vec<FieldMeta>, String> {
    let mut fields = Vec::new();
    let mut seen = HashSet::new();

    for column in FIRST_FIELD_COLUMN..=sheet.column_count() {
        let name = sheet.cell(1, column).to_string_value().trim().to_string();
        if name.is_empty() {
            continue;
        }
        let ignored = name.starts_with(IGNORE_PREFIX);
        if !ignored && !is_identifier(&name) {
            return Err(format!("illegal field name '{name}' in column {column}"));
        }

        let type_text = sheet.cell(2, column).to_string_value().trim().to_string();
        if type_text.is_empty() {
            continue;
        }
        let descriptor = match TypeDescriptor::parse(&type_text) {
            Ok(d) if registry.is_valid_descriptor(&d) => d,
            // excluded columns never reach coercion
            _ if ignored => TypeDescriptor::Builtin(Builtin::String),
            _ => {
                return Err(format!(
                    "unknown type '{type_text}' for field '{name}' in column {column}"
                ))
            }
        };

        if !seen.insert(name.clone()) {
            return Err(format!("duplicate field '{name}' in column {column}"));
        }

        let mut field = FieldMeta::new(name, descriptor)
            .with_tags(Tags::parse(&sheet.cell(3, column).to_string_value()));
        field.doc = sheet.cell(4, column).to_string_value().trim().to_string();
        field.column = column;
        field.ignored = ignored;
        fields.push(field);
    }

    Ok(fields)
}
