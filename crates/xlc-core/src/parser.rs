//! Workbook sources: CSV and JSON files parsed into raw sheets
//!
//! A `.csv` file is a single sheet named after the file stem. A `.json` file
//! may hold several sheets:
//!
//! ```json
//! {"sheets": [{"name": "Item", "rows": [["Item", "id"], [null, "int"]]}]}
//! ```

use crate::error::{Error, Result};
use crate::table::{RawCell, RawSheet};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A parsed workbook file
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the file bytes
    pub fingerprint: String,
    pub sheets: Vec<RawSheet>,
}

#[derive(Deserialize)]
struct JsonWorkbook {
    sheets: Vec<JsonSheet>,
}

#[derive(Deserialize)]
struct JsonSheet {
    name: String,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

/// Read and parse a workbook, choosing the format by extension
pub fn parse_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let fingerprint = fingerprint(&bytes);

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let sheets = match extension.as_deref() {
        Some("csv") => vec![parse_csv_bytes(&bytes, &sheet_name(path), path)?],
        Some("json") => parse_json_bytes(&bytes, path)?,
        _ => {
            return Err(Error::Workbook {
                path: path.to_path_buf(),
                message: "unsupported workbook format".to_string(),
            })
        }
    };

    Ok(Workbook {
        path: path.to_path_buf(),
        fingerprint,
        sheets,
    })
}

/// Lowercase hex SHA-256 digest
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn sheet_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parse CSV text into one sheet (useful for testing)
pub fn parse_csv_str(content: &str, sheet: &str) -> Result<RawSheet> {
    parse_csv_bytes(content.as_bytes(), sheet, Path::new(sheet))
}

fn parse_csv_bytes(bytes: &[u8], sheet: &str, path: &Path) -> Result<RawSheet> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // header rows are often shorter than data rows
        .from_reader(bytes);

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        rows.push(record.iter().map(RawCell::from_text).collect());
    }

    Ok(RawSheet::new(sheet, rows))
}

/// Parse JSON workbook text (useful for testing)
pub fn parse_json_str(content: &str, source_name: &str) -> Result<Vec<RawSheet>> {
    parse_json_bytes(content.as_bytes(), Path::new(source_name))
}

fn parse_json_bytes(bytes: &[u8], path: &Path) -> Result<Vec<RawSheet>> {
    let workbook: JsonWorkbook = serde_json::from_slice(bytes).map_err(|e| Error::Workbook {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok(workbook
        .sheets
        .into_iter()
        .map(|sheet| {
            let rows = sheet
                .rows
                .iter()
                .map(|row| row.iter().map(RawCell::from_json).collect())
                .collect();
            RawSheet::new(sheet.name, rows)
        })
        .collect())
}
