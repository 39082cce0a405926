//! Data export: compiled tables handed to downstream sinks

use crate::error::Result;
use crate::pipeline::CompiledDataset;
use crate::registry::{TypeDefinition, TypeRegistry};
use crate::table::MergedTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TYPES_FILE: &str = "types.json";
pub const FINGERPRINTS_FILE: &str = "fingerprints.json";

/// Receives every compiled table, then the registry once at the end
pub trait TableSink {
    fn write_table(&mut self, table: &MergedTable) -> Result<()>;

    fn finish(&mut self, registry: &TypeRegistry) -> Result<()>;
}

/// Result of an export run
#[derive(Debug, Clone, Default)]
pub struct ExportResult {
    pub files_written: Vec<PathBuf>,
    pub rows_written: usize,
}

/// Feed a dataset through a sink, tables in compile order
pub fn export_dataset<S: TableSink>(dataset: &CompiledDataset, sink: &mut S) -> Result<()> {
    for table in &dataset.tables {
        sink.write_table(table)?;
    }
    sink.finish(&dataset.registry)
}

/// Writes `<ExportName>.json` per table plus `types.json` and
/// `fingerprints.json`
#[derive(Debug)]
pub struct JsonExporter {
    output_dir: PathBuf,
    fingerprints: BTreeMap<String, String>,
    result: ExportResult,
}

impl JsonExporter {
    /// Create the output directory if needed
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            fingerprints: BTreeMap::new(),
            result: ExportResult::default(),
        })
    }

    pub fn result(&self) -> &ExportResult {
        &self.result
    }

    pub fn into_result(self) -> ExportResult {
        self.result
    }

    fn write_json<T: Serialize + ?Sized>(&mut self, file_name: &str, value: &T) -> Result<()> {
        let path = self.output_dir.join(file_name);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writeln!(writer)?;
        writer.flush()?;
        debug!(path = %path.display(), "wrote file");
        self.result.files_written.push(path);
        Ok(())
    }
}

impl TableSink for JsonExporter {
    fn write_table(&mut self, table: &MergedTable) -> Result<()> {
        self.write_json(&format!("{}.json", table.export_name), &table.rows)?;
        self.fingerprints
            .insert(table.export_name.clone(), table.fingerprint.clone());
        self.result.rows_written += table.row_count();
        Ok(())
    }

    fn finish(&mut self, registry: &TypeRegistry) -> Result<()> {
        let exported: Vec<&TypeDefinition> =
            registry.definitions().filter(|def| !def.ignore).collect();
        self.write_json(TYPES_FILE, &exported)?;

        let fingerprints = std::mem::take(&mut self.fingerprints);
        self.write_json(FINGERPRINTS_FILE, &fingerprints)?;

        info!(
            files = self.result.files_written.len(),
            rows = self.result.rows_written,
            output_dir = %self.output_dir.display(),
            "export finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{FieldMeta, Row};
    use crate::types::TypeDescriptor;
    use crate::value::Value;

    fn dataset() -> CompiledDataset {
        let registry = TypeRegistry::load_str(
            "Color:\n  type: enum\n  fields: [Red, Blue]\nHidden:\n  type: enum\n  fields: [A]\n  ignore: true\n",
        )
        .unwrap();
        let table = MergedTable {
            export_name: "Item".to_string(),
            fields: vec![FieldMeta::new("id", TypeDescriptor::parse("int").unwrap())],
            rows: vec![[("id", Value::Int(1))].into_iter().collect::<Row>()],
            sheets: vec!["Item".to_string()],
            source: PathBuf::from("Item.csv"),
            fingerprint: "abc".to_string(),
        };
        CompiledDataset {
            registry,
            tables: vec![table],
        }
    }

    #[test]
    fn test_json_export_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = JsonExporter::new(dir.path().join("out")).unwrap();
        export_dataset(&dataset(), &mut exporter).unwrap();

        let result = exporter.into_result();
        assert_eq!(result.files_written.len(), 3);
        assert_eq!(result.rows_written, 1);

        let out = dir.path().join("out");
        let rows: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("Item.json")).unwrap()).unwrap();
        assert_eq!(rows, serde_json::json!([{"id": 1}]));

        let fingerprints: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(FINGERPRINTS_FILE)).unwrap()).unwrap();
        assert_eq!(fingerprints, serde_json::json!({"Item": "abc"}));
    }

    #[test]
    fn test_ignored_types_are_not_exported() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = JsonExporter::new(dir.path()).unwrap();
        export_dataset(&dataset(), &mut exporter).unwrap();

        let types: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(TYPES_FILE)).unwrap()).unwrap();
        let names: Vec<_> = types
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Color"]);
        assert_eq!(types[0]["kind"], "enum");
    }
}
