//! Phase sequencing: registry, workbooks, per-workbook merge, validation
//!
//! Each phase is a join barrier. Workbook failures are collected so that one
//! run reports every broken file, but nothing after a failed phase runs.

use crate::error::{Error, Result};
use crate::merger::merge_tables;
use crate::parallel::with_pool;
use crate::parser::parse_workbook;
use crate::reader::read_workbook;
use crate::registry::TypeRegistry;
use crate::scanner::scan_directory;
use crate::table::MergedTable;
use crate::validate::{default_validators, run_validators};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// File name looked up in the input directory when no types file is given
pub const DEFAULT_TYPES_FILE: &str = "types.yaml";

/// Inputs of one compile run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub input_dir: PathBuf,
    /// Explicit type declaration file; must exist when set
    pub types_file: Option<PathBuf>,
}

impl CompileOptions {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            types_file: None,
        }
    }

    pub fn with_types_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.types_file = Some(path.into());
        self
    }

    /// The declaration file to load, if any: the explicit one, else
    /// `<input_dir>/types.yaml` when it exists
    pub fn resolved_types_file(&self) -> Option<PathBuf> {
        match &self.types_file {
            Some(path) => Some(path.clone()),
            None => {
                let candidate = self.input_dir.join(DEFAULT_TYPES_FILE);
                candidate.is_file().then_some(candidate)
            }
        }
    }
}

/// Everything downstream generators consume
#[derive(Debug, Clone)]
pub struct CompiledDataset {
    pub registry: TypeRegistry,
    pub tables: Vec<MergedTable>,
}

impl CompiledDataset {
    /// First table with this export name
    pub fn find_table(&self, export_name: &str) -> Option<&MergedTable> {
        self.tables.iter().find(|t| t.export_name == export_name)
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(MergedTable::row_count).sum()
    }
}

/// Run every phase over `options.input_dir`
pub fn compile(options: &CompileOptions) -> Result<CompiledDataset> {
    let started = Instant::now();

    let registry = load_registry(options)?;
    let files = scan_directory(&options.input_dir)?;
    let tables = compile_workbooks(&registry, &files)?;
    validate_tables(&tables)?;

    info!(
        tables = tables.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "compile finished"
    );
    Ok(CompiledDataset { registry, tables })
}

/// Load the type registry; an absent default file yields builtins only
pub fn load_registry(options: &CompileOptions) -> Result<TypeRegistry> {
    let started = Instant::now();
    let registry = match options.resolved_types_file() {
        Some(path) => TypeRegistry::load_file(&path)?,
        None => {
            debug!(input_dir = %options.input_dir.display(), "no type declarations found");
            TypeRegistry::new()
        }
    };
    info!(
        types = registry.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "type registry loaded"
    );
    Ok(registry)
}

/// Parse, read and merge every workbook in parallel.
///
/// Merging happens per workbook, so one export name produced by two files
/// yields two tables; the export name validator reports that collision.
/// Results keep the order of `files`.
pub fn compile_workbooks(registry: &TypeRegistry, files: &[PathBuf]) -> Result<Vec<MergedTable>> {
    let started = Instant::now();

    let results: Vec<Result<Vec<MergedTable>>> = with_pool(files.len(), || {
        files
            .par_iter()
            .map(|path| compile_workbook(registry, path))
            .collect()
    })?;

    let mut tables = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(merged) => tables.extend(merged),
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        return Err(Error::Phase(errors));
    }

    info!(
        files = files.len(),
        tables = tables.len(),
        rows = tables.iter().map(MergedTable::row_count).sum::<usize>(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "workbooks compiled"
    );
    Ok(tables)
}

fn compile_workbook(registry: &TypeRegistry, path: &Path) -> Result<Vec<MergedTable>> {
    let book = parse_workbook(path)?;
    let records = read_workbook(registry, &book)?;
    debug!(path = %path.display(), sheets = book.sheets.len(), records = records.len(), "read workbook");
    merge_tables(registry, records)
}

/// Run the default validators; any diagnostic fails the run
pub fn validate_tables(tables: &[MergedTable]) -> Result<()> {
    let started = Instant::now();
    let validators = default_validators();
    let diagnostics = with_pool(tables.len(), || run_validators(&validators, tables))?;

    info!(
        tables = tables.len(),
        diagnostics = diagnostics.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "validation finished"
    );
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_types_file_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let options = CompileOptions::new(dir.path());
        assert_eq!(options.resolved_types_file(), None);

        fs::write(dir.path().join(DEFAULT_TYPES_FILE), "").unwrap();
        assert_eq!(
            options.resolved_types_file(),
            Some(dir.path().join(DEFAULT_TYPES_FILE))
        );

        let explicit = options.with_types_file("custom.yaml");
        assert_eq!(explicit.resolved_types_file(), Some(PathBuf::from("custom.yaml")));
    }

    #[test]
    fn test_missing_explicit_types_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let options = CompileOptions::new(dir.path()).with_types_file(dir.path().join("nope.yaml"));
        assert!(load_registry(&options).is_err());
    }

    #[test]
    fn test_workbook_errors_are_all_collected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "Item,id\n,int\n,\n,\n,x\n").unwrap();
        fs::write(dir.path().join("b.csv"), "Skill,id\n,int\n,\n,\n,1\n").unwrap();
        fs::write(dir.path().join("c.csv"), "Buff\n").unwrap();

        let files = scan_directory(dir.path()).unwrap();
        match compile_workbooks(&TypeRegistry::new(), &files) {
            Err(Error::Phase(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors[0], Error::Row { .. }));
                assert!(matches!(errors[1], Error::Layout { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_compile_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = compile(&CompileOptions::new(dir.path())).unwrap();
        assert!(dataset.tables.is_empty());
        assert!(dataset.registry.is_empty());
    }
}
