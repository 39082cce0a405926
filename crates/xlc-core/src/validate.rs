//! Dataset-wide validation over the merged tables
//!
//! Validators never stop at the first problem: each returns every
//! [`Diagnostic`] it finds, and any diagnostic fails the run.

use crate::table::{FieldMeta, MergedTable};
use crate::tags::{self, LinkSpec};
use crate::types::{is_identifier, TypeDescriptor};
use crate::value::Value;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Category of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    DuplicateValue,
    BrokenLink,
    MalformedLinkTag,
    IllegalExportName,
    ExportNameCollision,
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

impl Diagnostic {
    fn new(kind: DiagnosticKind, table: &str, message: String) -> Self {
        Self {
            kind,
            table: table.to_string(),
            field: None,
            value: None,
            message,
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A batch check over the whole compiled dataset
pub trait Validator: Sync {
    fn name(&self) -> &'static str;

    /// Every problem found, in a deterministic order
    fn validate(&self, tables: &[MergedTable]) -> Vec<Diagnostic>;
}

/// The validators every build runs
pub fn default_validators() -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(ExportNameValidator),
        Box::new(RepeatValidator),
        Box::new(LinkValidator),
    ]
}

/// Run validators one after another, concatenating their findings
pub fn run_validators(validators: &[Box<dyn Validator>], tables: &[MergedTable]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for validator in validators {
        let found = validator.validate(tables);
        debug!(validator = validator.name(), diagnostics = found.len(), "validator finished");
        diagnostics.extend(found);
    }
    diagnostics
}

// Per-table findings are appended under one lock, then sorted so output does
// not depend on scheduling
fn collect_parallel<F>(tables: &[MergedTable], check: F) -> Vec<Diagnostic>
where
    F: Fn(&MergedTable) -> Vec<Diagnostic> + Sync,
{
    let collected = Mutex::new(Vec::new());
    tables.par_iter().for_each(|table| {
        let found = check(table);
        if !found.is_empty() {
            collected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(found);
        }
    });
    let mut diagnostics = collected.into_inner().unwrap_or_else(PoisonError::into_inner);
    diagnostics.sort();
    diagnostics
}

/// Fields tagged `CheckRepeat` must not repeat a value within their table
#[derive(Debug, Default, Clone, Copy)]
pub struct RepeatValidator;

impl Validator for RepeatValidator {
    fn name(&self) -> &'static str {
        "repeat"
    }

    fn validate(&self, tables: &[MergedTable]) -> Vec<Diagnostic> {
        collect_parallel(tables, check_repeats)
    }
}

fn check_repeats(table: &MergedTable) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for field in table.fields.iter().filter(|f| f.tags.has(tags::CHECK_REPEAT)) {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for row in &table.rows {
            let Some(value) = row.get(&field.name) else {
                continue;
            };
            let text = value.to_string();
            if !seen.insert(text.clone()) && reported.insert(text.clone()) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::DuplicateValue,
                        &table.export_name,
                        format!(
                            "[{}:{}] field '{}' has duplicate value '{}'",
                            table.source.display(),
                            table.export_name,
                            field.name,
                            text
                        ),
                    )
                    .with_field(&field.name)
                    .with_value(&text),
                );
            }
        }
    }
    diagnostics
}

/// Stringified values of every (table, field) pair, built once up front
#[derive(Debug, Default)]
pub struct LinkIndex {
    values: HashMap<(String, String), HashSet<String>>,
}

impl LinkIndex {
    pub fn build(tables: &[MergedTable]) -> Self {
        let mut values = HashMap::new();
        for table in tables {
            for field in table.data_fields() {
                let set: HashSet<String> = table
                    .rows
                    .iter()
                    .filter_map(|row| row.get(&field.name))
                    .map(Value::to_string)
                    .collect();
                values.insert((table.export_name.clone(), field.name.clone()), set);
            }
        }
        Self { values }
    }

    /// Whether `value` appears in `table.field`; unknown targets contain nothing
    pub fn contains(&self, table: &str, field: &str, value: &str) -> bool {
        self.values
            .get(&(table.to_string(), field.to_string()))
            .is_some_and(|set| set.contains(value))
    }
}

/// Fields tagged `CheckLink:<table>_<field>[_<ignores>]` must only hold
/// values present in the target field. Map fields are not checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkValidator;

impl Validator for LinkValidator {
    fn name(&self) -> &'static str {
        "link"
    }

    fn validate(&self, tables: &[MergedTable]) -> Vec<Diagnostic> {
        let index = LinkIndex::build(tables);
        collect_parallel(tables, |table| check_links(&index, table))
    }
}

fn check_links(index: &LinkIndex, table: &MergedTable) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for field in &table.fields {
        for link in field.tags.links() {
            match link {
                Ok(spec) => check_link_field(index, table, field, &spec, &mut diagnostics),
                Err(payload) => diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::MalformedLinkTag,
                        &table.export_name,
                        format!(
                            "[{}:{}] field '{}' has malformed link tag '{}:{}'",
                            table.source.display(),
                            table.export_name,
                            field.name,
                            tags::CHECK_LINK,
                            payload
                        ),
                    )
                    .with_field(&field.name),
                ),
            }
        }
    }
    diagnostics
}

fn check_link_field(
    index: &LinkIndex,
    table: &MergedTable,
    field: &FieldMeta,
    spec: &LinkSpec,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for row in &table.rows {
        let Some(value) = row.get(&field.name) else {
            continue;
        };
        let candidates: &[Value] = match (&field.descriptor, value) {
            (TypeDescriptor::Map(..), _) => return,
            (TypeDescriptor::List(_), Value::List(items)) => items,
            _ => std::slice::from_ref(value),
        };
        for candidate in candidates {
            let text = candidate.to_string();
            if spec.is_ignored(&text) || index.contains(&spec.table, &spec.field, &text) {
                continue;
            }
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::BrokenLink,
                    &table.export_name,
                    format!(
                        "[{}:{}] field '{}' value '{}' not found in [{}:{}]",
                        table.source.display(),
                        table.export_name,
                        field.name,
                        text,
                        spec.table,
                        spec.field
                    ),
                )
                .with_field(&field.name)
                .with_value(&text),
            );
        }
    }
}

/// Export names must be identifiers and must not come from two different
/// source files
#[derive(Debug, Default, Clone, Copy)]
pub struct ExportNameValidator;

impl Validator for ExportNameValidator {
    fn name(&self) -> &'static str {
        "export-name"
    }

    fn validate(&self, tables: &[MergedTable]) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut first_seen: HashMap<&str, &MergedTable> = HashMap::new();

        for table in tables {
            if !is_identifier(&table.export_name) {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::IllegalExportName,
                    &table.export_name,
                    format!(
                        "[{}] illegal export name '{}': use ASCII letters and digits, starting with a letter",
                        table.source.display(),
                        table.export_name
                    ),
                ));
            }

            match first_seen.get(table.export_name.as_str()) {
                Some(first) if first.fingerprint != table.fingerprint => {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::ExportNameCollision,
                        &table.export_name,
                        format!(
                            "export name '{}' is produced by more than one workbook: [{}] vs [{}]",
                            table.export_name,
                            table.source.display(),
                            first.source.display()
                        ),
                    ));
                }
                Some(_) => {}
                None => {
                    first_seen.insert(&table.export_name, table);
                }
            }
        }
        diagnostics
    }
}
