//! Merge resolver: unifies every sheet sharing an export name into one table

use crate::coerce::{Coercer, Coercion};
use crate::error::{Error, Result};
use crate::registry::TypeRegistry;
use crate::table::{FieldMeta, MergedTable, Row, TableRecord};
use std::collections::HashMap;
use tracing::debug;

/// Merge per-sheet records by export name.
///
/// Groups keep the order in which each export name first appears; members
/// of a group keep their input order. Rows of every merged table are
/// back-filled so each carries every non-ignored field.
pub fn merge_tables(registry: &TypeRegistry, records: Vec<TableRecord>) -> Result<Vec<MergedTable>> {
    let mut groups: Vec<(TableRecord, Vec<TableRecord>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        match index.get(&record.export_name) {
            Some(&i) => groups[i].1.push(record),
            None => {
                index.insert(record.export_name.clone(), groups.len());
                groups.push((record, Vec::new()));
            }
        }
    }

    let coercer = Coercer::new(registry);
    groups
        .into_iter()
        .map(|(first, rest)| merge_group(&coercer, first, rest))
        .collect()
}

fn merge_group(
    coercer: &Coercer<'_>,
    first: TableRecord,
    rest: Vec<TableRecord>,
) -> Result<MergedTable> {
    let first_location = first.location();
    let mut merged = MergedTable {
        export_name: first.export_name,
        fields: first.fields,
        rows: first.rows,
        sheets: vec![first.sheet],
        source: first.source,
        fingerprint: first.fingerprint,
    };
    // where each merged field was first declared
    let mut declared_at: Vec<String> = vec![first_location; merged.fields.len()];

    for member in rest {
        let location = member.location();
        for field in member.fields {
            match merged.fields.iter().position(|f| f.name == field.name) {
                Some(i) => {
                    let existing = &mut merged.fields[i];
                    if existing.descriptor != field.descriptor {
                        return Err(Error::FieldTypeConflict {
                            table: merged.export_name.clone(),
                            field: field.name,
                            existing_type: existing.descriptor.to_string(),
                            existing_location: declared_at[i].clone(),
                            new_type: field.descriptor.to_string(),
                            new_location: location,
                        });
                    }
                    existing.tags.union(&field.tags);
                    if existing.doc.is_empty() {
                        existing.doc = field.doc;
                    }
                }
                None => {
                    merged.fields.push(field);
                    declared_at.push(location.clone());
                }
            }
        }
        merged.rows.extend(member.rows);
        merged.sheets.push(member.sheet);
    }

    back_fill(coercer, &mut merged)?;

    debug!(
        export_name = %merged.export_name,
        sheets = merged.sheets.len(),
        fields = merged.fields.len(),
        rows = merged.rows.len(),
        "merged table"
    );
    Ok(merged)
}

// Rebuild every row in merged field order, filling absent fields with the
// field's default resolved once against its merged tags
fn back_fill(coercer: &Coercer<'_>, table: &mut MergedTable) -> Result<()> {
    let data_fields: Vec<&FieldMeta> = table.data_fields().collect();

    let mut defaults = Vec::with_capacity(data_fields.len());
    for field in &data_fields {
        let needed = table.rows.iter().any(|row| !row.contains(&field.name));
        let default = if needed {
            let value = coercer
                .resolve_default(Coercion::new(&field.descriptor, &field.tags))
                .map_err(|source| Error::BackFill {
                    table: table.export_name.clone(),
                    field: field.name.clone(),
                    source,
                })?;
            Some(value)
        } else {
            None
        };
        defaults.push(default);
    }

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let mut filled = Row::new();
        for (field, default) in data_fields.iter().zip(&defaults) {
            if let Some(value) = row.get(&field.name).or(default.as_ref()) {
                filled.insert(field.name.clone(), value.clone());
            }
        }
        rows.push(filled);
    }

    table.rows = rows;
    Ok(())
}
