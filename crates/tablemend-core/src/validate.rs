//! Structural validation of a [`TableSchemaSpec`].
//!
//! Validation runs in two phases. [`validate_spec`] needs nothing but the
//! spec and runs before any I/O. [`check_index_columns`] needs the live
//! column set and runs right after the inspection pass.

use std::collections::{BTreeSet, HashSet};

use crate::error::SpecError;
use crate::models::TableSchemaSpec;

/// Reject empty or duplicated names and column-less indexes.
pub fn validate_spec(spec: &TableSchemaSpec) -> Result<(), SpecError> {
    let table = spec.table.trim();
    if table.is_empty() {
        return Err(SpecError::EmptyTableName);
    }

    let mut seen = HashSet::new();
    for col in &spec.columns {
        if col.name.trim().is_empty() {
            return Err(SpecError::EmptyColumnName {
                table: table.to_string(),
            });
        }
        if !seen.insert(col.name.as_str()) {
            return Err(SpecError::DuplicateColumn {
                table: table.to_string(),
                column: col.name.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    for idx in &spec.indexes {
        if idx.name.trim().is_empty() {
            return Err(SpecError::EmptyIndexName {
                table: table.to_string(),
            });
        }
        if !seen.insert(idx.name.as_str()) {
            return Err(SpecError::DuplicateIndex {
                table: table.to_string(),
                index: idx.name.clone(),
            });
        }
        if idx.columns.is_empty() {
            return Err(SpecError::EmptyIndexColumns {
                table: table.to_string(),
                index: idx.name.clone(),
            });
        }
    }

    Ok(())
}

/// Every index column must be declared in the spec or already present.
///
/// `present` holds normalized names; `normalize` is applied to both sides.
pub fn check_index_columns<N>(
    spec: &TableSchemaSpec,
    present: &BTreeSet<String>,
    normalize: N,
) -> Result<(), SpecError>
where
    N: Fn(&str) -> String,
{
    for idx in &spec.indexes {
        for column in &idx.columns {
            let key = normalize(column);
            let declared = spec.columns.iter().any(|c| normalize(&c.name) == key);
            if !declared && !present.contains(&key) {
                return Err(SpecError::UnknownIndexColumn {
                    table: spec.table.clone(),
                    index: idx.name.clone(),
                    column: column.clone(),
                });
            }
        }
    }
    Ok(())
}
