//! Schema reconciler: add missing columns and indexes, never alter.
//!
//! # Algorithm
//!
//! 1. Validate the spec ([`validate_spec`]).
//! 2. Inspect the table once: columns, column types, indexes. An
//!    inspection failure marks every item `FailedToAdd` with that reason
//!    and no change is issued.
//! 3. Check that every index column is declared or present.
//! 4. Add missing columns, in declared order.
//! 5. Create missing indexes (by name), in declared order. An index is
//!    skipped with `DependencyMissing` if one of its columns failed to be
//!    added in this run, or with `TypeConflict` if one of its existing
//!    columns has an observed type the declared column type cannot hold.
//!
//! Items are independent: one failure never stops the run. Existing
//! columns are never altered.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{FailureReason, SpecError, StoreError};
use crate::models::{DdlIntent, IndexSpec, TableSchemaSpec};
use crate::store::{RecordStore, SchemaInspector};
use crate::validate::{check_index_columns, validate_spec};

/// Outcome for one column or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    AlreadyPresent,
    Added,
    FailedToAdd(FailureReason),
}

impl ItemStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, ItemStatus::FailedToAdd(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub name: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// Result of one [`reconcile`] run. One entry per spec item, in spec order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub table: String,
    pub columns: Vec<ItemReport>,
    pub indexes: Vec<ItemReport>,
}

impl ReconciliationReport {
    /// Status of a column entry by name.
    pub fn column(&self, name: &str) -> Option<&ItemStatus> {
        self.columns.iter().find(|i| i.name == name).map(|i| &i.status)
    }

    /// Status of an index entry by name.
    pub fn index(&self, name: &str) -> Option<&ItemStatus> {
        self.indexes.iter().find(|i| i.name == name).map(|i| &i.status)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemReport> {
        self.columns.iter().chain(self.indexes.iter())
    }

    pub fn added_count(&self) -> usize {
        self.items()
            .filter(|i| i.status == ItemStatus::Added)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items().filter(|i| i.status.is_failure())
    }

    /// True when every item is present (added now or before).
    pub fn is_compliant(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Planned state of one item after inspection, before any change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlannedItem {
    Present,
    Missing { intent: DdlIntent },
    Blocked { reason: FailureReason },
}

/// What [`reconcile`] would do, computed from a single inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaPlan {
    pub table: String,
    pub columns: Vec<(String, PlannedItem)>,
    pub indexes: Vec<(String, PlannedItem)>,
}

impl SchemaPlan {
    /// The changes a reconcile run would issue, columns first.
    pub fn intents(&self) -> Vec<&DdlIntent> {
        self.columns
            .iter()
            .chain(self.indexes.iter())
            .filter_map(|(_, item)| match item {
                PlannedItem::Missing { intent } => Some(intent),
                _ => None,
            })
            .collect()
    }

    pub fn is_compliant(&self) -> bool {
        self.columns
            .iter()
            .chain(self.indexes.iter())
            .all(|(_, item)| *item == PlannedItem::Present)
    }
}

/// Live table shape, with every name passed through the inspector's
/// `normalize_name`.
struct Inspection {
    columns: BTreeSet<String>,
    types: BTreeMap<String, String>,
    indexes: BTreeSet<String>,
}

async fn inspect<I>(inspector: &I, table: &str) -> Result<Inspection, StoreError>
where
    I: SchemaInspector + ?Sized,
{
    let norm = |name: &String| inspector.normalize_name(name);
    let columns = inspector.list_columns(table).await?;
    let types = inspector.column_types(table).await?;
    let indexes = inspector.list_indexes(table).await?;
    Ok(Inspection {
        columns: columns.iter().map(norm).collect(),
        types: types.iter().map(|(k, v)| (norm(k), v.clone())).collect(),
        indexes: indexes.iter().map(norm).collect(),
    })
}

/// First column of `index` whose observed type conflicts with its declaration.
fn type_conflict<N>(
    spec: &TableSchemaSpec,
    index: &IndexSpec,
    seen: &Inspection,
    normalize: N,
) -> Option<String>
where
    N: Fn(&str) -> String,
{
    index.columns.iter().find_map(|name| {
        let key = normalize(name);
        let declared = spec.columns.iter().find(|c| normalize(&c.name) == key)?;
        let observed = seen.types.get(&key)?;
        if declared.column_type.accepts_observed(observed) {
            None
        } else {
            Some(format!(
                "column '{name}' is {observed}, index '{}' expects {}",
                index.name, declared.column_type
            ))
        }
    })
}

/// Compute what [`reconcile`] would do, without changing anything.
///
/// Inspection failures are folded into the plan as `Blocked` items. Only a
/// missing table lets the index reference check run against an empty
/// column set; any other inspection failure leaves the live columns
/// unknown and the check is skipped.
pub async fn plan<I>(spec: &TableSchemaSpec, inspector: &I) -> Result<SchemaPlan, SpecError>
where
    I: SchemaInspector + ?Sized,
{
    validate_spec(spec)?;
    let norm = |name: &str| inspector.normalize_name(name);

    let seen = match inspect(inspector, &spec.table).await {
        Ok(seen) => seen,
        Err(err) => {
            warn!(table = %spec.table, error = %err, "schema inspection failed");
            if matches!(err, StoreError::TableNotFound(_)) {
                check_index_columns(spec, &BTreeSet::new(), norm)?;
            }
            let reason = FailureReason::from(&err);
            let blocked = |name: &String| {
                (
                    name.clone(),
                    PlannedItem::Blocked {
                        reason: reason.clone(),
                    },
                )
            };
            return Ok(SchemaPlan {
                table: spec.table.clone(),
                columns: spec.columns.iter().map(|c| blocked(&c.name)).collect(),
                indexes: spec.indexes.iter().map(|i| blocked(&i.name)).collect(),
            });
        }
    };

    check_index_columns(spec, &seen.columns, norm)?;

    let columns = spec
        .columns
        .iter()
        .map(|col| {
            let item = if seen.columns.contains(&norm(&col.name)) {
                PlannedItem::Present
            } else {
                PlannedItem::Missing {
                    intent: DdlIntent::AddColumn {
                        table: spec.table.clone(),
                        column: col.clone(),
                    },
                }
            };
            (col.name.clone(), item)
        })
        .collect();

    let indexes = spec
        .indexes
        .iter()
        .map(|idx| {
            let item = if seen.indexes.contains(&norm(&idx.name)) {
                PlannedItem::Present
            } else if let Some(message) = type_conflict(spec, idx, &seen, norm) {
                PlannedItem::Blocked {
                    reason: FailureReason::TypeConflict { message },
                }
            } else {
                PlannedItem::Missing {
                    intent: DdlIntent::CreateIndex {
                        table: spec.table.clone(),
                        index: idx.clone(),
                    },
                }
            };
            (idx.name.clone(), item)
        })
        .collect();

    Ok(SchemaPlan {
        table: spec.table.clone(),
        columns,
        indexes,
    })
}

/// Bring a live table into agreement with `spec` by adding what is missing.
///
/// Returns `Err` only for a malformed spec. Every store failure is
/// recorded in the report.
pub async fn reconcile<I, S>(
    spec: &TableSchemaSpec,
    inspector: &I,
    store: &S,
) -> Result<ReconciliationReport, SpecError>
where
    I: SchemaInspector + ?Sized,
    S: RecordStore + ?Sized,
{
    let plan = plan(spec, inspector).await?;

    let mut failed_columns: BTreeSet<String> = BTreeSet::new();
    let mut columns = Vec::with_capacity(plan.columns.len());
    for (name, item) in plan.columns {
        let status = apply(store, item).await;
        if status.is_failure() {
            failed_columns.insert(inspector.normalize_name(&name));
        }
        debug!(table = %plan.table, column = %name, status = ?status, "column reconciled");
        columns.push(ItemReport { name, status });
    }

    let mut indexes = Vec::with_capacity(plan.indexes.len());
    for (name, item) in plan.indexes {
        let missing_deps: Vec<String> = match &item {
            PlannedItem::Missing {
                intent: DdlIntent::CreateIndex { index, .. },
            } => index
                .columns
                .iter()
                .filter(|c| failed_columns.contains(&inspector.normalize_name(c)))
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        let status = if missing_deps.is_empty() {
            apply(store, item).await
        } else {
            ItemStatus::FailedToAdd(FailureReason::DependencyMissing {
                columns: missing_deps,
            })
        };
        debug!(table = %plan.table, index = %name, status = ?status, "index reconciled");
        indexes.push(ItemReport { name, status });
    }

    let report = ReconciliationReport {
        table: plan.table,
        columns,
        indexes,
    };
    info!(
        table = %report.table,
        added = report.added_count(),
        failed = report.failures().count(),
        "reconciliation finished"
    );
    Ok(report)
}

async fn apply<S>(store: &S, item: PlannedItem) -> ItemStatus
where
    S: RecordStore + ?Sized,
{
    match item {
        PlannedItem::Present => ItemStatus::AlreadyPresent,
        PlannedItem::Blocked { reason } => ItemStatus::FailedToAdd(reason),
        PlannedItem::Missing { intent } => match store.execute_schema_change(&intent).await {
            Ok(()) => ItemStatus::Added,
            Err(err) => {
                warn!(
                    table = %intent.table(),
                    target = %intent.target_name(),
                    error = %err,
                    "schema change failed"
                );
                ItemStatus::FailedToAdd(FailureReason::from(&err))
            }
        },
    }
}
