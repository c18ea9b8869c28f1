//! Duplicate resolver: collapse records sharing a business key.
//!
//! The resolver works on a snapshot taken with a single
//! [`select_all`](RecordStore::select_all). Records inserted after the
//! snapshot are invisible to that run.
//!
//! # Survivor rule
//!
//! Within a group, records are ordered by `created_at` descending, then by
//! id descending ([`Record::newest_first`]). The first one survives; the
//! rest are deleted one by one. A failed delete is recorded and the run
//! moves on.
//!
//! Records for which the key extractor yields `None` are never grouped and
//! never removed.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{FailureReason, StoreError};
use crate::models::{DuplicateGroupKey, Payload, Record, RecordId};
use crate::store::RecordStore;

/// Records sharing one key, survivor first. Never empty.
///
/// Only [`plan_duplicates`] builds groups, so the survivor always exists.
#[derive(Debug, Clone)]
pub struct RecordGroup {
    key: DuplicateGroupKey,
    records: Vec<Record>,
}

impl RecordGroup {
    pub fn key(&self) -> &DuplicateGroupKey {
        &self.key
    }

    /// Every record with this key, newest first.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn survivor(&self) -> &Record {
        &self.records[0]
    }

    pub fn redundant(&self) -> &[Record] {
        &self.records[1..]
    }

    pub fn has_duplicates(&self) -> bool {
        self.records.len() > 1
    }
}

/// Grouping of a snapshot, before any deletion.
#[derive(Debug, Clone)]
pub struct DuplicatePlan {
    pub scanned: usize,
    /// One group per distinct key, ordered by key.
    pub groups: Vec<RecordGroup>,
    pub unkeyed: Vec<RecordId>,
}

impl DuplicatePlan {
    pub fn duplicate_groups(&self) -> impl Iterator<Item = &RecordGroup> {
        self.groups.iter().filter(|g| g.has_duplicates())
    }

    /// Ids that a resolution run would delete, in deletion order.
    pub fn removals(&self) -> Vec<RecordId> {
        self.duplicate_groups()
            .flat_map(|g| g.redundant().iter().map(|r| r.id.clone()))
            .collect()
    }

    fn into_report(self, table: &str, dry_run: bool) -> ResolutionReport {
        let survivors = self
            .duplicate_groups()
            .map(|g| (g.key.clone(), g.survivor().id.clone()))
            .collect();
        ResolutionReport {
            table: table.to_string(),
            scanned: self.scanned,
            distinct_keys: self.groups.len(),
            duplicate_keys: self.duplicate_groups().count(),
            survivors,
            removed: Vec::new(),
            failed: Vec::new(),
            unkeyed: self.unkeyed,
            dry_run,
        }
    }
}

/// A delete that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalFailure {
    pub id: RecordId,
    pub reason: FailureReason,
}

/// Result of one resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub table: String,
    pub scanned: usize,
    pub distinct_keys: usize,
    pub duplicate_keys: usize,
    /// Survivor per key that had duplicates.
    pub survivors: BTreeMap<DuplicateGroupKey, RecordId>,
    pub removed: Vec<RecordId>,
    pub failed: Vec<RemovalFailure>,
    /// Records excluded from grouping because they yielded no key.
    pub unkeyed: Vec<RecordId>,
    /// When set, `removed` lists what *would* be removed.
    pub dry_run: bool,
}

impl ResolutionReport {
    pub fn survivor(&self, key: &str) -> Option<&RecordId> {
        self.survivors.get(&DuplicateGroupKey::new(key))
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Group `records` by key and pick a survivor per group. Pure.
pub fn plan_duplicates<F>(records: Vec<Record>, key_extractor: F) -> DuplicatePlan
where
    F: Fn(&Payload) -> Option<DuplicateGroupKey>,
{
    let scanned = records.len();
    let mut by_key: BTreeMap<DuplicateGroupKey, Vec<Record>> = BTreeMap::new();
    let mut unkeyed = Vec::new();

    for record in records {
        match key_extractor(&record.payload) {
            Some(key) => by_key.entry(key).or_default().push(record),
            None => unkeyed.push(record.id),
        }
    }

    let groups = by_key
        .into_iter()
        .map(|(key, mut records)| {
            records.sort_by(Record::newest_first);
            RecordGroup { key, records }
        })
        .collect();

    DuplicatePlan {
        scanned,
        groups,
        unkeyed,
    }
}

/// Snapshot `table` and report what [`resolve_duplicates`] would remove.
pub async fn preview_duplicates<F, S>(
    table: &str,
    key_extractor: F,
    store: &S,
) -> Result<ResolutionReport, StoreError>
where
    F: Fn(&Payload) -> Option<DuplicateGroupKey>,
    S: RecordStore + ?Sized,
{
    let records = store.select_all(table).await?;
    let plan = plan_duplicates(records, key_extractor);
    let removals = plan.removals();
    let mut report = plan.into_report(table, true);
    report.removed = removals;
    Ok(report)
}

/// Collapse every duplicate group of `table` down to its survivor.
///
/// Returns `Err` only if the snapshot itself cannot be taken. Individual
/// delete failures are recorded in [`ResolutionReport::failed`].
pub async fn resolve_duplicates<F, S>(
    table: &str,
    key_extractor: F,
    store: &S,
) -> Result<ResolutionReport, StoreError>
where
    F: Fn(&Payload) -> Option<DuplicateGroupKey>,
    S: RecordStore + ?Sized,
{
    let records = store.select_all(table).await?;
    let plan = plan_duplicates(records, key_extractor);
    let removals = plan.removals();
    let mut report = plan.into_report(table, false);

    for id in removals {
        match store.delete_by_id(table, &id).await {
            Ok(()) => {
                debug!(table, id = %id, "duplicate removed");
                report.removed.push(id);
            }
            Err(err) => {
                warn!(table, id = %id, error = %err, "failed to remove duplicate");
                report.failed.push(RemovalFailure {
                    id,
                    reason: FailureReason::from(&err),
                });
            }
        }
    }

    info!(
        table,
        scanned = report.scanned,
        duplicate_keys = report.duplicate_keys,
        removed = report.removed.len(),
        failed = report.failed.len(),
        "duplicate resolution finished"
    );
    Ok(report)
}
