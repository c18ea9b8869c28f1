//! `tablemend dedup`: collapse duplicate records by business key.

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use tablemend_core::dedup::{preview_duplicates, resolve_duplicates, ResolutionReport};
use tablemend_core::error::{FailureReason, StoreError};
use tablemend_core::models::Payload;

use crate::config::{Config, DedupConfig};
use crate::db;
use crate::report;
use crate::sqlite_store::SqliteStore;

/// Result of one dedup rule within a multi-rule run.
///
/// A rule whose snapshot could not be taken is `Skipped`; the other rules
/// still run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DedupOutcome {
    Resolved(ResolutionReport),
    Skipped { table: String, skipped: FailureReason },
}

impl DedupOutcome {
    pub fn table(&self) -> &str {
        match self {
            DedupOutcome::Resolved(report) => &report.table,
            DedupOutcome::Skipped { table, .. } => table,
        }
    }

    pub fn report(&self) -> Option<&ResolutionReport> {
        match self {
            DedupOutcome::Resolved(report) => Some(report),
            DedupOutcome::Skipped { .. } => None,
        }
    }

    /// Failed deletes, or 1 for a skipped rule.
    pub fn failure_count(&self) -> usize {
        match self {
            DedupOutcome::Resolved(report) => report.failed.len(),
            DedupOutcome::Skipped { .. } => 1,
        }
    }
}

/// Run one dedup rule. With `dry_run`, nothing is deleted.
pub async fn dedup_table(
    rule: &DedupConfig,
    store: &SqliteStore,
    dry_run: bool,
) -> Result<ResolutionReport, StoreError> {
    let key_rule = rule.key_rule();
    let extract = |payload: &Payload| key_rule.extract(payload);
    if dry_run {
        preview_duplicates(&rule.table, extract, store).await
    } else {
        resolve_duplicates(&rule.table, extract, store).await
    }
}

/// Run every configured dedup rule (or just the one for `only`).
///
/// Only an unknown `only` errors; a failing rule is recorded and the
/// remaining rules still run.
pub async fn dedup_tables(
    config: &Config,
    store: &SqliteStore,
    only: Option<&str>,
    dry_run: bool,
) -> Result<Vec<DedupOutcome>> {
    let mut outcomes = Vec::new();
    for rule in config.dedup_rules(only)? {
        let outcome = match dedup_table(rule, store, dry_run).await {
            Ok(report) => DedupOutcome::Resolved(report),
            Err(err) => {
                warn!(table = %rule.table, error = %err, "dedup rule skipped");
                DedupOutcome::Skipped {
                    table: rule.table.clone(),
                    skipped: FailureReason::from(&err),
                }
            }
        };
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

pub async fn run_dedup(config: &Config, only: Option<&str>, dry_run: bool, json: bool) -> Result<()> {
    let store = if dry_run {
        db::open_store_read_only(config).await?
    } else {
        db::open_store(config).await?
    };
    let outcomes = dedup_tables(config, &store, only, dry_run).await?;
    store.pool().close().await;

    if json {
        report::print_json(&outcomes)?;
    } else {
        for outcome in &outcomes {
            report::print_dedup_outcome(outcome);
        }
    }

    let failed: usize = outcomes.iter().map(DedupOutcome::failure_count).sum();
    if failed > 0 {
        anyhow::bail!("{} dedup failure(s); see report above", failed);
    }
    Ok(())
}
