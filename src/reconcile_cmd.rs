//! `tablemend reconcile`: add missing columns and indexes.

use anyhow::Result;

use tablemend_core::reconcile::{reconcile, ReconciliationReport};

use crate::config::Config;
use crate::db;
use crate::report;
use crate::sqlite_store::SqliteStore;

/// Reconcile every configured table (or just `only`) against `store`.
///
/// Store failures end up in the reports; only a malformed spec errors.
pub async fn reconcile_tables(
    config: &Config,
    store: &SqliteStore,
    only: Option<&str>,
) -> Result<Vec<ReconciliationReport>> {
    let mut reports = Vec::new();
    for spec in config.table_specs(only)? {
        reports.push(reconcile(&spec, store, store).await?);
    }
    Ok(reports)
}

pub async fn run_reconcile(config: &Config, only: Option<&str>, json: bool) -> Result<()> {
    let store = db::open_store(config).await?;
    let reports = reconcile_tables(config, &store, only).await?;
    store.pool().close().await;

    if json {
        report::print_json(&reports)?;
    } else {
        for r in &reports {
            report::print_reconciliation(r);
        }
    }

    let failed: usize = reports.iter().map(|r| r.failures().count()).sum();
    if failed > 0 {
        anyhow::bail!("{} schema item(s) failed to reconcile", failed);
    }
    Ok(())
}
