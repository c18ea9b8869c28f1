//! `tablemend bootstrap`: the deployment entry point.
//!
//! Reconciles every configured table, then runs every dedup rule against
//! the reconciled schema. Safe to run on every deploy.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use tablemend_core::reconcile::ReconciliationReport;

use crate::config::Config;
use crate::db;
use crate::dedup_cmd::{dedup_tables, DedupOutcome};
use crate::reconcile_cmd::reconcile_tables;
use crate::report;

#[derive(Debug, Serialize)]
pub struct BootstrapReport {
    pub reconciliation: Vec<ReconciliationReport>,
    pub dedup: Vec<DedupOutcome>,
}

impl BootstrapReport {
    pub fn failure_count(&self) -> usize {
        let schema: usize = self.reconciliation.iter().map(|r| r.failures().count()).sum();
        let dedup: usize = self.dedup.iter().map(DedupOutcome::failure_count).sum();
        schema + dedup
    }
}

pub async fn bootstrap(config: &Config) -> Result<BootstrapReport> {
    let store = db::open_store(config).await?;
    let reconciliation = reconcile_tables(config, &store, None).await?;
    let dedup = dedup_tables(config, &store, None, false).await?;
    store.pool().close().await;

    let report = BootstrapReport {
        reconciliation,
        dedup,
    };
    info!(
        tables = report.reconciliation.len(),
        dedup_rules = report.dedup.len(),
        failures = report.failure_count(),
        "bootstrap finished"
    );
    Ok(report)
}

pub async fn run_bootstrap(config: &Config, json: bool) -> Result<()> {
    let result = bootstrap(config).await?;

    if json {
        report::print_json(&result)?;
    } else {
        for r in &result.reconciliation {
            report::print_reconciliation(r);
        }
        for outcome in &result.dedup {
            report::print_dedup_outcome(outcome);
        }
    }

    let failed = result.failure_count();
    if failed > 0 {
        anyhow::bail!("bootstrap finished with {} failure(s)", failed);
    }
    Ok(())
}
