//! `tablemend check`: read-only drift report.
//!
//! Opens the database read-only, plans every configured table, and previews
//! every dedup rule. Nothing is written.

use anyhow::Result;

use tablemend_core::reconcile::{plan, SchemaPlan};

use crate::config::Config;
use crate::db;
use crate::dedup_cmd::dedup_tables;
use crate::report;
use crate::sqlite_store::SqliteStore;

/// Plan every configured table (or just `only`) against `store`.
pub async fn plan_tables(
    config: &Config,
    store: &SqliteStore,
    only: Option<&str>,
) -> Result<Vec<SchemaPlan>> {
    let mut plans = Vec::new();
    for spec in config.table_specs(only)? {
        plans.push(plan(&spec, store).await?);
    }
    Ok(plans)
}

pub async fn run_check(config: &Config, only: Option<&str>) -> Result<()> {
    // With --table, a table may have a schema entry, a dedup rule, or both.
    let has_schema = only.map_or(true, |name| config.tables.iter().any(|t| t.name == name));
    let has_rule = only.map_or(true, |name| config.dedup.iter().any(|r| r.table == name));
    if !has_schema && !has_rule {
        anyhow::bail!("Table '{}' is not configured", only.unwrap_or_default());
    }

    let store = db::open_store_read_only(config).await?;

    let plans = if has_schema {
        plan_tables(config, &store, only).await?
    } else {
        Vec::new()
    };
    for p in &plans {
        report::print_plan(p);
    }

    if has_rule {
        for outcome in dedup_tables(config, &store, only, true).await? {
            report::print_dedup_outcome(&outcome);
        }
    }
    store.pool().close().await;

    let drifted = plans.iter().filter(|p| !p.is_compliant()).count();
    if drifted > 0 {
        anyhow::bail!("{} table(s) out of date; run `tablemend reconcile`", drifted);
    }
    Ok(())
}
