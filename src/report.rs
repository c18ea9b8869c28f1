//! Human-readable and JSON rendering of run reports.
//!
//! The core crate never prints; every operator-facing line comes from here.

use anyhow::Result;
use serde::Serialize;

use tablemend_core::dedup::ResolutionReport;
use tablemend_core::reconcile::{ItemStatus, PlannedItem, ReconciliationReport, SchemaPlan};

use crate::ddl;
use crate::dedup_cmd::DedupOutcome;

fn status_label(status: &ItemStatus) -> String {
    match status {
        ItemStatus::AlreadyPresent => "present".to_string(),
        ItemStatus::Added => "added".to_string(),
        ItemStatus::FailedToAdd(reason) => format!("FAILED ({})", reason),
    }
}

fn planned_label(item: &PlannedItem) -> String {
    match item {
        PlannedItem::Present => "present".to_string(),
        PlannedItem::Missing { .. } => "missing".to_string(),
        PlannedItem::Blocked { reason } => format!("blocked ({})", reason),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_reconciliation(report: &ReconciliationReport) {
    println!("reconcile {}", report.table);
    for item in &report.columns {
        println!("  {:<8} {:<32} {}", "column", item.name, status_label(&item.status));
    }
    for item in &report.indexes {
        println!("  {:<8} {:<32} {}", "index", item.name, status_label(&item.status));
    }
    println!(
        "  added: {}  failed: {}",
        report.added_count(),
        report.failures().count()
    );
}

/// Print a plan, followed by the SQL that would bring the table in line.
pub fn print_plan(plan: &SchemaPlan) {
    println!("check {}", plan.table);
    for (name, item) in &plan.columns {
        println!("  {:<8} {:<32} {}", "column", name, planned_label(item));
    }
    for (name, item) in &plan.indexes {
        println!("  {:<8} {:<32} {}", "index", name, planned_label(item));
    }

    let intents = plan.intents();
    if intents.is_empty() {
        println!("  up to date");
    } else {
        println!("  -- pending SQL:");
        for intent in intents {
            println!("  {};", ddl::render(intent));
        }
    }
}

pub fn print_resolution(report: &ResolutionReport) {
    let verb = if report.dry_run { "would remove" } else { "removed" };
    println!("dedup {}", report.table);
    println!("  scanned: {}", report.scanned);
    println!("  distinct keys: {}", report.distinct_keys);
    println!("  duplicate keys: {}", report.duplicate_keys);
    println!("  unkeyed: {}", report.unkeyed.len());
    for (key, id) in &report.survivors {
        println!("  keep {:<24} id {}", key, id);
    }
    println!(
        "  {}: {}",
        verb,
        report
            .removed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    for failure in &report.failed {
        println!("  FAILED id {}: {}", failure.id, failure.reason);
    }
}

pub fn print_dedup_outcome(outcome: &DedupOutcome) {
    match outcome {
        DedupOutcome::Resolved(report) => print_resolution(report),
        DedupOutcome::Skipped { table, skipped } => {
            println!("dedup {}", table);
            println!("  skipped: {}", skipped);
        }
    }
}
