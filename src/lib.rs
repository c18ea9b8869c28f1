//! # Tablemend
//!
//! Declarative schema reconciliation and duplicate cleanup for SQLite
//! application databases.
//!
//! The engine lives in [`tablemend_core`]: a reconciler that adds whatever
//! columns and indexes a live table is missing, and a resolver that
//! collapses records sharing a business key down to the newest one. This
//! crate supplies the SQLite collaborators, the TOML configuration, and the
//! `tablemend` CLI.
//!
//! ```text
//! ┌────────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │ tablemend.toml │──▶│ tablemend-core  │──▶│    SQLite    │
//! │ tables / dedup │   │ reconcile/dedup │   │ (SqliteStore)│
//! └────────────────┘   └────────┬────────┘   └──────────────┘
//!                               ▼
//!                      reports (text / JSON)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tablemend check                  # what is missing, nothing written
//! tablemend reconcile              # add missing columns and indexes
//! tablemend dedup --dry-run        # preview duplicate removal
//! tablemend bootstrap              # reconcile everything, then dedup
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`keys`] | Business-key extraction and normalization |
//! | [`db`] | Database connection |
//! | [`ddl`] | SQLite DDL rendering |
//! | [`sqlite_store`] | `SchemaInspector` / `RecordStore` over SQLite |
//! | [`report`] | Report rendering |
//! | [`check`], [`reconcile_cmd`], [`dedup_cmd`], [`bootstrap`] | CLI commands |

pub mod bootstrap;
pub mod check;
pub mod config;
pub mod db;
pub mod ddl;
pub mod dedup_cmd;
pub mod keys;
pub mod reconcile_cmd;
pub mod report;
pub mod sqlite_store;
