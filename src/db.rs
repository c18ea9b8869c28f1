//! SQLite database connection management.
//!
//! Read-write pools enable WAL mode and create the database file and its
//! parent directories if they don't exist. Read-only pools never create
//! anything and are used for inspection (`tablemend check`).

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Create a read-write connection pool to the configured database.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}

/// Open the configured database read-only. Fails if it does not exist.
pub async fn connect_read_only(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database read-only: {}", db_path.display()))?;

    Ok(pool)
}

/// Read-write [`SqliteStore`] with the record layouts of every dedup rule.
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = connect(config).await?;
    Ok(with_layouts(SqliteStore::new(pool), config))
}

/// Read-only [`SqliteStore`]; every write through it is `PermissionDenied`.
pub async fn open_store_read_only(config: &Config) -> Result<SqliteStore> {
    let pool = connect_read_only(config).await?;
    Ok(with_layouts(SqliteStore::new(pool), config))
}

fn with_layouts(store: SqliteStore, config: &Config) -> SqliteStore {
    config
        .dedup
        .iter()
        .fold(store, |store, rule| store.with_layout(&rule.table, rule.layout()))
}
