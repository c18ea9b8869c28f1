//! Collaborator traits for the reconciler and the duplicate resolver.
//!
//! The core never talks to a database directly. Callers inject a
//! [`SchemaInspector`] (what does the table look like now?) and a
//! [`RecordStore`] (apply a schema change, read rows, delete a row).
//! A single backend usually implements both.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`list_columns`](SchemaInspector::list_columns) | Existing column names |
//! | [`column_types`](SchemaInspector::column_types) | Observed column types, if known |
//! | [`list_indexes`](SchemaInspector::list_indexes) | Existing index names |
//! | [`normalize_name`](SchemaInspector::normalize_name) | Identifier identity (case folding) |
//! | [`execute_schema_change`](RecordStore::execute_schema_change) | Apply one [`DdlIntent`] |
//! | [`select_all`](RecordStore::select_all) | Snapshot every record of a table |
//! | [`delete_by_id`](RecordStore::delete_by_id) | Remove one record |

pub mod memory;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{DdlIntent, Record, RecordId};

/// Reports the committed shape of a table.
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    /// Names of the columns currently present.
    ///
    /// Returns [`StoreError::TableNotFound`] if the table does not exist.
    async fn list_columns(&self, table: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Names of the indexes currently present.
    async fn list_indexes(&self, table: &str) -> Result<BTreeSet<String>, StoreError>;

    /// Observed type of each present column, keyed by column name.
    ///
    /// Stores that cannot report types return an empty map, which turns
    /// off type-conflict detection.
    async fn column_types(&self, _table: &str) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(BTreeMap::new())
    }

    /// Canonical form of a column or index name, used for every
    /// present/missing comparison.
    ///
    /// Names compare exactly by default. Backends whose identifiers are
    /// case-insensitive fold case here.
    fn normalize_name(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Applies schema changes and reads/deletes records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn execute_schema_change(&self, intent: &DdlIntent) -> Result<(), StoreError>;

    /// Every record of the table, in no particular order.
    async fn select_all(&self, table: &str) -> Result<Vec<Record>, StoreError>;

    async fn delete_by_id(&self, table: &str, id: &RecordId) -> Result<(), StoreError>;
}
