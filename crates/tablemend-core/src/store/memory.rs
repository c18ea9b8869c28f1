//! In-memory [`SchemaInspector`] + [`RecordStore`] for tests and embedding.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Failures can be injected per DDL target or per record id to exercise
//! the failure paths of the reconciler and the resolver.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{ColumnType, DdlIntent, Record, RecordId};

use super::{RecordStore, SchemaInspector};

#[derive(Default)]
struct MemTable {
    /// Column name to observed type, in insertion order.
    columns: Vec<(String, String)>,
    indexes: BTreeSet<String>,
    records: Vec<Record>,
}

/// In-memory store with optional fault injection.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, MemTable>>,
    ddl_failures: RwLock<HashMap<(String, String), StoreError>>,
    delete_failures: RwLock<HashMap<(String, RecordId), StoreError>>,
    ddl_log: RwLock<Vec<DdlIntent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table with the given `(name, type)` columns.
    pub fn create_table(&self, table: &str, columns: &[(&str, &str)]) {
        let mut tables = self.tables.write().unwrap();
        tables.insert(
            table.to_string(),
            MemTable {
                columns: columns
                    .iter()
                    .map(|(n, t)| (n.to_string(), t.to_string()))
                    .collect(),
                ..MemTable::default()
            },
        );
    }

    /// Register an existing index on a table.
    pub fn add_index(&self, table: &str, name: &str) {
        let mut tables = self.tables.write().unwrap();
        if let Some(t) = tables.get_mut(table) {
            t.indexes.insert(name.to_string());
        }
    }

    pub fn insert(&self, table: &str, record: Record) {
        let mut tables = self.tables.write().unwrap();
        tables.entry(table.to_string()).or_default().records.push(record);
    }

    /// Make every schema change targeting `name` (column or index) fail.
    pub fn fail_schema_change(&self, table: &str, name: &str, err: StoreError) {
        self.ddl_failures
            .write()
            .unwrap()
            .insert((table.to_string(), name.to_string()), err);
    }

    /// Make deleting `id` fail.
    pub fn fail_delete(&self, table: &str, id: impl Into<RecordId>, err: StoreError) {
        self.delete_failures
            .write()
            .unwrap()
            .insert((table.to_string(), id.into()), err);
    }

    /// Every schema change successfully applied, in order.
    pub fn applied_changes(&self) -> Vec<DdlIntent> {
        self.ddl_log.read().unwrap().clone()
    }

    /// Current records of a table (empty if the table is absent).
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .unwrap()
            .get(table)
            .map(|t| t.records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SchemaInspector for InMemoryStore {
    async fn list_columns(&self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        let tables = self.tables.read().unwrap();
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.columns.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn list_indexes(&self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        let tables = self.tables.read().unwrap();
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.indexes.clone())
    }

    async fn column_types(&self, table: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let tables = self.tables.read().unwrap();
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        Ok(t.columns.iter().cloned().collect())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn execute_schema_change(&self, intent: &DdlIntent) -> Result<(), StoreError> {
        let key = (intent.table().to_string(), intent.target_name().to_string());
        if let Some(err) = self.ddl_failures.read().unwrap().get(&key) {
            return Err(err.clone());
        }

        let mut tables = self.tables.write().unwrap();
        let t = tables
            .get_mut(intent.table())
            .ok_or_else(|| StoreError::TableNotFound(intent.table().to_string()))?;

        match intent {
            DdlIntent::AddColumn { column, .. } => {
                if t.columns.iter().any(|(n, _)| n == &column.name) {
                    return Err(StoreError::Backend {
                        code: None,
                        message: format!("duplicate column name: {}", column.name),
                    });
                }
                // References are stored untyped, as SQLite does.
                let observed = match &column.column_type {
                    ColumnType::Reference { .. } => String::new(),
                    other => other.to_string(),
                };
                t.columns.push((column.name.clone(), observed));
            }
            DdlIntent::CreateIndex { index, .. } => {
                if let Some(missing) = index
                    .columns
                    .iter()
                    .find(|c| !t.columns.iter().any(|(n, _)| n == *c))
                {
                    return Err(StoreError::Backend {
                        code: None,
                        message: format!("no such column: {missing}"),
                    });
                }
                if !t.indexes.insert(index.name.clone()) {
                    return Err(StoreError::Backend {
                        code: None,
                        message: format!("index {} already exists", index.name),
                    });
                }
            }
        }

        self.ddl_log.write().unwrap().push(intent.clone());
        Ok(())
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.read().unwrap();
        tables
            .get(table)
            .map(|t| t.records.clone())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    async fn delete_by_id(&self, table: &str, id: &RecordId) -> Result<(), StoreError> {
        if let Some(err) = self
            .delete_failures
            .read()
            .unwrap()
            .get(&(table.to_string(), id.clone()))
        {
            return Err(err.clone());
        }
        let mut tables = self.tables.write().unwrap();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        t.records.retain(|r| &r.id != id);
        Ok(())
    }
}
