//! SQLite-backed [`SchemaInspector`] and [`RecordStore`].
//!
//! Inspection goes through `sqlite_master` and the `pragma_table_info` /
//! `pragma_index_list` table-valued functions. Schema changes are rendered
//! by [`crate::ddl`]. Rows are read into JSON payloads; the id and
//! `created_at` columns are located through a per-table [`RecordLayout`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, warn};

use tablemend_core::error::StoreError;
use tablemend_core::models::{DdlIntent, Payload, Record, RecordId};
use tablemend_core::store::{RecordStore, SchemaInspector};

use crate::ddl::{self, quote_ident};

/// Which columns carry the record id and creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    pub id_column: String,
    pub created_at_column: String,
}

impl Default for RecordLayout {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            created_at_column: "created_at".to_string(),
        }
    }
}

/// SQLite implementation of both collaborator traits.
pub struct SqliteStore {
    pool: SqlitePool,
    default_layout: RecordLayout,
    layouts: HashMap<String, RecordLayout>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            default_layout: RecordLayout::default(),
            layouts: HashMap::new(),
        }
    }

    /// Use `layout` when reading or deleting records of `table`.
    pub fn with_layout(mut self, table: &str, layout: RecordLayout) -> Self {
        self.layouts.insert(table.to_string(), layout);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn layout(&self, table: &str) -> &RecordLayout {
        self.layouts.get(table).unwrap_or(&self.default_layout)
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn require_table(&self, table: &str) -> Result<(), StoreError> {
        if self.table_exists(table).await? {
            Ok(())
        } else {
            Err(StoreError::TableNotFound(table.to_string()))
        }
    }
}

/// Map an sqlx error onto the store error taxonomy.
pub fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => StoreError::classify(db.code().as_deref(), db.message()),
        other => StoreError::Backend {
            code: None,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl SchemaInspector for SqliteStore {
    async fn list_columns(&self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.column_types(table).await?.into_keys().collect())
    }

    async fn list_indexes(&self, table: &str) -> Result<BTreeSet<String>, StoreError> {
        self.require_table(table).await?;
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_index_list(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(names.into_iter().collect())
    }

    async fn column_types(&self, table: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.require_table(table).await?;
        let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name")?;
                let ty: String = row.try_get("type")?;
                Ok((name, ty))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(store_error)
    }

    /// SQLite identifiers are case-insensitive for ASCII letters.
    fn normalize_name(&self, name: &str) -> String {
        name.to_ascii_lowercase()
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn execute_schema_change(&self, intent: &DdlIntent) -> Result<(), StoreError> {
        let sql = ddl::render(intent);
        debug!(%sql, "executing schema change");
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let layout = self.layout(table);
        let sql = format!("SELECT * FROM {}", quote_ident(table));
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        if let Some(first) = rows.first() {
            if first.try_column(layout.created_at_column.as_str()).is_err() {
                warn!(
                    table,
                    column = %layout.created_at_column,
                    "created_at column not found; duplicates will be ordered by id only"
                );
            }
        }

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in &rows {
            let payload = row_to_payload(row).map_err(store_error)?;
            match record_from_payload(table, layout, payload)? {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                table,
                column = %layout.id_column,
                skipped,
                "rows without an integer or text id were left out of the snapshot"
            );
        }
        Ok(records)
    }

    async fn delete_by_id(&self, table: &str, id: &RecordId) -> Result<(), StoreError> {
        let layout = self.layout(table);
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(table),
            quote_ident(&layout.id_column)
        );
        let query = sqlx::query(&sql);
        let query = match id {
            RecordId::Int(v) => query.bind(*v),
            RecordId::Text(v) => query.bind(v.as_str()),
        };
        query.execute(&self.pool).await.map_err(store_error)?;
        Ok(())
    }
}

/// Read every column of a row into a JSON object, by storage class.
fn row_to_payload(row: &SqliteRow) -> Result<Payload, sqlx::Error> {
    let mut payload = Payload::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" | "NUMERIC" => {
                    serde_json::Number::from_f64(row.try_get_unchecked::<f64, _>(i)?)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "BLOB" => Value::String(hex::encode(row.try_get_unchecked::<Vec<u8>, _>(i)?)),
                _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        payload.insert(column.name().to_string(), value);
    }
    Ok(payload)
}

/// Build a [`Record`] from a row payload.
///
/// Returns `Ok(None)` for a row whose id is NULL or neither integer nor
/// text; such rows can't be addressed by `delete_by_id`. A layout naming an
/// id column the table doesn't have is an error.
fn record_from_payload(
    table: &str,
    layout: &RecordLayout,
    payload: Payload,
) -> Result<Option<Record>, StoreError> {
    let id = match payload.get(&layout.id_column) {
        Some(Value::Number(n)) if n.is_i64() => RecordId::Int(n.as_i64().unwrap_or_default()),
        Some(Value::String(s)) => RecordId::Text(s.clone()),
        Some(_) => return Ok(None),
        None => {
            return Err(StoreError::Backend {
                code: None,
                message: format!(
                    "table '{}' has no id column '{}'",
                    table, layout.id_column
                ),
            })
        }
    };
    let created_at = payload
        .get(&layout.created_at_column)
        .and_then(parse_timestamp);
    Ok(Some(Record {
        id,
        created_at,
        payload,
    }))
}

/// Parse a stored creation time.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f][offset]` (SQLite's
/// `CURRENT_TIMESTAMP` and Postgres text output), a bare date, and integer
/// epoch seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let v = n.as_i64()?;
            // Anything past year 5138 in seconds is taken to be milliseconds.
            if v.abs() >= 100_000_000_000 {
                DateTime::from_timestamp(v.div_euclid(1000), (v.rem_euclid(1000) * 1_000_000) as u32)
            } else {
                DateTime::from_timestamp(v, 0)
            }
        }
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
