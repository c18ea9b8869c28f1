//! Core data models: declared schema, DDL intents, and stored records.
//!
//! A [`TableSchemaSpec`] describes what a table *should* look like. It is
//! supplied fresh by the caller on every run and is never persisted; the
//! database is the source of truth for what the table actually looks like.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic type tag for a declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Boolean,
    Timestamp,
    /// Foreign-key reference to `table(column)`.
    Reference { table: String, column: String },
}

impl ColumnType {
    /// Whether an observed (store-reported) column type can hold values of
    /// this declared type.
    ///
    /// An empty observed type means the store did not report one and is
    /// always accepted. Matching is by type family, so `VARCHAR(32)` is a
    /// text column and `BIGINT` an integer one.
    pub fn accepts_observed(&self, observed: &str) -> bool {
        let observed = observed.trim().to_ascii_uppercase();
        if observed.is_empty() {
            return true;
        }
        let has = |needles: &[&str]| needles.iter().any(|n| observed.contains(n));
        match self {
            ColumnType::Text => has(&["CHAR", "CLOB", "TEXT", "UUID", "JSON"]),
            ColumnType::Integer => has(&["INT", "SERIAL"]),
            ColumnType::Boolean => has(&["BOOL", "INT"]),
            ColumnType::Timestamp => has(&["TIME", "DATE", "TEXT", "INT"]),
            ColumnType::Reference { .. } => has(&["INT", "SERIAL", "CHAR", "TEXT", "UUID"]),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Text => f.write_str("text"),
            ColumnType::Integer => f.write_str("integer"),
            ColumnType::Boolean => f.write_str("boolean"),
            ColumnType::Timestamp => f.write_str("timestamp"),
            ColumnType::Reference { table, column } => write!(f, "reference({table}.{column})"),
        }
    }
}

/// A literal column default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
}

/// One expected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    /// A nullable column with no default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// One expected index. Indexes are identified by name, not by columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// The full expected shape of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchemaSpec {
    pub table: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl TableSchemaSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Look up a declared column by name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A structured schema-altering operation.
///
/// Stores receive intents rather than SQL text and render them in their
/// own dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DdlIntent {
    AddColumn { table: String, column: ColumnSpec },
    CreateIndex { table: String, index: IndexSpec },
}

impl DdlIntent {
    pub fn table(&self) -> &str {
        match self {
            DdlIntent::AddColumn { table, .. } | DdlIntent::CreateIndex { table, .. } => table,
        }
    }

    /// Name of the column or index this intent creates.
    pub fn target_name(&self) -> &str {
        match self {
            DdlIntent::AddColumn { column, .. } => &column.name,
            DdlIntent::CreateIndex { index, .. } => &index.name,
        }
    }
}

/// Opaque record identifier.
///
/// Integer ids compare numerically and text ids lexicographically. Every
/// integer id orders below every text id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(v) => write!(f, "{v}"),
            RecordId::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for RecordId {
    fn from(v: i64) -> Self {
        RecordId::Int(v)
    }
}

impl From<&str> for RecordId {
    fn from(v: &str) -> Self {
        RecordId::Text(v.to_string())
    }
}

impl From<String> for RecordId {
    fn from(v: String) -> Self {
        RecordId::Text(v)
    }
}

/// Row payload: column name to JSON value.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A stored record as seen by the duplicate resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    /// `None` when the store had no parseable timestamp; such records
    /// order as the oldest.
    pub created_at: Option<DateTime<Utc>>,
    pub payload: Payload,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, created_at: Option<DateTime<Utc>>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            created_at,
            payload,
        }
    }

    /// Newest-first order: later `created_at` first, then larger id first.
    pub fn newest_first(a: &Record, b: &Record) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// A business-key value used to detect duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DuplicateGroupKey(pub String);

impl DuplicateGroupKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DuplicateGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(id: i64, ts: Option<(i32, u32, u32)>) -> Record {
        let created_at = ts.map(|(y, m, d)| Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap());
        Record::new(id, created_at, Payload::new())
    }

    #[test]
    fn test_record_id_ordering_is_numeric() {
        assert!(RecordId::Int(9) < RecordId::Int(10));
        assert!(RecordId::Int(i64::MAX) < RecordId::Text("a".into()));
        assert!(RecordId::from("b") > RecordId::from("a"));
    }

    #[test]
    fn test_newest_first_prefers_later_timestamp() {
        let mut records = vec![rec(5, Some((2024, 1, 1))), rec(1, Some((2024, 6, 1)))];
        records.sort_by(Record::newest_first);
        assert_eq!(records[0].id, RecordId::Int(1));
    }

    #[test]
    fn test_newest_first_breaks_ties_by_larger_id() {
        let mut records = vec![rec(2, Some((2024, 1, 1))), rec(10, Some((2024, 1, 1)))];
        records.sort_by(Record::newest_first);
        assert_eq!(records[0].id, RecordId::Int(10));
    }

    #[test]
    fn test_missing_timestamp_orders_oldest() {
        let mut records = vec![rec(99, None), rec(1, Some((2020, 1, 1)))];
        records.sort_by(Record::newest_first);
        assert_eq!(records[0].id, RecordId::Int(1));
    }

    #[test]
    fn test_observed_type_compatibility() {
        assert!(ColumnType::Text.accepts_observed("varchar(32)"));
        assert!(ColumnType::Text.accepts_observed(""));
        assert!(!ColumnType::Text.accepts_observed("INTEGER"));
        assert!(ColumnType::Integer.accepts_observed("BIGINT"));
        assert!(!ColumnType::Integer.accepts_observed("REAL"));
        assert!(ColumnType::Timestamp.accepts_observed("timestamp with time zone"));
        assert!(!ColumnType::Boolean.accepts_observed("TEXT"));
    }

    #[test]
    fn test_column_spec_deserializes_from_json() {
        let col: ColumnSpec = serde_json::from_value(serde_json::json!({
            "name": "is_active",
            "type": "boolean",
            "nullable": false,
            "default": true
        }))
        .unwrap();
        assert_eq!(col.column_type, ColumnType::Boolean);
        assert!(!col.nullable);
        assert_eq!(col.default, Some(DefaultValue::Boolean(true)));
    }
}
