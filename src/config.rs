//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/app.sqlite"
//!
//! [[tables]]
//! name = "whatsapp_numbers"
//! columns = [
//!     { name = "phone_number", type = "text" },
//!     { name = "is_active", type = "boolean", nullable = false, default = true },
//!     { name = "contact_id", type = "reference", references = { table = "contacts", column = "id" } },
//! ]
//! indexes = [
//!     { name = "idx_whatsapp_numbers_phone", columns = ["phone_number"] },
//! ]
//!
//! [[dedup]]
//! table = "whatsapp_numbers"
//! key_column = "phone_number"
//! normalize = "phone"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tablemend_core::models::{ColumnSpec, ColumnType, DefaultValue, IndexSpec, TableSchemaSpec};
use tablemend_core::validate::validate_spec;

use crate::keys::{KeyNormalization, KeyRule};
use crate::sqlite_store::RecordLayout;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub dedup: Vec<DedupConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Integer,
    Boolean,
    Timestamp,
    Reference,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReferenceConfig {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub references: Option<ReferenceConfig>,
}

fn default_nullable() -> bool {
    true
}

/// One duplicate-resolution rule: which table, which business key.
#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    pub table: String,
    pub key_column: String,
    #[serde(default)]
    pub normalize: KeyNormalization,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_created_at_column")]
    pub created_at_column: String,
}

fn default_id_column() -> String {
    "id".to_string()
}
fn default_created_at_column() -> String {
    "created_at".to_string()
}

impl ColumnConfig {
    fn to_spec(&self, table: &str) -> Result<ColumnSpec> {
        let column_type = match (self.kind, &self.references) {
            (ColumnKind::Text, _) => ColumnType::Text,
            (ColumnKind::Integer, _) => ColumnType::Integer,
            (ColumnKind::Boolean, _) => ColumnType::Boolean,
            (ColumnKind::Timestamp, _) => ColumnType::Timestamp,
            (ColumnKind::Reference, Some(r)) => ColumnType::Reference {
                table: r.table.clone(),
                column: r.column.clone(),
            },
            (ColumnKind::Reference, None) => anyhow::bail!(
                "tables.{}.columns.{}: type 'reference' requires `references = {{ table, column }}`",
                table,
                self.name
            ),
        };
        Ok(ColumnSpec {
            name: self.name.clone(),
            column_type,
            nullable: self.nullable,
            default: self.default.clone(),
        })
    }
}

impl TableConfig {
    /// Convert to the declarative spec consumed by the reconciler.
    pub fn to_spec(&self) -> Result<TableSchemaSpec> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.to_spec(&self.name))
            .collect::<Result<Vec<_>>>()?;
        Ok(TableSchemaSpec {
            table: self.name.clone(),
            columns,
            indexes: self.indexes.clone(),
        })
    }
}

impl DedupConfig {
    pub fn key_rule(&self) -> KeyRule {
        KeyRule::new(&self.key_column, self.normalize)
    }

    pub fn layout(&self) -> RecordLayout {
        RecordLayout {
            id_column: self.id_column.clone(),
            created_at_column: self.created_at_column.clone(),
        }
    }
}

impl Config {
    /// Table specs, optionally narrowed to one table.
    pub fn table_specs(&self, only: Option<&str>) -> Result<Vec<TableSchemaSpec>> {
        let specs = self
            .tables
            .iter()
            .filter(|t| only.map_or(true, |name| t.name == name))
            .map(TableConfig::to_spec)
            .collect::<Result<Vec<_>>>()?;
        if let (Some(name), true) = (only, specs.is_empty()) {
            anyhow::bail!("No [[tables]] entry named '{}' in config", name);
        }
        Ok(specs)
    }

    /// Dedup rules, optionally narrowed to one table.
    pub fn dedup_rules(&self, only: Option<&str>) -> Result<Vec<&DedupConfig>> {
        let rules: Vec<&DedupConfig> = self
            .dedup
            .iter()
            .filter(|d| only.map_or(true, |name| d.table == name))
            .collect();
        if let (Some(name), true) = (only, rules.is_empty()) {
            anyhow::bail!("No [[dedup]] rule for table '{}' in config", name);
        }
        Ok(rules)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    // Validate table specs
    let mut seen = HashSet::new();
    for table in &config.tables {
        if !seen.insert(table.name.as_str()) {
            anyhow::bail!("tables: '{}' declared more than once", table.name);
        }
        let spec = table.to_spec()?;
        validate_spec(&spec).with_context(|| format!("Invalid table spec '{}'", table.name))?;
    }

    // Validate dedup rules
    let mut seen = HashSet::new();
    for rule in &config.dedup {
        if rule.table.trim().is_empty() {
            anyhow::bail!("dedup.table must not be empty");
        }
        if rule.key_column.trim().is_empty() {
            anyhow::bail!("dedup.{}.key_column must not be empty", rule.table);
        }
        if rule.id_column.trim().is_empty() || rule.created_at_column.trim().is_empty() {
            anyhow::bail!(
                "dedup.{}: id_column and created_at_column must not be empty",
                rule.table
            );
        }
        if !seen.insert(rule.table.as_str()) {
            anyhow::bail!("dedup: more than one rule for table '{}'", rule.table);
        }
    }

    Ok(config)
}
