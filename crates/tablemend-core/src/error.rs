//! Error types for reconciliation and duplicate resolution.
//!
//! Three layers:
//!
//! | Type | Raised by | Effect |
//! |------|-----------|--------|
//! | [`StoreError`] | collaborator implementations | recovered into a report |
//! | [`FailureReason`] | reconciler / resolver | recorded per item |
//! | [`SpecError`] | spec validation | fails the whole call |

use serde::Serialize;
use thiserror::Error;

/// Error reported by a [`SchemaInspector`](crate::store::SchemaInspector) or
/// [`RecordStore`](crate::store::RecordStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("type conflict: {0}")]
    TypeConflict(String),

    #[error("store error: {message}")]
    Backend {
        code: Option<String>,
        message: String,
    },
}

impl StoreError {
    /// Classify a raw backend error code and message.
    ///
    /// Understands SQLite result codes (primary or extended, as decimal
    /// strings) and Postgres SQLSTATEs. Anything unrecognized stays a
    /// [`StoreError::Backend`] with the code and message preserved verbatim.
    pub fn classify(code: Option<&str>, message: &str) -> StoreError {
        let lower = message.to_ascii_lowercase();

        match code {
            // SQLSTATEs are always five characters.
            Some("42501") => return StoreError::PermissionDenied(message.to_string()),
            Some("42804") => return StoreError::TypeConflict(message.to_string()),
            Some("42P01") => return StoreError::TableNotFound(table_from_message(message)),
            Some(code) if code.len() < 5 => {
                // SQLite extended codes carry the primary code in the low byte.
                if let Ok(n) = code.parse::<i64>() {
                    match n & 0xff {
                        // SQLITE_PERM, SQLITE_READONLY, SQLITE_AUTH
                        3 | 8 | 23 => return StoreError::PermissionDenied(message.to_string()),
                        // SQLITE_MISMATCH
                        20 => return StoreError::TypeConflict(message.to_string()),
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        if lower.contains("no such table") {
            StoreError::TableNotFound(table_from_message(message))
        } else if lower.contains("permission denied")
            || lower.contains("readonly database")
            || lower.contains("not authorized")
        {
            StoreError::PermissionDenied(message.to_string())
        } else if lower.contains("datatype mismatch") {
            StoreError::TypeConflict(message.to_string())
        } else {
            StoreError::Backend {
                code: code.map(str::to_string),
                message: message.to_string(),
            }
        }
    }
}

/// Best-effort table name extraction from "no such table: x" style messages.
fn table_from_message(message: &str) -> String {
    message
        .rsplit(|c: char| c == ':' || c == ' ')
        .find(|s| !s.is_empty())
        .map(|s| s.trim_matches(|c| c == '"' || c == '\''))
        .unwrap_or(message)
        .to_string()
}

/// Why a single spec item or record removal did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    TableNotFound,
    PermissionDenied { message: String },
    TypeConflict { message: String },
    /// An index was skipped because column additions it depends on failed.
    DependencyMissing { columns: Vec<String> },
    Unknown {
        code: Option<String>,
        message: String,
    },
}

impl From<&StoreError> for FailureReason {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::TableNotFound(_) => FailureReason::TableNotFound,
            StoreError::PermissionDenied(m) => FailureReason::PermissionDenied { message: m.clone() },
            StoreError::TypeConflict(m) => FailureReason::TypeConflict { message: m.clone() },
            StoreError::Backend { code, message } => FailureReason::Unknown {
                code: code.clone(),
                message: message.clone(),
            },
        }
    }
}

impl From<StoreError> for FailureReason {
    fn from(err: StoreError) -> Self {
        FailureReason::from(&err)
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::TableNotFound => f.write_str("TableNotFound"),
            FailureReason::PermissionDenied { message } => write!(f, "PermissionDenied: {message}"),
            FailureReason::TypeConflict { message } => write!(f, "TypeConflict: {message}"),
            FailureReason::DependencyMissing { columns } => {
                write!(f, "DependencyMissing: {}", columns.join(", "))
            }
            FailureReason::Unknown { code: Some(code), message } => {
                write!(f, "Unknown [{code}]: {message}")
            }
            FailureReason::Unknown { code: None, message } => write!(f, "Unknown: {message}"),
        }
    }
}

/// A malformed [`TableSchemaSpec`](crate::models::TableSchemaSpec).
///
/// These are programmer errors: no meaningful partial report can be built
/// from such input, so the whole call fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("table name must not be empty")]
    EmptyTableName,

    #[error("table '{table}': column name must not be empty")]
    EmptyColumnName { table: String },

    #[error("table '{table}': column '{column}' declared more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{table}': index name must not be empty")]
    EmptyIndexName { table: String },

    #[error("table '{table}': index '{index}' declared more than once")]
    DuplicateIndex { table: String, index: String },

    #[error("table '{table}': index '{index}' has no columns")]
    EmptyIndexColumns { table: String, index: String },

    #[error("table '{table}': index '{index}' references column '{column}', which is neither declared nor present")]
    UnknownIndexColumn {
        table: String,
        index: String,
        column: String,
    },
}
