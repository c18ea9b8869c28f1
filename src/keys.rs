//! Business-key extraction for duplicate resolution.
//!
//! A [`KeyRule`] reads one payload column and normalizes it. Values that
//! are null, missing, or blank after normalization yield no key, so the
//! record is never grouped.

use serde::Deserialize;
use serde_json::Value;

use tablemend_core::models::{DuplicateGroupKey, Payload};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyNormalization {
    /// Compare values byte-for-byte.
    Exact,
    /// Strip surrounding whitespace.
    #[default]
    Trim,
    /// Trim and lowercase (emails, handles).
    Lowercase,
    /// Keep digits and a leading `+` only: `+1 (555) 010-0000` becomes
    /// `+15550100000`.
    Phone,
}

impl KeyNormalization {
    pub fn apply(self, raw: &str) -> String {
        match self {
            KeyNormalization::Exact => raw.to_string(),
            KeyNormalization::Trim => raw.trim().to_string(),
            KeyNormalization::Lowercase => raw.trim().to_lowercase(),
            KeyNormalization::Phone => normalize_phone(raw),
        }
    }
}

pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(char::is_ascii_digit));
    if out == "+" {
        out.clear();
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRule {
    pub column: String,
    pub normalization: KeyNormalization,
}

impl KeyRule {
    pub fn new(column: impl Into<String>, normalization: KeyNormalization) -> Self {
        Self {
            column: column.into(),
            normalization,
        }
    }

    pub fn extract(&self, payload: &Payload) -> Option<DuplicateGroupKey> {
        let raw = match payload.get(&self.column)? {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        let key = self.normalization.apply(&raw);
        if key.trim().is_empty() {
            None
        } else {
            Some(DuplicateGroupKey(key))
        }
    }
}
