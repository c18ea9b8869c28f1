//! SQLite rendering of [`DdlIntent`]s.
//!
//! Identifiers are always double-quoted and text literals single-quoted,
//! with embedded quotes doubled. Statements deliberately omit
//! `IF NOT EXISTS`: the reconciler checks existence itself.

use tablemend_core::models::{ColumnSpec, ColumnType, DdlIntent, DefaultValue, IndexSpec};

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn column_type_sql(column_type: &ColumnType) -> String {
    match column_type {
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Timestamp => "TIMESTAMP".to_string(),
        ColumnType::Reference { table, column } => {
            format!("REFERENCES {}({})", quote_ident(table), quote_ident(column))
        }
    }
}

fn default_sql(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Boolean(true) => "1".to_string(),
        DefaultValue::Boolean(false) => "0".to_string(),
        DefaultValue::Integer(v) => v.to_string(),
        DefaultValue::Text(v) => quote_literal(v),
    }
}

fn column_def(column: &ColumnSpec) -> String {
    let mut def = format!(
        "{} {}",
        quote_ident(&column.name),
        column_type_sql(&column.column_type)
    );
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        def.push_str(" DEFAULT ");
        def.push_str(&default_sql(default));
    }
    def
}

fn create_index(table: &str, index: &IndexSpec) -> String {
    let columns = index
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        quote_ident(table),
        columns
    )
}

/// Render one intent as a single SQLite statement (no trailing `;`).
pub fn render(intent: &DdlIntent) -> String {
    match intent {
        DdlIntent::AddColumn { table, column } => {
            format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(table), column_def(column))
        }
        DdlIntent::CreateIndex { table, index } => create_index(table, index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_column_with_default() {
        let intent = DdlIntent::AddColumn {
            table: "whatsapp_numbers".into(),
            column: ColumnSpec::new("is_active", ColumnType::Boolean)
                .not_null()
                .with_default(DefaultValue::Boolean(true)),
        };
        assert_eq!(
            render(&intent),
            r#"ALTER TABLE "whatsapp_numbers" ADD COLUMN "is_active" BOOLEAN NOT NULL DEFAULT 1"#
        );
    }

    #[test]
    fn test_add_reference_column() {
        let intent = DdlIntent::AddColumn {
            table: "messages".into(),
            column: ColumnSpec::new(
                "conversation_id",
                ColumnType::Reference {
                    table: "conversations".into(),
                    column: "id".into(),
                },
            ),
        };
        assert_eq!(
            render(&intent),
            r#"ALTER TABLE "messages" ADD COLUMN "conversation_id" REFERENCES "conversations"("id")"#
        );
    }

    #[test]
    fn test_create_unique_index() {
        let intent = DdlIntent::CreateIndex {
            table: "contacts".into(),
            index: IndexSpec::new("idx_contacts_user_phone", ["user_id", "phone"]).unique(),
        };
        assert_eq!(
            render(&intent),
            r#"CREATE UNIQUE INDEX "idx_contacts_user_phone" ON "contacts" ("user_id", "phone")"#
        );
    }

    #[test]
    fn test_quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
        assert_eq!(quote_literal("it's"), "'it''s'");
    }
}
