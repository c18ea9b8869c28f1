//! SQLite integration tests for the reconciler and duplicate resolver.
//!
//! Every test gets a fresh database in a temp directory. Tables are created
//! with raw SQL, the way an application's own migrations would have left
//! them, and then driven through the configured commands.

use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;
use tempfile::TempDir;

use tablemend::check::plan_tables;
use tablemend::config::{parse_config, Config};
use tablemend::db;
use tablemend::dedup_cmd::{dedup_table, dedup_tables, DedupOutcome};
use tablemend::reconcile_cmd::reconcile_tables;
use tablemend::sqlite_store::SqliteStore;
use tablemend_core::error::FailureReason;
use tablemend_core::models::RecordId;
use tablemend_core::reconcile::ItemStatus;
use tablemend_core::store::{RecordStore, SchemaInspector};

const TABLES: &str = r#"
[[tables]]
name = "whatsapp_numbers"
columns = [
    { name = "phone_number", type = "text" },
    { name = "is_active", type = "boolean", nullable = false, default = true },
    { name = "contact_id", type = "reference", references = { table = "contacts", column = "id" } },
]
indexes = [
    { name = "idx_whatsapp_numbers_phone", columns = ["phone_number"] },
]

[[dedup]]
table = "whatsapp_numbers"
key_column = "phone_number"
normalize = "phone"

[[dedup]]
table = "subscribers"
key_column = "email"
normalize = "lowercase"
id_column = "uuid"
created_at_column = "inserted"
"#;

async fn setup() -> (TempDir, Config, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let toml = format!(
        "[db]\npath = \"{}/data/app.sqlite\"\n{}",
        tmp.path().display(),
        TABLES
    );
    let config = parse_config(&toml).unwrap();
    let store = db::open_store(&config).await.unwrap();

    for sql in [
        "CREATE TABLE contacts (id INTEGER PRIMARY KEY, name TEXT)",
        "CREATE TABLE whatsapp_numbers (id INTEGER PRIMARY KEY, phone_number TEXT, created_at TEXT)",
        "CREATE TABLE subscribers (uuid TEXT PRIMARY KEY, email TEXT, inserted TEXT)",
    ] {
        sqlx::query(sql).execute(store.pool()).await.unwrap();
    }

    (tmp, config, store)
}

async fn insert_numbers(pool: &SqlitePool, rows: &[(i64, &str, &str)]) {
    for (id, phone, created_at) in rows {
        sqlx::query("INSERT INTO whatsapp_numbers (id, phone_number, created_at) VALUES (?, ?, ?)")
            .bind(*id)
            .bind(*phone)
            .bind(*created_at)
            .execute(pool)
            .await
            .unwrap();
    }
}

async fn remaining_ids(pool: &SqlitePool, table: &str) -> Vec<i64> {
    sqlx::query_scalar(&format!("SELECT id FROM {} ORDER BY id", table))
        .fetch_all(pool)
        .await
        .unwrap()
}

// ─── Reconciliation ─────────────────────────────────────────────────

#[tokio::test]
async fn test_reconcile_adds_missing_columns_and_index() {
    let (_tmp, config, store) = setup().await;
    insert_numbers(store.pool(), &[(1, "+15550100", "2024-01-01 00:00:00")]).await;

    let reports = reconcile_tables(&config, &store, None).await.unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];

    assert_eq!(report.column("phone_number"), Some(&ItemStatus::AlreadyPresent));
    assert_eq!(report.column("is_active"), Some(&ItemStatus::Added));
    assert_eq!(report.column("contact_id"), Some(&ItemStatus::Added));
    assert_eq!(
        report.index("idx_whatsapp_numbers_phone"),
        Some(&ItemStatus::Added)
    );

    let columns = store.list_columns("whatsapp_numbers").await.unwrap();
    assert!(columns.contains("is_active"));
    assert!(columns.contains("contact_id"));
    let indexes = store.list_indexes("whatsapp_numbers").await.unwrap();
    assert!(indexes.contains("idx_whatsapp_numbers_phone"));

    // Existing rows pick up the declared default.
    let active: i64 = sqlx::query_scalar("SELECT is_active FROM whatsapp_numbers WHERE id = 1")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn test_reconcile_twice_changes_nothing() {
    let (_tmp, config, store) = setup().await;

    let first = reconcile_tables(&config, &store, None).await.unwrap();
    assert_eq!(first[0].added_count(), 3);

    let second = reconcile_tables(&config, &store, None).await.unwrap();
    assert_eq!(second[0].added_count(), 0);
    assert!(second[0]
        .items()
        .all(|item| item.status == ItemStatus::AlreadyPresent));
}

#[tokio::test]
async fn test_reconcile_missing_table_reports_table_not_found() {
    let (tmp, _config, _store) = setup().await;
    let toml = format!(
        r#"[db]
path = "{}/data/app.sqlite"

[[tables]]
name = "campaign_events"
columns = [{{ name = "status", type = "text" }}]
indexes = [{{ name = "idx_campaign_events_status", columns = ["status"] }}]
"#,
        tmp.path().display()
    );
    let config = parse_config(&toml).unwrap();
    let store = db::open_store(&config).await.unwrap();

    let reports = reconcile_tables(&config, &store, None).await.unwrap();
    let report = &reports[0];
    assert_eq!(report.items().count(), 2);
    assert!(report.items().all(|item| matches!(
        item.status,
        ItemStatus::FailedToAdd(FailureReason::TableNotFound)
    )));
}

#[tokio::test]
async fn test_reconcile_on_read_only_database_is_permission_denied() {
    let (_tmp, config, _store) = setup().await;
    let ro = db::open_store_read_only(&config).await.unwrap();

    let reports = reconcile_tables(&config, &ro, None).await.unwrap();
    let report = &reports[0];

    assert_eq!(report.column("phone_number"), Some(&ItemStatus::AlreadyPresent));
    assert!(matches!(
        report.column("is_active"),
        Some(ItemStatus::FailedToAdd(FailureReason::PermissionDenied { .. }))
    ));
    // The index only needs phone_number, which exists, so it is attempted
    // and refused on its own.
    assert!(matches!(
        report.index("idx_whatsapp_numbers_phone"),
        Some(ItemStatus::FailedToAdd(FailureReason::PermissionDenied { .. }))
    ));
}

#[tokio::test]
async fn test_plan_renders_pending_changes_then_goes_quiet() {
    let (_tmp, config, store) = setup().await;

    let before = plan_tables(&config, &store, Some("whatsapp_numbers"))
        .await
        .unwrap();
    assert!(!before[0].is_compliant());
    let sql: Vec<String> = before[0]
        .intents()
        .into_iter()
        .map(tablemend::ddl::render)
        .collect();
    assert_eq!(sql.len(), 3);
    assert!(sql[0].contains("ADD COLUMN \"is_active\" BOOLEAN NOT NULL DEFAULT 1"));

    reconcile_tables(&config, &store, None).await.unwrap();

    let after = plan_tables(&config, &store, None).await.unwrap();
    assert!(after[0].is_compliant());
    assert!(after[0].intents().is_empty());
}

#[tokio::test]
async fn test_reconcile_matches_names_case_insensitively() {
    let (tmp, _config, store) = setup().await;
    for sql in [
        "ALTER TABLE contacts ADD COLUMN email TEXT",
        "CREATE INDEX idx_contacts_email ON contacts (email)",
    ] {
        sqlx::query(sql).execute(store.pool()).await.unwrap();
    }
    let toml = format!(
        r#"[db]
path = "{}/data/app.sqlite"

[[tables]]
name = "contacts"
columns = [{{ name = "Email", type = "text" }}, {{ name = "Phone", type = "text" }}]
indexes = [
    {{ name = "IDX_Contacts_Email", columns = ["Email"] }},
    {{ name = "idx_contacts_phone", columns = ["PHONE"] }},
]
"#,
        tmp.path().display()
    );
    let config = parse_config(&toml).unwrap();

    let first = reconcile_tables(&config, &store, None).await.unwrap();
    let report = &first[0];
    assert_eq!(report.column("Email"), Some(&ItemStatus::AlreadyPresent));
    assert_eq!(report.index("IDX_Contacts_Email"), Some(&ItemStatus::AlreadyPresent));
    assert_eq!(report.column("Phone"), Some(&ItemStatus::Added));
    assert_eq!(report.index("idx_contacts_phone"), Some(&ItemStatus::Added));
    assert!(report.is_compliant());

    let second = reconcile_tables(&config, &store, None).await.unwrap();
    assert!(second[0]
        .items()
        .all(|item| item.status == ItemStatus::AlreadyPresent));
}

// ─── Duplicate resolution ───────────────────────────────────────────

#[tokio::test]
async fn test_dedup_keeps_newest_per_normalized_phone() {
    let (_tmp, config, store) = setup().await;
    insert_numbers(
        store.pool(),
        &[
            (1, "+1 555 0100", "2024-01-01 00:00:00"),
            (2, "+15550100", "2024-03-01 00:00:00"),
            (3, "+15550199", "2024-02-01 00:00:00"),
        ],
    )
    .await;

    let rule = &config.dedup_rules(Some("whatsapp_numbers")).unwrap()[0];
    let report = dedup_table(rule, &store, false).await.unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.distinct_keys, 2);
    assert_eq!(report.duplicate_keys, 1);
    assert_eq!(report.survivor("+15550100"), Some(&RecordId::Int(2)));
    assert_eq!(report.removed, vec![RecordId::Int(1)]);
    assert!(report.failed.is_empty());
    assert_eq!(remaining_ids(store.pool(), "whatsapp_numbers").await, vec![2, 3]);

    let again = dedup_table(rule, &store, false).await.unwrap();
    assert_eq!(again.duplicate_keys, 0);
    assert!(again.removed.is_empty());
}

#[tokio::test]
async fn test_dedup_dry_run_deletes_nothing() {
    let (_tmp, config, store) = setup().await;
    insert_numbers(
        store.pool(),
        &[
            (1, "+15550100", "2024-01-01 00:00:00"),
            (2, "+15550100", "2024-01-02 00:00:00"),
        ],
    )
    .await;

    let rule = &config.dedup_rules(Some("whatsapp_numbers")).unwrap()[0];
    let preview = dedup_table(rule, &store, true).await.unwrap();

    assert!(preview.dry_run);
    assert_eq!(preview.removed, vec![RecordId::Int(1)]);
    assert_eq!(remaining_ids(store.pool(), "whatsapp_numbers").await, vec![1, 2]);
}

#[tokio::test]
async fn test_dedup_on_read_only_database_reports_permission_denied() {
    let (_tmp, config, store) = setup().await;
    insert_numbers(
        store.pool(),
        &[
            (1, "+15550100", "2024-01-01 00:00:00"),
            (2, "+15550100", "2024-06-01 00:00:00"),
            (3, "+15550100", "2024-03-01 00:00:00"),
        ],
    )
    .await;

    // The read-write pool stays open while the read-only one works.
    let ro = db::open_store_read_only(&config).await.unwrap();
    let rule = &config.dedup_rules(Some("whatsapp_numbers")).unwrap()[0];
    let report = dedup_table(rule, &ro, false).await.unwrap();

    assert_eq!(report.survivor("+15550100"), Some(&RecordId::Int(2)));
    assert!(report.removed.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(report
        .failed
        .iter()
        .all(|f| matches!(f.reason, FailureReason::PermissionDenied { .. })));
    assert_eq!(
        remaining_ids(store.pool(), "whatsapp_numbers").await,
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_dedup_with_text_ids_and_custom_layout() {
    let (_tmp, config, store) = setup().await;
    for (uuid, email, inserted) in [
        ("a1", "Ana@Example.com", "2024-05-01"),
        ("b2", " ana@example.com", "2024-05-01"),
        ("c3", "bo@example.com", "2024-01-01"),
        ("d4", "", "2024-01-01"),
    ] {
        sqlx::query("INSERT INTO subscribers (uuid, email, inserted) VALUES (?, ?, ?)")
            .bind(uuid)
            .bind(email)
            .bind(inserted)
            .execute(store.pool())
            .await
            .unwrap();
    }

    let rule = &config.dedup_rules(Some("subscribers")).unwrap()[0];
    let report = dedup_table(rule, &store, false).await.unwrap();

    // Same timestamp: the larger id wins.
    assert_eq!(report.survivor("ana@example.com"), Some(&RecordId::from("b2")));
    assert_eq!(report.removed, vec![RecordId::from("a1")]);
    assert_eq!(report.unkeyed, vec![RecordId::from("d4")]);

    let left = store.select_all("subscribers").await.unwrap();
    assert_eq!(left.len(), 3);
}

#[tokio::test]
async fn test_dedup_missing_table_does_not_discard_other_rules() {
    let (_tmp, config, store) = setup().await;
    insert_numbers(
        store.pool(),
        &[
            (1, "+15550100", "2024-01-01 00:00:00"),
            (2, "+15550100", "2024-02-01 00:00:00"),
        ],
    )
    .await;
    sqlx::query("DROP TABLE subscribers")
        .execute(store.pool())
        .await
        .unwrap();

    let outcomes = dedup_tables(&config, &store, None, false).await.unwrap();
    assert_eq!(outcomes.len(), 2);

    let numbers = outcomes[0].report().expect("whatsapp_numbers resolved");
    assert_eq!(numbers.removed, vec![RecordId::Int(1)]);
    assert_eq!(
        outcomes[1],
        DedupOutcome::Skipped {
            table: "subscribers".into(),
            skipped: FailureReason::TableNotFound,
        }
    );
    assert_eq!(outcomes[1].table(), "subscribers");
    assert_eq!(outcomes.iter().map(DedupOutcome::failure_count).sum::<usize>(), 1);
    assert_eq!(remaining_ids(store.pool(), "whatsapp_numbers").await, vec![2]);
}

#[tokio::test]
async fn test_rows_without_usable_id_are_left_out() {
    let (_tmp, _config, store) = setup().await;
    for sql in [
        "CREATE TABLE imported_numbers (id, phone_number TEXT, created_at TEXT)",
        "INSERT INTO imported_numbers VALUES (NULL, '+15550100', '2024-01-01')",
        "INSERT INTO imported_numbers VALUES (2.5, '+15550100', '2024-01-02')",
        "INSERT INTO imported_numbers VALUES (7, '+15550100', '2024-01-03')",
    ] {
        sqlx::query(sql).execute(store.pool()).await.unwrap();
    }

    let records = store.select_all("imported_numbers").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, RecordId::Int(7));
}

// ─── Logging ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

#[tokio::test]
async fn test_missing_created_at_column_is_logged() {
    let (_tmp, _config, store) = setup().await;
    for sql in [
        "CREATE TABLE legacy_numbers (id INTEGER PRIMARY KEY, phone_number TEXT)",
        "INSERT INTO legacy_numbers VALUES (1, '+15550100')",
        "INSERT INTO legacy_numbers VALUES (2, '+15550100')",
    ] {
        sqlx::query(sql).execute(store.pool()).await.unwrap();
    }

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let records = {
        let _guard = tracing::subscriber::set_default(subscriber);
        store.select_all("legacy_numbers").await.unwrap()
    };

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.created_at.is_none()));
    let output = logs.contents();
    assert!(output.contains("created_at column not found"), "{}", output);
    assert!(output.contains("legacy_numbers"), "{}", output);
}
