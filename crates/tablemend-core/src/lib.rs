//! # tablemend core
//!
//! Store-agnostic logic for keeping a live table in line with a declared
//! shape: the data model, spec validation, the schema reconciler, the
//! duplicate resolver, and the collaborator traits they run against.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Backends
//! implement [`store::SchemaInspector`] and [`store::RecordStore`];
//! [`store::memory::InMemoryStore`] is provided for tests.
//!
//! ## Example
//!
//! ```rust
//! use tablemend_core::models::{ColumnSpec, ColumnType, TableSchemaSpec};
//! use tablemend_core::reconcile::{reconcile, ItemStatus};
//! use tablemend_core::store::memory::InMemoryStore;
//!
//! # tokio_test_block(async {
//! let store = InMemoryStore::new();
//! store.create_table("contacts", &[("id", "INTEGER"), ("name", "TEXT")]);
//!
//! let spec = TableSchemaSpec::new("contacts")
//!     .column(ColumnSpec::new("id", ColumnType::Integer))
//!     .column(ColumnSpec::new("email", ColumnType::Text));
//!
//! let report = reconcile(&spec, &store, &store).await.unwrap();
//! assert_eq!(report.column("email"), Some(&ItemStatus::Added));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f);
//! # }
//! ```

pub mod dedup;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod store;
pub mod validate;
