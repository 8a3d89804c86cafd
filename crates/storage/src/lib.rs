//! SQLite binding for sqlbridge
//!
//! This crate maps message schemas onto relational tables and moves records
//! between the binary layout and rows:
//! - Type mapping and the schema catalog (tables, indices, write statements)
//! - Record marshalling (record → bound parameters) and unmarshalling (row → record)
//! - Transaction batching with a configurable commit threshold
//! - Replay selection over one message table or the shared structured-text table
//! - Journal mode and store configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod catalog;
pub mod config;
pub mod journal;
pub mod json_table;
pub mod marshal;
pub mod replay;
pub mod types;
pub mod unmarshal;

pub use batch::TransactionBatcher;
pub use catalog::{
    ensure_table, prepare_write, table_exists, Catalog, IndexDescriptor, TableMapping, TablePlan,
    TableStatus, SEQ_COLUMN,
};
pub use config::{open_connection, StoreConfig};
pub use journal::JournalMode;
pub use json_table::{ensure_json_table, prepare_insert, write_payload};
pub use marshal::{bind_record, write_record};
pub use replay::{FilterValue, PredicateTyping, ReplayQuery, Step, FIRST_COLUMN};
pub use types::{column_type, ColumnType};
pub use unmarshal::{extract_field, extract_record};

/// Re-exported so sessions do not need their own `rusqlite` dependency
pub use rusqlite::{types::ValueRef, Connection, Row};
