//! Shared structured-text table
//!
//! All messages of a schema go to one table with three columns: sequence
//! number, message name and the encoded payload. Messages carrying a `key`
//! option get a partial unique index on that payload path, so replace-writes
//! keep one row per key.

use crate::catalog::{ddl_error, quote_ident, table_exists, with_savepoint, TableStatus};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::Connection;
use sqlbridge_core::{Error, Message, MessageSchema, Result};
use tracing::{debug, info};

/// Sequence number column
pub const SEQ_COLUMN: &str = "seq";
/// Message name column
pub const NAME_COLUMN: &str = "name";
/// Payload column
pub const DATA_COLUMN: &str = "data";

/// `CREATE TABLE` statement of the shared table
pub fn create_sql(table: &str) -> String {
    format!(
        "CREATE TABLE {} ({} INTEGER, {} VARCHAR NOT NULL, {} TEXT)",
        quote_ident(table),
        quote_ident(SEQ_COLUMN),
        quote_ident(NAME_COLUMN),
        quote_ident(DATA_COLUMN)
    )
}

/// Index name for the `key` of `message`; the table name is length-prefixed
pub fn key_index_name(table: &str, message: &str) -> String {
    format!("json_{}_{}_{}", table.len(), table, message)
}

/// Partial unique index over the payload path `key` of `message`
pub fn key_index_sql(table: &str, message: &Message, key: &str) -> String {
    format!(
        "CREATE UNIQUE INDEX {} ON {}(json_extract({}, '$.{}')) WHERE {} = '{}'",
        quote_ident(&key_index_name(table, &message.name)),
        quote_ident(table),
        quote_ident(DATA_COLUMN),
        key.replace('\'', "''"),
        quote_ident(NAME_COLUMN),
        message.name.replace('\'', "''")
    )
}

/// Write statement; always replaces so keyed messages overwrite
pub fn insert_sql(table: &str) -> String {
    format!(
        "REPLACE INTO {}({}, {}, {}) VALUES (?1, ?2, ?3)",
        quote_ident(table),
        quote_ident(SEQ_COLUMN),
        quote_ident(NAME_COLUMN),
        quote_ident(DATA_COLUMN)
    )
}

/// Create the shared table and its key indices unless `table` exists
pub fn ensure_json_table(
    conn: &Connection,
    table: &str,
    schema: &MessageSchema,
) -> Result<TableStatus> {
    if table_exists(conn, table)? {
        debug!(target: "sqlbridge::catalog", table, "Table exists");
        return Ok(TableStatus::Existing);
    }

    info!(target: "sqlbridge::catalog", table, "Create table");
    with_savepoint(conn, table, || {
        conn.execute_batch(&create_sql(table))
            .map_err(|e| ddl_error(table, format!("failed to create table: {}", e)))?;
        for message in schema.messages() {
            let Some(key) = message.options.key.as_deref() else {
                continue;
            };
            debug!(target: "sqlbridge::catalog", message = %message.name, key, "Create index");
            conn.execute_batch(&key_index_sql(table, message, key))
                .map_err(|e| {
                    ddl_error(
                        table,
                        format!("failed to create index for '{}': {}: {}", message.name, key, e),
                    )
                })?;
        }
        Ok(TableStatus::Created)
    })
}

/// Prepare the write statement once to surface errors at open
pub fn prepare_insert(conn: &Connection, table: &str) -> Result<String> {
    let sql = insert_sql(table);
    conn.prepare_cached(&sql)
        .map_err(|e| ddl_error(table, format!("failed to prepare REPLACE statement: {}", e)))?;
    Ok(sql)
}

/// Write one encoded record with the statement from [`prepare_insert`]
///
/// The payload is stored as text without validation.
pub fn write_payload(
    conn: &Connection,
    insert_sql: &str,
    seq: i64,
    message: &str,
    payload: &[u8],
) -> Result<()> {
    let exec_error = |e: rusqlite::Error| Error::Exec {
        message: message.to_string(),
        detail: format!("failed to insert data: {}", e),
    };
    let mut stmt = conn.prepare_cached(insert_sql).map_err(exec_error)?;
    stmt.raw_bind_parameter(1, seq).map_err(exec_error)?;
    stmt.raw_bind_parameter(2, message).map_err(exec_error)?;
    stmt.raw_bind_parameter(3, ToSqlOutput::Borrowed(ValueRef::Text(payload)))
        .map_err(exec_error)?;
    stmt.raw_execute().map_err(exec_error)?;
    Ok(())
}
