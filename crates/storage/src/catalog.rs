//! Schema catalog translation
//!
//! Turns messages into tables: one leading sequence column plus one
//! `NOT NULL` column per field, an optional primary key, a policy-controlled
//! index on the sequence column and per-field indices. Creation is
//! create-if-absent, so opening against an existing database never alters it.
//!
//! Table and index creation for one message runs inside a savepoint: a
//! failing index leaves no half-created table behind.

use crate::types::{column_type, ColumnType};
use rusqlite::{Connection, OptionalExtension};
use sqlbridge_core::{Error, IndexPolicy, Message, MessageSchema, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the implicit leading sequence-number column
///
/// Matches the on-disk layout of existing channel databases.
pub const SEQ_COLUMN: &str = "_tll_seq";

/// Quote an identifier with backticks
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Deterministic index name for `key` of `table`
///
/// The table name is length-prefixed so distinct `(table, key)` pairs never
/// share a name (`a_b` + `c` vs `a` + `b_c`).
pub fn index_name(table: &str, key: &str) -> String {
    format!("_tll_{}_{}_{}", table.len(), table, key)
}

pub(crate) fn ddl_error(table: &str, detail: impl std::fmt::Display) -> Error {
    Error::Ddl {
        table: table.to_string(),
        detail: detail.to_string(),
    }
}

/// Index to create on a table column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Index name
    pub name: String,
    /// Indexed column
    pub column: String,
    /// Unique index
    pub unique: bool,
}

/// Column list, key and indices of a message table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlan {
    /// Table name
    pub table: String,
    /// Columns in declaration order, sequence column first
    pub columns: Vec<(String, ColumnType)>,
    /// Primary key column
    pub primary_key: Option<String>,
    /// Indices created after the table
    pub indices: Vec<IndexDescriptor>,
}

impl TablePlan {
    /// Map every field of `message`; fails before any DDL on unsupported types
    pub fn new(table: &str, message: &Message, seq_index: IndexPolicy) -> Result<Self> {
        let mut columns = vec![(SEQ_COLUMN.to_string(), ColumnType::Integer)];
        let mut primary_key: Option<String> = None;
        let mut indices = Vec::new();

        let seq_policy = message.options.index.unwrap_or(seq_index);
        if seq_policy.is_indexed() {
            indices.push(IndexDescriptor {
                name: index_name(table, SEQ_COLUMN),
                column: SEQ_COLUMN.to_string(),
                unique: seq_policy == IndexPolicy::Unique,
            });
        }

        for field in &message.fields {
            let column = field.column_name().to_string();
            columns.push((column.clone(), column_type(message, field)?));

            if field.is_primary_key() {
                if let Some(existing) = &primary_key {
                    return Err(Error::schema(
                        &message.name,
                        &field.name,
                        format!("second primary key, '{}' is already one", existing),
                    ));
                }
                debug!(target: "sqlbridge::catalog", field = %field.name, "Field is primary key");
                primary_key = Some(column.clone());
            }

            if field.options.index.is_indexed() {
                indices.push(IndexDescriptor {
                    name: index_name(table, &column),
                    column,
                    unique: field.options.index == IndexPolicy::Unique,
                });
            }
        }

        Ok(TablePlan {
            table: table.to_string(),
            columns,
            primary_key,
            indices,
        })
    }

    /// `CREATE TABLE` statement
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, (name, ty))| {
                let mut col = format!("{} {}", quote_ident(name), ty);
                if i > 0 {
                    col.push_str(" NOT NULL");
                }
                if i > 0 && self.primary_key.as_deref() == Some(name.as_str()) {
                    col.push_str(" PRIMARY KEY");
                }
                col
            })
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_ident(&self.table),
            columns.join(", ")
        )
    }

    /// `CREATE INDEX` statements; a name clash is an error
    pub fn index_sql(&self) -> Vec<String> {
        self.indices
            .iter()
            .map(|idx| {
                format!(
                    "CREATE {}INDEX {} ON {}({})",
                    if idx.unique { "UNIQUE " } else { "" },
                    quote_ident(&idx.name),
                    quote_ident(&self.table),
                    quote_ident(&idx.column)
                )
            })
            .collect()
    }
}

/// Outcome of [`ensure_table`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    /// Table was created together with its indices
    Created,
    /// Table already existed and was left untouched
    Existing,
}

/// True if a table named `table` exists
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| ddl_error(table, format!("failed to check table: {}", e)))
}

/// Run `body` inside a savepoint, rolling it back on error
pub(crate) fn with_savepoint<T>(
    conn: &Connection,
    table: &str,
    body: impl FnOnce() -> Result<T>,
) -> Result<T> {
    conn.execute_batch("SAVEPOINT _catalog")
        .map_err(|e| ddl_error(table, e))?;
    match body() {
        Ok(v) => {
            conn.execute_batch("RELEASE _catalog")
                .map_err(|e| ddl_error(table, e))?;
            Ok(v)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK TO _catalog; RELEASE _catalog") {
                debug!(target: "sqlbridge::catalog", table, error = %rollback, "Savepoint rollback failed");
            }
            Err(e)
        }
    }
}

/// Create the table for `message` unless one named `table` already exists
pub fn ensure_table(
    conn: &Connection,
    table: &str,
    message: &Message,
    seq_index: IndexPolicy,
) -> Result<TableStatus> {
    if table_exists(conn, table)? {
        debug!(target: "sqlbridge::catalog", table, "Table exists");
        return Ok(TableStatus::Existing);
    }

    let plan = TablePlan::new(table, message, seq_index)?;
    info!(target: "sqlbridge::catalog", table, message = %message.name, "Create table");

    with_savepoint(conn, table, || {
        conn.execute_batch(&plan.create_sql())
            .map_err(|e| ddl_error(table, format!("failed to create table: {}", e)))?;
        for (idx, sql) in plan.indices.iter().zip(plan.index_sql()) {
            debug!(target: "sqlbridge::catalog", table, key = %idx.column, "Create index");
            conn.execute_batch(&sql).map_err(|e| {
                ddl_error(table, format!("failed to create index {}: {}", idx.name, e))
            })?;
        }
        Ok(TableStatus::Created)
    })
}

/// Per-message write mapping
#[derive(Debug, Clone)]
pub struct TableMapping {
    /// Message identifier
    pub msgid: i32,
    /// Table name
    pub table: String,
    /// Message definition
    pub message: Arc<Message>,
    /// Positional insert (or replace) statement
    pub insert_sql: String,
    /// Primary key column
    pub primary_key: Option<String>,
    /// Declared indices
    pub indices: Vec<IndexDescriptor>,
}

impl TableMapping {
    /// Select of every column in declaration order, sequence column first
    pub fn select_columns(&self) -> String {
        std::iter::once(quote_ident(SEQ_COLUMN))
            .chain(
                self.message
                    .fields
                    .iter()
                    .map(|f| quote_ident(f.column_name())),
            )
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Build the positional write statement for `message` and check it prepares
pub fn prepare_write(
    conn: &Connection,
    table: &str,
    message: &Arc<Message>,
    seq_index: IndexPolicy,
    replace: bool,
) -> Result<TableMapping> {
    let plan = TablePlan::new(table, message, seq_index)?;
    let names: Vec<String> = plan.columns.iter().map(|(n, _)| quote_ident(n)).collect();
    let params: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    let insert_sql = format!(
        "{} INTO {}({}) VALUES ({})",
        if replace { "REPLACE" } else { "INSERT" },
        quote_ident(table),
        names.join(", "),
        params.join(", ")
    );

    conn.prepare_cached(&insert_sql).map_err(|e| {
        ddl_error(
            table,
            format!("failed to prepare statement {}: {}", insert_sql, e),
        )
    })?;

    Ok(TableMapping {
        msgid: message.msgid,
        table: table.to_string(),
        message: Arc::clone(message),
        insert_sql,
        primary_key: plan.primary_key,
        indices: plan.indices,
    })
}

/// Table mappings of every addressable message in a schema
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    mappings: BTreeMap<i32, TableMapping>,
}

impl Catalog {
    /// Ensure a table and prepare a write statement for every message with a non-zero id
    pub fn build(
        conn: &Connection,
        schema: &MessageSchema,
        seq_index: IndexPolicy,
        replace: bool,
    ) -> Result<Self> {
        let mut mappings: BTreeMap<i32, TableMapping> = BTreeMap::new();
        conn.set_prepared_statement_cache_capacity(schema.len().max(12) + 4);

        for message in schema.messages() {
            if message.msgid == 0 {
                debug!(target: "sqlbridge::catalog", message = %message.name, "Message has no msgid, skip table check");
                continue;
            }
            if let Some(prev) = mappings.get(&message.msgid) {
                return Err(Error::DuplicateMessageId {
                    msgid: message.msgid,
                    first: prev.message.name.clone(),
                    second: message.name.clone(),
                });
            }
            let table = message.table_name();
            ensure_table(conn, table, message, seq_index)?;
            let mapping = prepare_write(conn, table, message, seq_index, replace)?;
            mappings.insert(message.msgid, mapping);
        }

        Ok(Catalog { mappings })
    }

    /// Mapping for a message id
    pub fn get(&self, msgid: i32) -> Option<&TableMapping> {
        self.mappings.get(&msgid)
    }

    /// Mapping whose table is `table`
    pub fn by_table(&self, table: &str) -> Option<&TableMapping> {
        self.mappings.values().find(|m| m.table == table)
    }

    /// All mappings ordered by message id
    pub fn mappings(&self) -> impl Iterator<Item = &TableMapping> {
        self.mappings.values()
    }

    /// Number of mapped messages
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// True if no message is mapped
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
