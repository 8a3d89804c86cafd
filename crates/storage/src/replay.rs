//! Replay selection
//!
//! A replay is one filtered read over one table, advanced a row at a time.
//! Each [`ReplayQuery::step`] runs a keyset query on the row id
//!
//! ```text
//! SELECT rowid, <columns> FROM <table> WHERE rowid > ?1 [AND <predicate>]... ORDER BY rowid LIMIT 1
//! ```
//!
//! so no statement is held open between ticks and the connection stays free
//! for writes. The cursor only moves once a row was handed to the caller
//! successfully: a row that fails extraction is returned again on the next
//! step.
//!
//! Two builders exist: [`ReplayQuery::table`] selects every column of a
//! message table, [`ReplayQuery::predicates`] selects `seq, name, data` from a
//! shared structured-text table, filtered by message name and by equality on
//! paths into the stored payload.

use crate::catalog::{quote_ident, TableMapping};
use crate::json_table::{DATA_COLUMN, NAME_COLUMN, SEQ_COLUMN as JSON_SEQ_COLUMN};
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::{Connection, Row, ToSql};
use sqlbridge_core::{Error, FieldType, Message, Result};
use std::fmt;
use tracing::{debug, warn};

/// Index of the first selected column after the row id
pub const FIRST_COLUMN: usize = 1;

/// Bound value of one predicate
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Text comparison
    Text(String),
    /// Integer comparison
    Integer(i64),
    /// Floating point comparison
    Real(f64),
}

impl ToSql for FilterValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FilterValue::Text(s) => ToSqlOutput::from(s.as_str()),
            FilterValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            FilterValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
        })
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => write!(f, "'{}'", s),
            FilterValue::Integer(v) => write!(f, "{}", v),
            FilterValue::Real(v) => write!(f, "{}", v),
        }
    }
}

/// How path predicate values were typed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateTyping {
    /// Values converted according to the resolved field type
    Typed,
    /// No message to resolve paths against; values compared as text
    Untyped,
}

/// Result of one replay step
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// Next row, converted by the caller
    Row(T),
    /// No rows left
    EndOfData,
}

/// Convert a configured value to the type of the field at `path`
pub fn typed_value(message: &Message, path: &str, value: &str) -> Result<FilterValue> {
    let field = message.resolve_path(path)?;
    let key = format!("query.{}", path);
    match &field.field_type {
        t if t.is_small_integer() || matches!(t, FieldType::UInt64) => value
            .trim()
            .parse::<i64>()
            .map(FilterValue::Integer)
            .map_err(|e| Error::config(key, format!("invalid integer value '{}': {}", value, e))),
        FieldType::Double => value
            .trim()
            .parse::<f64>()
            .map(FilterValue::Real)
            .map_err(|e| Error::config(key, format!("invalid double value '{}': {}", value, e))),
        _ => Ok(FilterValue::Text(value.to_string())),
    }
}

fn json_path(path: &str) -> String {
    format!("'$.{}'", path.replace('\'', "''"))
}

/// One open replay over one table
#[derive(Debug, Clone)]
pub struct ReplayQuery {
    table: String,
    sql: String,
    params: Vec<FilterValue>,
    typing: PredicateTyping,
    cursor: i64,
    exhausted: bool,
    rows: u64,
}

impl ReplayQuery {
    /// Replay every row of a message table, sequence column first
    pub fn table(mapping: &TableMapping) -> Self {
        let sql = format!(
            "SELECT rowid, {} FROM {} WHERE rowid > ?1 ORDER BY rowid LIMIT 1",
            mapping.select_columns(),
            quote_ident(&mapping.table)
        );
        debug!(target: "sqlbridge::replay", table = %mapping.table, sql = %sql, "Replay query");
        Self::with_sql(&mapping.table, sql, Vec::new(), PredicateTyping::Typed)
    }

    /// Replay the shared structured-text table
    ///
    /// `message` anchors the replay on one message name and types the path
    /// predicates. Without it every predicate value is compared as text and
    /// the query reports [`PredicateTyping::Untyped`].
    pub fn predicates(
        table: &str,
        message: Option<&Message>,
        filters: &[(String, String)],
    ) -> Result<Self> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(message) = message {
            params.push(FilterValue::Text(message.name.clone()));
            clauses.push(format!("{} = ?{}", quote_ident(NAME_COLUMN), params.len() + 1));
        }

        let typing = match message {
            None if !filters.is_empty() => {
                warn!(target: "sqlbridge::replay", table, "Query without message name, string comparison");
                PredicateTyping::Untyped
            }
            _ => PredicateTyping::Typed,
        };

        for (path, value) in filters {
            let bound = match message {
                Some(message) => typed_value(message, path, value)?,
                None => FilterValue::Text(value.clone()),
            };
            debug!(target: "sqlbridge::replay", path = %path, value = %bound, "Query predicate");
            params.push(bound);
            clauses.push(format!(
                "json_extract({}, {}) = ?{}",
                quote_ident(DATA_COLUMN),
                json_path(path),
                params.len() + 1
            ));
        }

        let mut sql = format!(
            "SELECT rowid, {}, {}, {} FROM {} WHERE rowid > ?1",
            quote_ident(JSON_SEQ_COLUMN),
            quote_ident(NAME_COLUMN),
            quote_ident(DATA_COLUMN),
            quote_ident(table)
        );
        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        sql.push_str(" ORDER BY rowid LIMIT 1");
        debug!(target: "sqlbridge::replay", table, sql = %sql, "Replay query");

        Ok(Self::with_sql(table, sql, params, typing))
    }

    fn with_sql(table: &str, sql: String, params: Vec<FilterValue>, typing: PredicateTyping) -> Self {
        ReplayQuery {
            table: table.to_string(),
            sql,
            params,
            typing,
            cursor: i64::MIN,
            exhausted: false,
            rows: 0,
        }
    }

    fn exec_error(&self, e: impl fmt::Display) -> Error {
        Error::Exec {
            message: self.table.clone(),
            detail: format!("failed to select data: {}", e),
        }
    }

    /// Fetch the next row and convert it with `extract`
    ///
    /// `extract` receives the row with the first selected column at
    /// [`FIRST_COLUMN`]. Once exhausted, every further call returns
    /// [`Step::EndOfData`].
    pub fn step<T, F>(&mut self, conn: &Connection, extract: F) -> Result<Step<T>>
    where
        F: FnOnce(&Row<'_>) -> Result<T>,
    {
        if self.exhausted {
            return Ok(Step::EndOfData);
        }

        let mut stmt = conn
            .prepare_cached(&self.sql)
            .map_err(|e| self.exec_error(e))?;
        stmt.raw_bind_parameter(1, self.cursor)
            .map_err(|e| self.exec_error(e))?;
        for (i, value) in self.params.iter().enumerate() {
            stmt.raw_bind_parameter(i + 2, value)
                .map_err(|e| self.exec_error(e))?;
        }

        let mut rows = stmt.raw_query();
        match rows.next() {
            Ok(Some(row)) => {
                let rowid: i64 = row.get(0).map_err(|e| self.exec_error(e))?;
                let value = extract(row)?;
                self.cursor = rowid;
                self.rows += 1;
                Ok(Step::Row(value))
            }
            Ok(None) => {
                debug!(target: "sqlbridge::replay", table = %self.table, rows = self.rows, "Query finished");
                self.exhausted = true;
                Ok(Step::EndOfData)
            }
            Err(e) => Err(self.exec_error(e)),
        }
    }

    /// Table being replayed
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Select statement text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound predicate values, in placeholder order after the cursor
    pub fn params(&self) -> &[FilterValue] {
        &self.params
    }

    /// Predicate typing mode
    pub fn typing(&self) -> PredicateTyping {
        self.typing
    }

    /// True once a step returned end of data
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Rows delivered so far
    pub fn rows(&self) -> u64 {
        self.rows
    }
}
