//! Store configuration
//!
//! Configuration for how rows are written: journal mode, batch commit
//! threshold, sequence column index policy and insert vs. replace.

use crate::journal::JournalMode;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sqlbridge_core::{Error, IndexPolicy, Result};
use std::path::Path;
use tracing::debug;

/// Store configuration
///
/// Controls how the bridge creates tables and persists writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StoreConfig {
    /// Journal mode applied on open
    pub journal: JournalMode,
    /// Writes per auto-commit, 0 disables auto-commit
    pub bulk_size: usize,
    /// Default index policy of the sequence column
    pub seq_index: IndexPolicy,
    /// `REPLACE INTO` instead of `INSERT INTO`
    pub replace: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            journal: JournalMode::Default,
            bulk_size: 0,
            seq_index: IndexPolicy::Unique,
            replace: false,
        }
    }
}

impl StoreConfig {
    /// Set journal mode
    pub fn with_journal(mut self, journal: JournalMode) -> Self {
        self.journal = journal;
        self
    }

    /// Set batch commit threshold
    pub fn with_bulk_size(mut self, bulk_size: usize) -> Self {
        self.bulk_size = bulk_size;
        self
    }

    /// Set sequence column index policy
    pub fn with_seq_index(mut self, policy: IndexPolicy) -> Self {
        self.seq_index = policy;
        self
    }

    /// Use upsert-by-replace
    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }
}

/// Open (creating if needed) the database at `path` and apply the journal mode
///
/// `:memory:` opens a private in-memory database.
pub fn open_connection(path: impl AsRef<Path>, journal: JournalMode) -> Result<Connection> {
    let path = path.as_ref();
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| Error::Ddl {
        table: String::new(),
        detail: format!("failed to open database '{}': {}", path.display(), e),
    })?;

    if let Some(mode) = journal.pragma_value() {
        debug!(target: "sqlbridge::catalog", journal = mode, "Set journal mode");
        let applied: String = conn
            .query_row(&format!("PRAGMA journal_mode={}", mode), [], |row| row.get(0))
            .map_err(|e| Error::Ddl {
                table: String::new(),
                detail: format!("failed to set journal mode {}: {}", mode, e),
            })?;
        // in-memory databases silently keep "memory"
        if applied != mode && path != Path::new(":memory:") {
            return Err(Error::Ddl {
                table: String::new(),
                detail: format!("journal mode {} not applied, engine reports {}", mode, applied),
            });
        }
    }
    Ok(conn)
}
