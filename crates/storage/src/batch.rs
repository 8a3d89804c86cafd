//! Transaction batching for writes
//!
//! A transaction is opened lazily before the first write after open or
//! after a commit, and committed once `bulk_size` writes succeeded. A
//! `bulk_size` of zero never auto-commits: `flush` (called on close) is the
//! only commit path.
//!
//! Failed writes do not count and do not end the transaction.

use rusqlite::Connection;
use sqlbridge_core::{Error, Result};
use tracing::{debug, warn};

/// Write batching state for one connection
#[derive(Debug, Clone, Default)]
pub struct TransactionBatcher {
    /// Writes per auto-commit (0 = never)
    bulk_size: usize,
    /// Successful writes since the last commit
    pending: usize,
    /// Transaction currently open
    open: bool,
    /// Commits performed
    total_commits: u64,
    /// Successful writes recorded
    total_writes: u64,
}

impl TransactionBatcher {
    /// Create a batcher with the given threshold
    pub fn new(bulk_size: usize) -> Self {
        Self {
            bulk_size,
            ..Default::default()
        }
    }

    /// Open a transaction unless one is already open
    ///
    /// `message` names the write that needed the transaction.
    pub fn begin(&mut self, conn: &Connection, message: &str) -> Result<()> {
        if self.open {
            return Ok(());
        }
        conn.execute_batch("BEGIN").map_err(|e| Error::Exec {
            message: message.to_string(),
            detail: format!("failed to begin transaction: {}", e),
        })?;
        self.open = true;
        debug!(target: "sqlbridge::txn", "Transaction started");
        Ok(())
    }

    /// Record one successful write; commits when the threshold is reached
    ///
    /// Returns `true` if this write triggered a commit.
    pub fn note_write(&mut self, conn: &Connection) -> Result<bool> {
        self.pending += 1;
        self.total_writes += 1;
        if self.bulk_size > 0 && self.pending >= self.bulk_size {
            self.commit(conn)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Commit if a transaction is open; no-op otherwise
    ///
    /// Returns `true` if a commit happened.
    pub fn flush(&mut self, conn: &Connection) -> Result<bool> {
        if !self.open {
            return Ok(false);
        }
        self.commit(conn)?;
        Ok(true)
    }

    fn commit(&mut self, conn: &Connection) -> Result<()> {
        match conn.execute_batch("COMMIT") {
            Ok(()) => {
                debug!(target: "sqlbridge::txn", writes = self.pending, "Transaction committed");
                self.open = false;
                self.pending = 0;
                self.total_commits += 1;
                Ok(())
            }
            Err(e) => {
                // a failed COMMIT may leave the transaction open (busy) or roll it back
                self.open = !conn.is_autocommit();
                if !self.open {
                    self.pending = 0;
                }
                warn!(target: "sqlbridge::txn", error = %e, still_open = self.open, "Commit failed");
                Err(Error::Commit(e.to_string()))
            }
        }
    }

    /// Successful writes since the last commit
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// True while a transaction is open
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Configured threshold
    pub fn bulk_size(&self) -> usize {
        self.bulk_size
    }

    /// Commits performed so far
    pub fn total_commits(&self) -> u64 {
        self.total_commits
    }

    /// Successful writes recorded so far
    pub fn total_writes(&self) -> u64 {
        self.total_writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Connection, Connection) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.db");
        let writer = Connection::open(&path).unwrap();
        writer
            .execute_batch("CREATE TABLE t (x INTEGER)")
            .unwrap();
        let reader = Connection::open(&path).unwrap();
        (dir, writer, reader)
    }

    fn write(batcher: &mut TransactionBatcher, conn: &Connection, x: i64) -> bool {
        batcher.begin(conn, "t").unwrap();
        conn.execute("INSERT INTO t VALUES (?1)", [x]).unwrap();
        batcher.note_write(conn).unwrap()
    }

    fn visible(reader: &Connection) -> i64 {
        reader
            .query_row("SELECT count(*) FROM t", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_commit_at_threshold() {
        let (_dir, conn, reader) = setup();
        let mut batcher = TransactionBatcher::new(10);

        for i in 0..9 {
            assert!(!write(&mut batcher, &conn, i));
        }
        assert_eq!(batcher.pending(), 9);
        assert_eq!(visible(&reader), 0);

        assert!(write(&mut batcher, &conn, 9));
        assert_eq!(batcher.pending(), 0);
        assert!(!batcher.is_open());
        assert_eq!(batcher.total_commits(), 1);
        assert_eq!(visible(&reader), 10);

        for i in 10..15 {
            write(&mut batcher, &conn, i);
        }
        assert_eq!(visible(&reader), 10);
        assert!(batcher.flush(&conn).unwrap());
        assert_eq!(visible(&reader), 15);
    }

    #[test]
    fn test_zero_threshold_never_auto_commits() {
        let (_dir, conn, reader) = setup();
        let mut batcher = TransactionBatcher::new(0);

        for i in 0..10_000 {
            assert!(!write(&mut batcher, &conn, i));
        }
        assert_eq!(batcher.total_commits(), 0);
        assert_eq!(batcher.pending(), 10_000);
        assert_eq!(visible(&reader), 0);

        assert!(batcher.flush(&conn).unwrap());
        assert_eq!(visible(&reader), 10_000);
    }

    #[test]
    fn test_threshold_one_commits_every_write() {
        let (_dir, conn, reader) = setup();
        let mut batcher = TransactionBatcher::new(1);
        assert!(write(&mut batcher, &conn, 1));
        assert!(write(&mut batcher, &conn, 2));
        assert_eq!(batcher.total_commits(), 2);
        assert_eq!(visible(&reader), 2);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let (_dir, conn, _reader) = setup();
        let mut batcher = TransactionBatcher::new(0);
        assert!(!batcher.flush(&conn).unwrap());
        write(&mut batcher, &conn, 1);
        assert!(batcher.flush(&conn).unwrap());
        assert!(!batcher.flush(&conn).unwrap());
        assert_eq!(batcher.total_commits(), 1);
    }

    #[test]
    fn test_failed_write_keeps_transaction() {
        let (_dir, conn, reader) = setup();
        let mut batcher = TransactionBatcher::new(0);
        write(&mut batcher, &conn, 1);

        batcher.begin(&conn, "t").unwrap();
        assert!(conn.execute("INSERT INTO missing VALUES (1)", []).is_err());
        assert!(batcher.is_open());
        assert_eq!(batcher.pending(), 1);

        batcher.flush(&conn).unwrap();
        assert_eq!(visible(&reader), 1);
    }

    #[test]
    fn test_failed_begin_names_message() {
        let (_dir, conn, _reader) = setup();
        conn.execute_batch("BEGIN").unwrap();
        let mut batcher = TransactionBatcher::new(0);
        match batcher.begin(&conn, "m") {
            Err(Error::Exec { message, .. }) => assert_eq!(message, "m"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!batcher.is_open());
    }
}
