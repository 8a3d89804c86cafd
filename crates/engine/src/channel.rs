//! Pieces shared by the channel implementations

use sqlbridge_core::{Error, Result};
use sqlbridge_storage::{Connection, TransactionBatcher};
use std::fmt;
use tracing::{error, info};

/// Lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// No connection
    #[default]
    Closed,
    /// Open and usable
    Active,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Closed => write!(f, "Closed"),
            ChannelState::Active => write!(f, "Active"),
        }
    }
}

pub(crate) fn not_active(op: &str) -> Error {
    Error::InvalidState(format!("{} on a closed channel", op))
}

pub(crate) fn ensure_active(state: ChannelState, op: &str) -> Result<()> {
    match state {
        ChannelState::Active => Ok(()),
        ChannelState::Closed => Err(not_active(op)),
    }
}

/// Final commit of a closing session; failures are logged only
pub(crate) fn release(conn: Connection, mut batcher: TransactionBatcher, path: &str) {
    if let Err(e) = batcher.flush(&conn) {
        error!(target: "sqlbridge::channel", path, error = %e, "Final commit failed");
    }
    if let Err((_, e)) = conn.close() {
        error!(target: "sqlbridge::channel", path, error = %e, "Failed to close database");
    }
    info!(
        target: "sqlbridge::channel",
        path,
        writes = batcher.total_writes(),
        commits = batcher.total_commits(),
        "Channel closed"
    );
}
