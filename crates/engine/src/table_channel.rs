//! Structured-mode channel: one table per message
//!
//! Every message with a non-zero id is mapped to its own table. Data
//! messages posted to the channel are written as rows; a replay (selected by
//! the `table` open parameter or by a `TableName` control message) turns the
//! rows of one table back into data messages, followed by a single
//! `EndOfData` control message, after which the channel closes itself.

use crate::channel::{ensure_active, release, ChannelState};
use crate::config::{ChannelConfig, Direction, OpenParams};
use sqlbridge_core::control::{self, TableName};
use sqlbridge_core::{Error, MessageSchema, Msg, MsgType, Result};
use sqlbridge_storage::{
    extract_record, open_connection, write_record, Catalog, Connection, ReplayQuery, Step,
    TableMapping, TransactionBatcher, FIRST_COLUMN,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Active replay of one message table
#[derive(Debug)]
struct TableReplay {
    msgid: i32,
    query: ReplayQuery,
}

impl TableReplay {
    fn new(mapping: &TableMapping) -> Self {
        info!(target: "sqlbridge::replay", table = %mapping.table, message = %mapping.message.name, "Start replay");
        TableReplay {
            msgid: mapping.msgid,
            query: ReplayQuery::table(mapping),
        }
    }
}

/// Resources held while the channel is open
struct Session {
    conn: Connection,
    catalog: Catalog,
    batcher: TransactionBatcher,
    replay: Option<TableReplay>,
}

/// Channel writing each message type to its own table
///
/// # Example
///
/// ```ignore
/// let mut channel = TableChannel::new(ChannelConfig::new("data.db"), schema)?;
/// channel.open(&OpenParams::new())?;
/// channel.post(&Msg::data(10, 1, record))?;
/// channel.close();
/// ```
pub struct TableChannel {
    config: ChannelConfig,
    schema: Arc<MessageSchema>,
    state: ChannelState,
    session: Option<Session>,
}

impl TableChannel {
    /// Validate the configuration and create a closed channel
    ///
    /// The channel is write-capable by nature; a read-only direction is a
    /// configuration error.
    pub fn new(config: ChannelConfig, schema: impl Into<Arc<MessageSchema>>) -> Result<Self> {
        config.validate()?;
        if config.dir.unwrap_or(Direction::Write) == Direction::Read {
            return Err(Error::config("dir", "SQLite channel is write-only"));
        }
        Ok(TableChannel {
            config,
            schema: schema.into(),
            state: ChannelState::Closed,
            session: None,
        })
    }

    /// Open the database, create missing tables and optionally start a replay
    pub fn open(&mut self, params: &OpenParams) -> Result<()> {
        if self.state == ChannelState::Active {
            return Err(Error::InvalidState("channel is already open".to_string()));
        }
        let store = &self.config.store;
        info!(
            target: "sqlbridge::channel",
            path = %self.config.path,
            journal = %store.journal,
            bulk_size = store.bulk_size,
            "Open channel"
        );

        let conn = open_connection(&self.config.path, store.journal)?;
        let catalog = Catalog::build(&conn, &self.schema, store.seq_index, store.replace)?;

        let replay = match params.table.as_deref().filter(|t| !t.is_empty()) {
            Some(table) => {
                let mapping = catalog.by_table(table).ok_or_else(|| {
                    Error::UnknownMessage(format!("no message is mapped to table '{}'", table))
                })?;
                Some(TableReplay::new(mapping))
            }
            None => None,
        };

        self.session = Some(Session {
            conn,
            catalog,
            batcher: TransactionBatcher::new(store.bulk_size),
            replay,
        });
        self.state = ChannelState::Active;
        Ok(())
    }

    fn session_mut(&mut self, op: &str) -> Result<&mut Session> {
        ensure_active(self.state, op)?;
        self.session
            .as_mut()
            .ok_or_else(|| Error::InvalidState(format!("{} without a session", op)))
    }

    /// Write a data message, or handle a `TableName` control message
    ///
    /// A failed write leaves the open batch untouched.
    pub fn post(&mut self, msg: &Msg) -> Result<()> {
        let session = self.session_mut("post")?;
        match msg.kind {
            MsgType::Control => {
                if msg.msgid != control::TABLE_NAME {
                    return Err(Error::UnknownMessage(format!(
                        "control message {}",
                        msg.msgid
                    )));
                }
                let request = TableName::from_msg(msg)?;
                let mapping = i32::try_from(request.msgid)
                    .ok()
                    .and_then(|id| session.catalog.get(id))
                    .ok_or_else(|| {
                        Error::UnknownMessage(format!("message {} not found", request.msgid))
                    })?;
                session.replay = Some(TableReplay::new(mapping));
                Ok(())
            }
            MsgType::Data => {
                if msg.msgid == 0 {
                    return Err(Error::UnknownMessage(
                        "unable to insert message without msgid".to_string(),
                    ));
                }
                let mapping = session
                    .catalog
                    .get(msg.msgid)
                    .ok_or_else(|| Error::UnknownMessage(format!("message {} not found", msg.msgid)))?;

                session.batcher.begin(&session.conn, &mapping.message.name)?;
                write_record(&session.conn, mapping, msg.seq, &msg.data)?;
                session.batcher.note_write(&session.conn)?;
                Ok(())
            }
        }
    }

    /// Advance the replay by one row
    ///
    /// Returns the next data message, the one `EndOfData` control message
    /// (after which the channel is closed), or `None` when no replay is
    /// running.
    pub fn process(&mut self) -> Result<Option<Msg>> {
        if self.state != ChannelState::Active {
            return Ok(None);
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        let Some(replay) = session.replay.as_mut() else {
            return Ok(None);
        };

        let mapping = session
            .catalog
            .get(replay.msgid)
            .ok_or_else(|| Error::UnknownMessage(format!("message {} not found", replay.msgid)))?;
        let step = replay.query.step(&session.conn, |row| {
            let seq: i64 = row.get(FIRST_COLUMN).map_err(|e| {
                Error::extract(&mapping.message.name, sqlbridge_storage::SEQ_COLUMN, e.to_string())
            })?;
            let buf = extract_record(row, FIRST_COLUMN + 1, &mapping.message)?;
            Ok(Msg::data(mapping.msgid, seq, buf.into_bytes()))
        })?;

        match step {
            Step::Row(msg) => Ok(Some(msg)),
            Step::EndOfData => {
                debug!(target: "sqlbridge::replay", table = %mapping.table, rows = replay.query.rows(), "Replay finished");
                session.replay = None;
                self.close();
                Ok(Some(control::end_of_data()))
            }
        }
    }

    /// Commit the open batch, if any
    pub fn flush(&mut self) -> Result<()> {
        let session = self.session_mut("flush")?;
        session.batcher.flush(&session.conn)?;
        Ok(())
    }

    /// Commit pending writes and release the database
    ///
    /// Commit failures are logged; closing always succeeds.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            release(session.conn, session.batcher, &self.config.path);
        }
        self.state = ChannelState::Closed;
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// True while a replay is pending
    pub fn is_replaying(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |s| s.replay.is_some())
    }

    /// Writes since the last commit
    pub fn pending_writes(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.batcher.pending())
    }

    /// Message schema
    pub fn schema(&self) -> &MessageSchema {
        &self.schema
    }

    /// Control messages produced and consumed by this channel
    pub fn control_schema() -> MessageSchema {
        control::schema()
    }

    /// Channel configuration
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

impl Drop for TableChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TableChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableChannel")
            .field("path", &self.config.path)
            .field("state", &self.state)
            .field("replaying", &self.is_replaying())
            .finish()
    }
}
