//! Structured-text channel: one shared table for all messages
//!
//! Records are encoded with a [`RecordCodec`] and stored as
//! `(seq, name, data)` rows of a single table. A readable channel replays the
//! table on open, optionally filtered by message name (`query`) and by
//! equality on payload paths (`query.<path>`). A [`JsonReader`] runs an
//! independent replay over the connection of an open channel.

use crate::channel::{ensure_active, release, ChannelState};
use crate::codec::{JsonCodec, RecordCodec};
use crate::config::{ChannelConfig, Direction, OpenParams};
use sqlbridge_core::{control, Error, MessageSchema, Msg, MsgType, Result};
use sqlbridge_storage::{
    ensure_json_table, open_connection, prepare_insert, write_payload, Connection,
    PredicateTyping, ReplayQuery, Row, Step, TransactionBatcher, ValueRef, FIRST_COLUMN,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Build the replay for `params` over the shared `table`
fn build_query(table: &str, schema: &MessageSchema, params: &OpenParams) -> Result<ReplayQuery> {
    let message = match params.query.as_deref() {
        Some(name) => Some(schema.by_name(name).ok_or_else(|| {
            Error::UnknownMessage(format!("query for message not in scheme: '{}'", name))
        })?),
        None => None,
    };
    ReplayQuery::predicates(table, message.map(|m| &**m), &params.filters)
}

/// Turn one `(seq, name, data)` row into a data message
fn decode_row<C: RecordCodec>(row: &Row<'_>, schema: &MessageSchema, codec: &C) -> Result<Msg> {
    let column = move |i: usize| {
        row.get_ref(FIRST_COLUMN + i)
            .map_err(|e| Error::extract("", "", e.to_string()))
    };

    let seq = match column(0)? {
        ValueRef::Integer(v) => v,
        ValueRef::Null => 0,
        other => {
            return Err(Error::extract(
                "",
                "seq",
                format!("expected INTEGER, got {:?}", other.data_type()),
            ))
        }
    };

    let name = match column(1)? {
        ValueRef::Text(t) | ValueRef::Blob(t) if !t.is_empty() => String::from_utf8_lossy(t),
        _ => {
            return Err(Error::extract(
                "",
                "name",
                format!("NULL name for message (seq {})", seq),
            ))
        }
    };
    let message = schema
        .by_name(&name)
        .ok_or_else(|| Error::extract(&*name, "name", format!("unknown message (seq {})", seq)))?;

    let payload = match column(2)? {
        ValueRef::Text(t) | ValueRef::Blob(t) => t,
        _ => &[][..],
    };
    if payload.is_empty() {
        return Ok(Msg::data(message.msgid, seq, Vec::new()));
    }
    let data = codec.decode(message, payload)?;
    Ok(Msg::data(message.msgid, seq, data))
}

/// Advance `query` by one row
fn next_msg<C: RecordCodec>(
    query: &mut ReplayQuery,
    conn: &Connection,
    schema: &MessageSchema,
    codec: &C,
) -> Result<Step<Msg>> {
    query.step(conn, |row| decode_row(row, schema, codec))
}

struct Session {
    conn: Connection,
    insert_sql: Option<String>,
    batcher: TransactionBatcher,
    replay: Option<ReplayQuery>,
}

/// Channel storing encoded records in one shared table
pub struct JsonChannel<C: RecordCodec = JsonCodec> {
    config: ChannelConfig,
    table: String,
    dir: Direction,
    schema: Arc<MessageSchema>,
    codec: C,
    state: ChannelState,
    session: Option<Session>,
}

impl JsonChannel<JsonCodec> {
    /// Channel with the JSON codec
    pub fn new(config: ChannelConfig, schema: impl Into<Arc<MessageSchema>>) -> Result<Self> {
        Self::with_codec(config, schema, JsonCodec)
    }
}

impl<C: RecordCodec> JsonChannel<C> {
    /// Channel with a custom codec
    ///
    /// # Errors
    ///
    /// `table` is required. `autoclose` only applies to read-only channels
    /// and is ignored otherwise.
    pub fn with_codec(
        config: ChannelConfig,
        schema: impl Into<Arc<MessageSchema>>,
        codec: C,
    ) -> Result<Self> {
        config.validate()?;
        let table = config
            .table
            .clone()
            .ok_or_else(|| Error::config("table", "missing table name"))?;
        let dir = config.dir.unwrap_or(Direction::ReadWrite);
        Ok(JsonChannel {
            config,
            table,
            dir,
            schema: schema.into(),
            codec,
            state: ChannelState::Closed,
            session: None,
        })
    }

    /// Open the database; create the shared table when writable and start
    /// the replay when readable
    pub fn open(&mut self, params: &OpenParams) -> Result<()> {
        if self.state == ChannelState::Active {
            return Err(Error::InvalidState("channel is already open".to_string()));
        }
        let store = &self.config.store;
        info!(
            target: "sqlbridge::channel",
            path = %self.config.path,
            table = %self.table,
            dir = %self.dir,
            codec = self.codec.name(),
            "Open channel"
        );

        let conn = open_connection(&self.config.path, store.journal)?;
        conn.set_prepared_statement_cache_capacity(16);

        let insert_sql = if self.dir.is_writable() {
            ensure_json_table(&conn, &self.table, &self.schema)?;
            Some(prepare_insert(&conn, &self.table)?)
        } else {
            None
        };

        let replay = if self.dir.is_readable() {
            Some(build_query(&self.table, &self.schema, params)?)
        } else {
            None
        };

        self.session = Some(Session {
            conn,
            insert_sql,
            batcher: TransactionBatcher::new(store.bulk_size),
            replay,
        });
        self.state = ChannelState::Active;
        Ok(())
    }

    /// Encode and store a data message; control messages are ignored
    pub fn post(&mut self, msg: &Msg) -> Result<()> {
        ensure_active(self.state, "post")?;
        if msg.kind != MsgType::Data {
            return Ok(());
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::InvalidState("post without a session".to_string()))?;
        let insert_sql = session
            .insert_sql
            .as_deref()
            .ok_or_else(|| Error::InvalidState("inserts not enabled".to_string()))?;
        let message = self
            .schema
            .by_id(msg.msgid)
            .filter(|_| msg.msgid != 0)
            .ok_or_else(|| Error::UnknownMessage(format!("message {} not found", msg.msgid)))?;

        let payload = self.codec.encode(message, &msg.data)?;
        session.batcher.begin(&session.conn, &message.name)?;
        write_payload(&session.conn, insert_sql, msg.seq, &message.name, &payload)?;
        session.batcher.note_write(&session.conn)?;
        Ok(())
    }

    /// Advance the replay by one row
    ///
    /// When the replay is exhausted a single `EndOfData` control message is
    /// returned and, with `autoclose` on a read-only channel, the channel is
    /// closed.
    pub fn process(&mut self) -> Result<Option<Msg>> {
        if self.state != ChannelState::Active {
            return Ok(None);
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        let Some(query) = session.replay.as_mut() else {
            return Ok(None);
        };

        match next_msg(query, &session.conn, &self.schema, &self.codec)? {
            Step::Row(msg) => Ok(Some(msg)),
            Step::EndOfData => {
                session.replay = None;
                if self.autoclose() {
                    debug!(target: "sqlbridge::channel", "Autoclosing channel");
                    self.close();
                }
                Ok(Some(control::end_of_data()))
            }
        }
    }

    fn autoclose(&self) -> bool {
        self.config.autoclose && self.dir == Direction::Read
    }

    /// Commit the open batch, if any
    pub fn flush(&mut self) -> Result<()> {
        ensure_active(self.state, "flush")?;
        if let Some(session) = self.session.as_mut() {
            session.batcher.flush(&session.conn)?;
        }
        Ok(())
    }

    /// Commit pending writes and release the database
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            release(session.conn, session.batcher, &self.config.path);
        }
        self.state = ChannelState::Closed;
    }

    /// Independent replay sharing this channel's connection and schema
    ///
    /// The reader borrows the channel, so it cannot outlive it.
    pub fn reader(&self, params: &OpenParams) -> Result<JsonReader<'_, C>> {
        ensure_active(self.state, "reader")?;
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::InvalidState("reader without a session".to_string()))?;
        let query = build_query(&self.table, &self.schema, params)?;
        debug!(target: "sqlbridge::channel", table = %self.table, "Child reader opened");
        Ok(JsonReader {
            conn: &session.conn,
            schema: &self.schema,
            codec: &self.codec,
            query: Some(query),
        })
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

    /// Typing of the active replay's path predicates
    pub fn predicate_typing(&self) -> Option<PredicateTyping> {
        self.session
            .as_ref()
            .and_then(|s| s.replay.as_ref())
            .map(|q| q.typing())
    }

    /// Writes since the last commit
    pub fn pending_writes(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.batcher.pending())
    }

    /// Shared table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Message schema
    pub fn schema(&self) -> &MessageSchema {
        &self.schema
    }
}

impl<C: RecordCodec> Drop for JsonChannel<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: RecordCodec> std::fmt::Debug for JsonChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonChannel")
            .field("path", &self.config.path)
            .field("table", &self.table)
            .field("dir", &self.dir)
            .field("state", &self.state)
            .finish()
    }
}

/// Replay over the connection of an open [`JsonChannel`]
pub struct JsonReader<'p, C: RecordCodec = JsonCodec> {
    conn: &'p Connection,
    schema: &'p MessageSchema,
    codec: &'p C,
    query: Option<ReplayQuery>,
}

impl<'p, C: RecordCodec> JsonReader<'p, C> {
    /// Next data message, the one `EndOfData`, then `None`
    pub fn process(&mut self) -> Result<Option<Msg>> {
        let Some(query) = self.query.as_mut() else {
            return Ok(None);
        };
        match next_msg(query, self.conn, self.schema, self.codec)? {
            Step::Row(msg) => Ok(Some(msg)),
            Step::EndOfData => {
                self.query = None;
                Ok(Some(control::end_of_data()))
            }
        }
    }

    /// True while rows may remain
    pub fn is_replaying(&self) -> bool {
        self.query.is_some()
    }

    /// Typing of the reader's path predicates
    pub fn predicate_typing(&self) -> Option<PredicateTyping> {
        self.query.as_ref().map(|q| q.typing())
    }
}
