//! Channels for sqlbridge
//!
//! Two ways of persisting a stream of binary messages into SQLite:
//! - [`TableChannel`]: one table per message, one column per field
//! - [`JsonChannel`]: one shared `(seq, name, data)` table with encoded payloads,
//!   plus [`JsonReader`] for extra replays over an open channel
//!
//! Both channels follow the same lifecycle: `new` → `open` → `post` /
//! `process` → `close` (also run on drop).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod codec;
pub mod config;
pub mod json_channel;
pub mod table_channel;

pub use channel::ChannelState;
pub use codec::{JsonCodec, RecordCodec};
pub use config::{ChannelConfig, ChannelUrl, Direction, OpenParams};
pub use json_channel::{JsonChannel, JsonReader};
pub use table_channel::TableChannel;

pub use sqlbridge_core::{
    control, Error, Field, FieldType, IndexPolicy, Message, MessageSchema, Msg, MsgType,
    RecordBuffer, RecordView, Result,
};
pub use sqlbridge_storage::{JournalMode, PredicateTyping, StoreConfig};
