//! sqlbridge - store fixed-layout binary messages in SQLite
//!
//! Messages are described by a [`MessageSchema`]. Two channels persist a
//! stream of such messages and replay it back:
//!
//! - [`TableChannel`]: one table per message, one column per field
//! - [`JsonChannel`]: one shared `(seq, name, data)` table with JSON payloads
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlbridge::{ChannelConfig, Field, FieldType, Message, MessageSchema, Msg, OpenParams, TableChannel};
//!
//! let schema = MessageSchema::new(vec![Message::builder("tick", 10)
//!     .field(Field::new("price", FieldType::Double))
//!     .build()])?;
//!
//! let mut channel = TableChannel::new(ChannelConfig::new("ticks.db").with_bulk_size(100), schema)?;
//! channel.open(&OpenParams::new())?;
//! channel.post(&Msg::data(10, 1, record))?;
//! channel.close();
//! ```
//!
//! # Architecture
//!
//! - `sqlbridge-core`: schema model, record layout, messages and errors
//! - `sqlbridge-storage`: DDL, field binding and extraction, batching, replay cursors
//! - `sqlbridge-engine`: channel lifecycle, configuration and the JSON codec

pub use sqlbridge_engine::*;
