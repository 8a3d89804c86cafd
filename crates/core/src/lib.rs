//! Core types for sqlbridge
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: Error taxonomy (schema, DDL, bind, exec, extract, commit)
//! - MessageSchema / Message / Field: Schema model with packed layout
//! - OffsetPointer / RecordView / RecordBuffer: Binary record access
//! - Msg / control: Host message envelope and the control scheme

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod layout;
pub mod message;
pub mod scheme;

pub use error::{Error, Result};
pub use layout::{OffsetPointer, RecordBuffer, RecordView, POINTER_SIZE};
pub use message::{control, Msg, MsgType};
pub use scheme::{
    parse_bool, Field, FieldOptions, FieldType, IndexPolicy, Message, MessageBuilder,
    MessageOptions, MessageSchema, SubType,
};
