//! Host message envelope and the channel control scheme
//!
//! The host runtime exchanges typed binary messages with a channel. Data
//! messages carry a record of a schema message; control messages carry a
//! record of the control scheme below.

use crate::error::{Error, Result};
use crate::layout::{RecordBuffer, RecordView};
use crate::scheme::{Field, FieldType, Message, MessageSchema};

/// Message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    /// Record of the data schema
    Data,
    /// Record of the control scheme
    Control,
}

/// Message exchanged with the host runtime
#[derive(Debug, Clone, PartialEq)]
pub struct Msg {
    /// Kind
    pub kind: MsgType,
    /// Message identifier within its scheme
    pub msgid: i32,
    /// Sequence number
    pub seq: i64,
    /// Encoded record
    pub data: Vec<u8>,
}

impl Msg {
    /// Data message
    pub fn data(msgid: i32, seq: i64, data: Vec<u8>) -> Self {
        Msg {
            kind: MsgType::Data,
            msgid,
            seq,
            data,
        }
    }

    /// Control message
    pub fn control(msgid: i32, data: Vec<u8>) -> Self {
        Msg {
            kind: MsgType::Control,
            msgid,
            seq: 0,
            data,
        }
    }

    /// True for data messages
    pub fn is_data(&self) -> bool {
        self.kind == MsgType::Data
    }

    /// True for control messages
    pub fn is_control(&self) -> bool {
        self.kind == MsgType::Control
    }
}

/// Control messages produced and consumed by the channels
pub mod control {
    use super::*;

    /// Emitted once when a replay exhausts its rows
    pub const END_OF_DATA: i32 = 1;

    /// Selects the table of a message for replay
    pub const TABLE_NAME: i32 = 2;

    /// Control scheme: `EndOfData` (id 1) and `TableName { msgid: int64 }` (id 2)
    pub fn schema() -> MessageSchema {
        let messages = vec![
            Message::builder("EndOfData", END_OF_DATA).build(),
            Message::builder("TableName", TABLE_NAME)
                .field(Field::new("msgid", FieldType::Int64))
                .build(),
        ];
        match MessageSchema::new(messages) {
            Ok(schema) => schema,
            // ids and names above are distinct
            Err(_) => MessageSchema::default(),
        }
    }

    /// End-of-data notification
    pub fn end_of_data() -> Msg {
        Msg::control(END_OF_DATA, Vec::new())
    }

    /// True if `msg` is the end-of-data notification
    pub fn is_end_of_data(msg: &Msg) -> bool {
        msg.is_control() && msg.msgid == END_OF_DATA
    }

    /// Body of the `TableName` control message
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TableName {
        /// Identifier of the message whose table to replay
        pub msgid: i64,
    }

    impl TableName {
        const SIZE: usize = 8;

        fn field() -> Field {
            Field::new("msgid", FieldType::Int64)
        }

        /// Build the control message
        pub fn to_msg(&self) -> Result<Msg> {
            let mut buf = RecordBuffer::new(Self::SIZE);
            buf.write_integer(&Self::field(), self.msgid)?;
            Ok(Msg::control(TABLE_NAME, buf.into_bytes()))
        }

        /// Decode the body of a `TableName` control message
        pub fn from_msg(msg: &Msg) -> Result<Self> {
            if !msg.is_control() || msg.msgid != TABLE_NAME {
                return Err(Error::UnknownMessage(format!(
                    "control message {} is not TableName",
                    msg.msgid
                )));
            }
            let view = RecordView::new(&msg.data, Self::SIZE)?;
            Ok(TableName {
                msgid: view.read_integer(&Self::field())?,
            })
        }
    }
}
