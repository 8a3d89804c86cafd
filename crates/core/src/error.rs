//! Error types for sqlbridge
//!
//! This module defines the error taxonomy shared by every crate in the
//! workspace. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Fatal-at-open errors (`Schema`, `Ddl`, `Config`) keep a session from
//! reaching a usable state. Per-record errors (`Bind`, `Exec`, `Extract`,
//! `UnknownMessage`) fail a single call and name the offending message and
//! field so the caller can skip, retry or escalate.

use thiserror::Error;

/// Result type alias for sqlbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sqlbridge
#[derive(Debug, Error)]
pub enum Error {
    /// Unsupported field type or inconsistent schema
    #[error("Schema error: message {message} field {field}: {reason}")]
    Schema {
        /// Message name
        message: String,
        /// Field name (empty when the error concerns the whole message)
        field: String,
        /// What is wrong
        reason: String,
    },

    /// Two messages share a non-zero identifier
    #[error("Schema error: duplicate message id {msgid} ({first} and {second})")]
    DuplicateMessageId {
        /// Shared identifier
        msgid: i32,
        /// First message declaring it
        first: String,
        /// Second message declaring it
        second: String,
    },

    /// Table, index or statement creation failed
    #[error("DDL error for table {table}: {detail}")]
    Ddl {
        /// Table the statement targeted
        table: String,
        /// Engine message
        detail: String,
    },

    /// A field could not be bound to a write statement
    #[error("Bind error: message {message} field {field}: {reason}")]
    Bind {
        /// Message name
        message: String,
        /// Field name
        field: String,
        /// What failed
        reason: String,
    },

    /// Statement execution failed (constraint violation, engine failure)
    #[error("Exec error for message {message}: {detail}")]
    Exec {
        /// Message name
        message: String,
        /// Engine message
        detail: String,
    },

    /// A replayed column could not be written back into the record
    #[error("Extract error: message {message} field {field}: {reason}")]
    Extract {
        /// Message name
        message: String,
        /// Field name
        field: String,
        /// What failed
        reason: String,
    },

    /// Transaction begin/commit failed
    #[error("Commit error: {0}")]
    Commit(String),

    /// Invalid configuration value
    #[error("Config error: {key}: {reason}")]
    Config {
        /// Option key
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// Structured-text codec failure
    #[error("Codec error: message {message}: {reason}")]
    Codec {
        /// Message name
        message: String,
        /// What failed
        reason: String,
    },

    /// Out of bounds access into a record buffer
    #[error("Layout error: {0}")]
    Layout(String),

    /// Message id or name not present in the schema
    #[error("Unknown message: {0}")]
    UnknownMessage(String),

    /// Operation not valid in the current session state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Create a schema error for one field
    pub fn schema(
        message: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Schema {
            message: message.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a bind error for one field
    pub fn bind(
        message: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Bind {
            message: message.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an extract error for one field
    pub fn extract(
        message: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Extract {
            message: message.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Config {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a codec error
    pub fn codec(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Codec {
            message: message.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that abort a session open
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Schema { .. }
                | Error::DuplicateMessageId { .. }
                | Error::Ddl { .. }
                | Error::Config { .. }
        )
    }
}
