//! Field type to column type mapping
//!
//! Pure and total over the supported tags; everything else is a schema
//! error naming the field.

use sqlbridge_core::{Error, Field, FieldType, Message, Result, SubType};
use std::fmt;

/// Column type of a mapped field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 64-bit signed integer
    Integer,
    /// Double
    Real,
    /// Raw bytes
    Blob,
    /// Text
    Text,
}

impl ColumnType {
    /// SQL type name used in `CREATE TABLE`
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Blob => "BLOB",
            ColumnType::Text => "VARCHAR",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// Map a field of `message` to its column type
pub fn column_type(message: &Message, field: &Field) -> Result<ColumnType> {
    let unsupported = |reason: &str| -> Result<ColumnType> {
        Err(Error::schema(&message.name, &field.name, reason))
    };
    match &field.field_type {
        t if t.is_small_integer() => Ok(ColumnType::Integer),
        FieldType::UInt64 => unsupported("UInt64 not supported"),
        FieldType::Double => Ok(ColumnType::Real),
        FieldType::Decimal128 => unsupported("Decimal128 not supported"),
        FieldType::Bytes => match field.sub_type {
            SubType::ByteString => Ok(ColumnType::Text),
            SubType::None => Ok(ColumnType::Blob),
        },
        FieldType::Message(_) => unsupported("Nested messages not supported"),
        FieldType::Array => unsupported("Nested arrays not supported"),
        FieldType::Pointer(_) if field.is_string_pointer() => Ok(ColumnType::Text),
        FieldType::Pointer(_) => unsupported("Pointers to non-string data not supported"),
        FieldType::Union => unsupported("Union not supported"),
        other => unsupported(&format!("Invalid field type {}", other.name())),
    }
}
