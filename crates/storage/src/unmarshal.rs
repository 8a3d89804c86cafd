//! Record unmarshalling
//!
//! Rebuilds a binary record from one row. Columns are read in field
//! declaration order starting at a given column index. Scalars land at their
//! fixed offsets; string columns are appended to the trailing area and the
//! field's offset pointer is patched to reference them.

use rusqlite::types::ValueRef;
use rusqlite::Row;
use sqlbridge_core::{Error, Field, FieldType, Message, RecordBuffer, Result, SubType};

fn value_kind(value: &ValueRef<'_>) -> &'static str {
    match value {
        ValueRef::Null => "NULL",
        ValueRef::Integer(_) => "INTEGER",
        ValueRef::Real(_) => "REAL",
        ValueRef::Text(_) => "TEXT",
        ValueRef::Blob(_) => "BLOB",
    }
}

/// Write one column value into `buf` according to `field`
pub fn extract_field(
    buf: &mut RecordBuffer,
    message: &Message,
    field: &Field,
    value: ValueRef<'_>,
) -> Result<()> {
    let mismatch = |expected: &str, value: &ValueRef<'_>| {
        Error::extract(
            &message.name,
            &field.name,
            format!("expected {}, got {}", expected, value_kind(value)),
        )
    };
    let layout_err = |e: Error| Error::extract(&message.name, &field.name, e.to_string());

    match (&field.field_type, value) {
        (t, ValueRef::Integer(v)) if t.is_small_integer() => {
            buf.write_integer(field, v).map_err(layout_err)
        }
        (t, other) if t.is_small_integer() => Err(mismatch("INTEGER", &other)),

        (FieldType::Double, ValueRef::Real(v)) => buf.write_double(field, v).map_err(layout_err),
        (FieldType::Double, ValueRef::Integer(v)) => {
            buf.write_double(field, v as f64).map_err(layout_err)
        }
        (FieldType::Double, other) => Err(mismatch("REAL", &other)),

        (FieldType::Bytes, ValueRef::Text(bytes) | ValueRef::Blob(bytes)) => {
            buf.write_bytes(field, bytes).map_err(layout_err)
        }
        (FieldType::Bytes, other) => Err(mismatch(
            match field.sub_type {
                SubType::ByteString => "TEXT",
                SubType::None => "BLOB",
            },
            &other,
        )),

        (FieldType::Pointer(_), ValueRef::Text(text) | ValueRef::Blob(text))
            if field.is_string_pointer() =>
        {
            buf.set_string(field, text).map(|_| ()).map_err(layout_err)
        }
        (FieldType::Pointer(_), other) if field.is_string_pointer() => {
            Err(mismatch("TEXT", &other))
        }

        (other, _) => Err(Error::extract(
            &message.name,
            &field.name,
            format!("unsupported field type {}", other.name()),
        )),
    }
}

/// Rebuild a record of `message` from `row`, reading fields from `first_column` on
pub fn extract_record(row: &Row<'_>, first_column: usize, message: &Message) -> Result<RecordBuffer> {
    let mut buf = RecordBuffer::new(message.size);
    for (i, field) in message.fields.iter().enumerate() {
        let value = row
            .get_ref(first_column + i)
            .map_err(|e| Error::extract(&message.name, &field.name, e.to_string()))?;
        extract_field(&mut buf, message, field, value)?;
    }
    Ok(buf)
}
