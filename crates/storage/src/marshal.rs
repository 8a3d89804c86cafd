//! Record marshalling
//!
//! Binds the fields of one binary record, in schema order, to the positional
//! parameters of a write statement. Parameter 1 is the sequence number.
//! Text and blob values borrow from the caller's record.

use crate::catalog::TableMapping;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, Statement};
use sqlbridge_core::{Error, Field, FieldType, Message, RecordView, Result, SubType};

/// Value of one field, borrowing byte payloads from the record
pub fn field_value<'a>(
    message: &Message,
    field: &Field,
    record: &RecordView<'a>,
) -> Result<ToSqlOutput<'a>> {
    let bind_err = |e: Error| Error::bind(&message.name, &field.name, e.to_string());
    match &field.field_type {
        t if t.is_small_integer() => Ok(ToSqlOutput::Owned(Value::Integer(
            record.read_integer(field).map_err(bind_err)?,
        ))),
        FieldType::Double => Ok(ToSqlOutput::Owned(Value::Real(
            record.read_double(field).map_err(bind_err)?,
        ))),
        FieldType::Bytes => {
            let bytes = record
                .bytes_at(field.offset, field.size)
                .map_err(bind_err)?;
            match field.sub_type {
                SubType::ByteString => {
                    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                    Ok(ToSqlOutput::Borrowed(ValueRef::Text(&bytes[..len])))
                }
                SubType::None => Ok(ToSqlOutput::Borrowed(ValueRef::Blob(bytes))),
            }
        }
        FieldType::Pointer(_) if field.is_string_pointer() => {
            let ptr = record.read_pointer(field.offset).map_err(bind_err)?;
            if ptr.size == 0 {
                return Ok(ToSqlOutput::Borrowed(ValueRef::Text(b"")));
            }
            if ptr.entity != 1 {
                return Err(Error::bind(
                    &message.name,
                    &field.name,
                    format!("string pointer with entity size {}", ptr.entity),
                ));
            }
            // size counts the terminating unit
            let text = record
                .read_at(ptr.offset as usize, ptr.size as usize - 1)
                .map_err(bind_err)?;
            Ok(ToSqlOutput::Borrowed(ValueRef::Text(text)))
        }
        other => Err(Error::bind(
            &message.name,
            &field.name,
            format!("unsupported field type {}", other.name()),
        )),
    }
}

/// Bind `seq` and every field of `record` to `stmt`
pub fn bind_record(
    stmt: &mut Statement<'_>,
    seq: i64,
    record: &RecordView<'_>,
    message: &Message,
) -> Result<()> {
    stmt.raw_bind_parameter(1, seq)
        .map_err(|e| Error::bind(&message.name, crate::catalog::SEQ_COLUMN, e.to_string()))?;
    for (i, field) in message.fields.iter().enumerate() {
        let value = field_value(message, field, record)?;
        stmt.raw_bind_parameter(i + 2, value)
            .map_err(|e| Error::bind(&message.name, &field.name, e.to_string()))?;
    }
    Ok(())
}

/// Bind and execute the write statement of `mapping` for one record
///
/// A failure leaves any open transaction untouched; the record is not
/// persisted.
pub fn write_record(
    conn: &Connection,
    mapping: &TableMapping,
    seq: i64,
    data: &[u8],
) -> Result<()> {
    let message = &mapping.message;
    let record = RecordView::new(data, message.size)
        .map_err(|e| Error::bind(&message.name, "", e.to_string()))?;
    let mut stmt = conn
        .prepare_cached(&mapping.insert_sql)
        .map_err(|e| Error::Exec {
            message: message.name.clone(),
            detail: e.to_string(),
        })?;
    bind_record(&mut stmt, seq, &record, message)?;
    stmt.raw_execute().map_err(|e| Error::Exec {
        message: message.name.clone(),
        detail: format!("failed to insert data: {}", e),
    })?;
    Ok(())
}
