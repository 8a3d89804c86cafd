//! Structured-text record codec
//!
//! Converts binary records to and from a self-describing payload. The shared
//! table of the structured-text channel stores whatever the codec produces.
//!
//! | Field type | JSON |
//! |------------|------|
//! | integers, double | number |
//! | byte-string (fixed or pointer) | string |
//! | raw fixed bytes | base64 string |
//! | nested message | object |
//!
//! Missing keys decode as zero. Pointers inside nested messages address the
//! trailing area of the outermost record.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use byteorder::{ByteOrder, LittleEndian};
use serde_json::{Map, Value as JsonValue};
use sqlbridge_core::{Error, Field, FieldType, Message, RecordBuffer, RecordView, Result, SubType};

/// Encoder/decoder between binary records and a text payload
pub trait RecordCodec {
    /// Encode one record of `message`
    fn encode(&self, message: &Message, data: &[u8]) -> Result<Vec<u8>>;

    /// Decode a payload back into a record of `message`
    fn decode(&self, message: &Message, payload: &[u8]) -> Result<Vec<u8>>;

    /// Codec name, for logs
    fn name(&self) -> &str;
}

/// JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

/// Field relocated into the outermost record
fn at(field: &Field, base: usize) -> Field {
    let mut field = field.clone();
    field.offset += base;
    field
}

fn unsupported(message: &Message, field: &Field) -> Error {
    Error::codec(
        &message.name,
        format!(
            "field {}: type {} not supported",
            field.name,
            field.field_type.name()
        ),
    )
}

impl JsonCodec {
    fn encode_object(
        message: &Message,
        view: &RecordView<'_>,
        base: usize,
    ) -> Result<Map<String, JsonValue>> {
        let layout = |e: Error| Error::codec(&message.name, e.to_string());
        let mut object = Map::new();
        for field in &message.fields {
            let abs = at(field, base);
            let value = match &field.field_type {
                FieldType::UInt64 => {
                    let bytes = view.bytes_at(abs.offset, 8).map_err(layout)?;
                    JsonValue::from(LittleEndian::read_u64(bytes))
                }
                t if t.is_small_integer() => {
                    JsonValue::from(view.read_integer(&abs).map_err(layout)?)
                }
                FieldType::Double => JsonValue::from(view.read_double(&abs).map_err(layout)?),
                FieldType::Bytes => {
                    let bytes = view.bytes_at(abs.offset, field.size).map_err(layout)?;
                    match field.sub_type {
                        SubType::ByteString => {
                            let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                            JsonValue::from(String::from_utf8_lossy(&bytes[..len]).into_owned())
                        }
                        SubType::None => JsonValue::from(BASE64.encode(bytes)),
                    }
                }
                FieldType::Pointer(_) if field.is_string_pointer() => {
                    let ptr = view.read_pointer(abs.offset).map_err(layout)?;
                    let text = if ptr.size == 0 {
                        &[][..]
                    } else {
                        view.read_at(ptr.offset as usize, ptr.size as usize - 1)
                            .map_err(layout)?
                    };
                    JsonValue::from(String::from_utf8_lossy(text).into_owned())
                }
                FieldType::Message(nested) => {
                    JsonValue::Object(Self::encode_object(nested, view, abs.offset)?)
                }
                _ => return Err(unsupported(message, field)),
            };
            object.insert(field.name.clone(), value);
        }
        Ok(object)
    }

    fn decode_object(
        message: &Message,
        object: &Map<String, JsonValue>,
        buf: &mut RecordBuffer,
        base: usize,
    ) -> Result<()> {
        let layout = |e: Error| Error::codec(&message.name, e.to_string());
        let mismatch = |field: &Field, expected: &str, value: &JsonValue| {
            Error::codec(
                &message.name,
                format!("field {}: expected {}, got {}", field.name, expected, value),
            )
        };

        for field in &message.fields {
            let value = match object.get(&field.name) {
                None | Some(JsonValue::Null) => continue,
                Some(v) => v,
            };
            let abs = at(field, base);
            match &field.field_type {
                FieldType::UInt64 => {
                    let v = value
                        .as_u64()
                        .ok_or_else(|| mismatch(field, "unsigned integer", value))?;
                    buf.write_integer(&abs, v as i64).map_err(layout)?;
                }
                t if t.is_small_integer() => {
                    let v = value
                        .as_i64()
                        .ok_or_else(|| mismatch(field, "integer", value))?;
                    buf.write_integer(&abs, v).map_err(layout)?;
                }
                FieldType::Double => {
                    let v = value
                        .as_f64()
                        .ok_or_else(|| mismatch(field, "number", value))?;
                    buf.write_double(&abs, v).map_err(layout)?;
                }
                FieldType::Bytes => {
                    let text = value
                        .as_str()
                        .ok_or_else(|| mismatch(field, "string", value))?;
                    let written = match field.sub_type {
                        SubType::ByteString => buf.write_bytes(&abs, text.as_bytes()),
                        SubType::None => {
                            let bytes = BASE64.decode(text).map_err(|e| {
                                Error::codec(
                                    &message.name,
                                    format!("field {}: invalid base64: {}", field.name, e),
                                )
                            })?;
                            buf.write_bytes(&abs, &bytes)
                        }
                    };
                    written.map_err(layout)?;
                }
                FieldType::Pointer(_) if field.is_string_pointer() => {
                    let text = value
                        .as_str()
                        .ok_or_else(|| mismatch(field, "string", value))?;
                    buf.set_string(&abs, text.as_bytes()).map_err(layout)?;
                }
                FieldType::Message(nested) => {
                    let inner = value
                        .as_object()
                        .ok_or_else(|| mismatch(field, "object", value))?;
                    Self::decode_object(nested, inner, buf, abs.offset)?;
                }
                _ => return Err(unsupported(message, field)),
            }
        }
        Ok(())
    }
}

impl RecordCodec for JsonCodec {
    fn encode(&self, message: &Message, data: &[u8]) -> Result<Vec<u8>> {
        let view = RecordView::new(data, message.size)
            .map_err(|e| Error::codec(&message.name, e.to_string()))?;
        let object = Self::encode_object(message, &view, 0)?;
        serde_json::to_vec(&JsonValue::Object(object))
            .map_err(|e| Error::codec(&message.name, e.to_string()))
    }

    fn decode(&self, message: &Message, payload: &[u8]) -> Result<Vec<u8>> {
        let value: JsonValue = serde_json::from_slice(payload)
            .map_err(|e| Error::codec(&message.name, format!("invalid JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::codec(&message.name, "payload is not an object"))?;
        let mut buf = RecordBuffer::new(message.size);
        Self::decode_object(message, object, &mut buf, 0)?;
        Ok(buf.into_bytes())
    }

    fn name(&self) -> &str {
        "json"
    }
}
