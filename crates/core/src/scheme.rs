//! Message schema model
//!
//! A schema is an ordered set of messages; every message is an ordered list
//! of fields laid out back to back (packed, little endian) in a fixed-size
//! region. Variable-length byte strings live in a trailing area after the
//! fixed region and are addressed by an 8-byte offset pointer stored inline.
//!
//! Messages are built with [`MessageBuilder`], which computes field offsets
//! and the fixed size. Messages are immutable once built and shared through
//! `Arc` so nested message fields can refer to them.

use crate::error::{Error, Result};
use crate::layout::POINTER_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Index policy for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexPolicy {
    /// No index
    #[default]
    #[serde(alias = "none")]
    No,
    /// Non-unique index
    #[serde(alias = "non-unique")]
    Yes,
    /// Unique index
    Unique,
}

impl IndexPolicy {
    /// True unless the policy is `No`
    pub fn is_indexed(&self) -> bool {
        !matches!(self, IndexPolicy::No)
    }
}

impl FromStr for IndexPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "no" | "none" => Ok(IndexPolicy::No),
            "yes" | "non-unique" => Ok(IndexPolicy::Yes),
            "unique" => Ok(IndexPolicy::Unique),
            other => Err(format!(
                "invalid index policy '{}', expected no, yes or unique",
                other
            )),
        }
    }
}

impl fmt::Display for IndexPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexPolicy::No => write!(f, "no"),
            IndexPolicy::Yes => write!(f, "yes"),
            IndexPolicy::Unique => write!(f, "unique"),
        }
    }
}

/// Secondary interpretation of a field's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubType {
    /// Plain value
    #[default]
    None,
    /// NUL-terminated byte string
    ByteString,
}

/// Field type tag
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Unsigned 32-bit integer
    UInt32,
    /// Unsigned 64-bit integer
    UInt64,
    /// IEEE 754 double
    Double,
    /// 128-bit decimal
    Decimal128,
    /// Fixed-size byte blob, size taken from the field
    Bytes,
    /// Nested message
    Message(Arc<Message>),
    /// Fixed-capacity array
    Array,
    /// Offset pointer to a list of elements described by the pointee
    Pointer(Box<Field>),
    /// Tagged union
    Union,
}

impl FieldType {
    /// Natural size of a fixed-width type, `None` for sized-by-field types
    pub fn natural_size(&self) -> Option<usize> {
        match self {
            FieldType::Int8 | FieldType::UInt8 => Some(1),
            FieldType::Int16 | FieldType::UInt16 => Some(2),
            FieldType::Int32 | FieldType::UInt32 => Some(4),
            FieldType::Int64 | FieldType::UInt64 | FieldType::Double => Some(8),
            FieldType::Decimal128 => Some(16),
            FieldType::Pointer(_) => Some(POINTER_SIZE),
            FieldType::Message(m) => Some(m.size),
            FieldType::Bytes | FieldType::Array | FieldType::Union => None,
        }
    }

    /// Short type name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int8 => "int8",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt8 => "uint8",
            FieldType::UInt16 => "uint16",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::Double => "double",
            FieldType::Decimal128 => "decimal128",
            FieldType::Bytes => "bytes",
            FieldType::Message(_) => "message",
            FieldType::Array => "array",
            FieldType::Pointer(_) => "pointer",
            FieldType::Union => "union",
        }
    }

    /// True for integer types that fit into a signed 64-bit value
    pub fn is_small_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Int8
                | FieldType::Int16
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::UInt8
                | FieldType::UInt16
                | FieldType::UInt32
        )
    }
}

/// Per-field `sql.*` options
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldOptions {
    /// `sql.primary-key`
    pub primary_key: bool,
    /// `sql.index`
    pub index: IndexPolicy,
    /// `sql.table` (or its alias `sql.column`): column name override
    pub column: Option<String>,
}

impl FieldOptions {
    /// Apply one textual option
    ///
    /// Unknown keys are ignored so that options owned by other consumers of
    /// the schema can share the namespace.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "sql.primary-key" => {
                self.primary_key = parse_bool(value).ok_or_else(|| {
                    Error::config(key, format!("invalid boolean '{}'", value))
                })?;
            }
            "sql.index" => {
                self.index = value.parse().map_err(|e: String| Error::config(key, e))?;
            }
            "sql.table" | "sql.column" => self.column = Some(value.to_string()),
            _ => {}
        }
        Ok(())
    }
}

/// Per-message options
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageOptions {
    /// `sql.table`: table name override
    pub table: Option<String>,
    /// `sql.index`: sequence column index policy override
    pub index: Option<IndexPolicy>,
    /// `key`: payload path of a unique index in structured-text mode
    pub key: Option<String>,
}

impl MessageOptions {
    /// Apply one textual option, ignoring unknown keys
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "sql.table" => self.table = Some(value.to_string()),
            "sql.index" => {
                self.index = Some(value.parse().map_err(|e: String| Error::config(key, e))?);
            }
            "key" => self.key = Some(value.to_string()),
            _ => {}
        }
        Ok(())
    }
}

/// Parse the boolean spellings accepted in options and configuration
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// One field of a message
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Type tag
    pub field_type: FieldType,
    /// Secondary interpretation
    pub sub_type: SubType,
    /// Byte offset inside the fixed region (set by [`MessageBuilder`])
    pub offset: usize,
    /// Size in the fixed region
    pub size: usize,
    /// `sql.*` options
    pub options: FieldOptions,
}

impl Field {
    /// Field of a fixed-width type
    ///
    /// Types sized by the field (`Bytes`, `Array`, `Union`) get size zero;
    /// use the dedicated constructors for those.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let size = field_type.natural_size().unwrap_or(0);
        Field {
            name: name.into(),
            field_type,
            sub_type: SubType::None,
            offset: 0,
            size,
            options: FieldOptions::default(),
        }
    }

    /// Fixed-size raw blob
    pub fn bytes(name: impl Into<String>, size: usize) -> Self {
        Field {
            size,
            ..Field::new(name, FieldType::Bytes)
        }
    }

    /// Fixed-size NUL-padded string
    pub fn byte_string(name: impl Into<String>, size: usize) -> Self {
        Field {
            sub_type: SubType::ByteString,
            ..Field::bytes(name, size)
        }
    }

    /// Variable-length string: pointer to int8 with byte-string sub-type
    pub fn string(name: impl Into<String>) -> Self {
        Field {
            sub_type: SubType::ByteString,
            ..Field::pointer(name, Field::new("", FieldType::Int8))
        }
    }

    /// Generic offset pointer to a list of `element`
    pub fn pointer(name: impl Into<String>, element: Field) -> Self {
        Field::new(name, FieldType::Pointer(Box::new(element)))
    }

    /// Nested message field
    pub fn message(name: impl Into<String>, message: Arc<Message>) -> Self {
        Field::new(name, FieldType::Message(message))
    }

    /// Fixed-capacity array occupying `size` bytes
    pub fn array(name: impl Into<String>, size: usize) -> Self {
        Field {
            size,
            ..Field::new(name, FieldType::Array)
        }
    }

    /// Union occupying `size` bytes
    pub fn union(name: impl Into<String>, size: usize) -> Self {
        Field {
            size,
            ..Field::new(name, FieldType::Union)
        }
    }

    /// Mark as primary key
    pub fn primary_key(mut self, value: bool) -> Self {
        self.options.primary_key = value;
        self
    }

    /// Set the index policy
    pub fn index(mut self, policy: IndexPolicy) -> Self {
        self.options.index = policy;
        self
    }

    /// Override the column name
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.options.column = Some(name.into());
        self
    }

    /// Apply a textual option (`sql.primary-key`, `sql.index`, `sql.column`)
    pub fn option(mut self, key: &str, value: &str) -> Result<Self> {
        self.options.apply(key, value)?;
        Ok(self)
    }

    /// Column name in the table
    pub fn column_name(&self) -> &str {
        self.options.column.as_deref().unwrap_or(&self.name)
    }

    /// Pointer to a byte string (the only pointer the bridge maps)
    pub fn is_string_pointer(&self) -> bool {
        match &self.field_type {
            FieldType::Pointer(element) => {
                element.field_type == FieldType::Int8 && self.sub_type == SubType::ByteString
            }
            _ => false,
        }
    }

    /// Primary key flag, also honoured when carried by a pointer's element
    pub fn is_primary_key(&self) -> bool {
        match &self.field_type {
            FieldType::Pointer(element) => {
                self.options.primary_key || element.options.primary_key
            }
            _ => self.options.primary_key,
        }
    }
}

/// Message definition
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message name
    pub name: String,
    /// Numeric identifier, 0 means "not addressable"
    pub msgid: i32,
    /// Fixed region size
    pub size: usize,
    /// Fields in declaration order
    pub fields: Vec<Field>,
    /// Message options
    pub options: MessageOptions,
}

impl Message {
    /// Start building a message
    pub fn builder(name: impl Into<String>, msgid: i32) -> MessageBuilder {
        MessageBuilder {
            name: name.into(),
            msgid,
            fields: Vec::new(),
            offset: 0,
            options: MessageOptions::default(),
        }
    }

    /// Table name: `sql.table` option or the message name
    pub fn table_name(&self) -> &str {
        self.options.table.as_deref().unwrap_or(&self.name)
    }

    /// Field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a dotted path (`header.s0`) through nested message fields
    pub fn resolve_path(&self, path: &str) -> Result<&Field> {
        let mut message = self;
        let mut found: Option<&Field> = None;
        for segment in path.split('.') {
            if let Some(field) = found {
                match &field.field_type {
                    FieldType::Message(nested) => message = nested.as_ref(),
                    _ => {
                        return Err(Error::config(
                            path,
                            format!(
                                "message '{}' field '{}' is not submessage",
                                message.name, field.name
                            ),
                        ))
                    }
                }
            }
            found = Some(message.field(segment).ok_or_else(|| {
                Error::config(
                    path,
                    format!("message '{}' has no field '{}'", message.name, segment),
                )
            })?);
        }
        found.ok_or_else(|| Error::config(path, "empty path"))
    }
}

/// Builder computing the packed layout of a message
#[derive(Debug)]
pub struct MessageBuilder {
    name: String,
    msgid: i32,
    fields: Vec<Field>,
    offset: usize,
    options: MessageOptions,
}

impl MessageBuilder {
    /// Append a field at the current end of the fixed region
    pub fn field(mut self, mut field: Field) -> Self {
        field.offset = self.offset;
        self.offset += field.size;
        self.fields.push(field);
        self
    }

    /// Override the table name
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.options.table = Some(name.into());
        self
    }

    /// Override the sequence column index policy
    pub fn seq_index(mut self, policy: IndexPolicy) -> Self {
        self.options.index = Some(policy);
        self
    }

    /// Declare the structured-text unique key path
    pub fn key(mut self, path: impl Into<String>) -> Self {
        self.options.key = Some(path.into());
        self
    }

    /// Apply a textual message option (`sql.table`, `sql.index`, `key`)
    pub fn option(mut self, key: &str, value: &str) -> Result<Self> {
        self.options.apply(key, value)?;
        Ok(self)
    }

    /// Finish the message
    pub fn build(self) -> Message {
        Message {
            name: self.name,
            msgid: self.msgid,
            size: self.offset,
            fields: self.fields,
            options: self.options,
        }
    }
}

/// Immutable ordered set of messages
#[derive(Debug, Clone, Default)]
pub struct MessageSchema {
    messages: Vec<Arc<Message>>,
    by_id: HashMap<i32, usize>,
    by_name: HashMap<String, usize>,
}

impl MessageSchema {
    /// Build a schema, rejecting duplicate names and non-zero identifiers
    pub fn new<I>(messages: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Arc<Message>>,
    {
        let mut schema = MessageSchema::default();
        for message in messages {
            let message: Arc<Message> = message.into();
            let idx = schema.messages.len();
            if schema.by_name.contains_key(&message.name) {
                return Err(Error::schema(
                    message.name.clone(),
                    "",
                    "duplicate message name",
                ));
            }
            if message.msgid != 0 {
                if let Some(&prev) = schema.by_id.get(&message.msgid) {
                    return Err(Error::DuplicateMessageId {
                        msgid: message.msgid,
                        first: schema.messages[prev].name.clone(),
                        second: message.name.clone(),
                    });
                }
                schema.by_id.insert(message.msgid, idx);
            }
            schema.by_name.insert(message.name.clone(), idx);
            schema.messages.push(message);
        }
        Ok(schema)
    }

    /// Messages in declaration order
    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    /// Lookup by identifier (0 never matches)
    pub fn by_id(&self, msgid: i32) -> Option<&Arc<Message>> {
        self.by_id.get(&msgid).map(|&i| &self.messages[i])
    }

    /// Lookup by name
    pub fn by_name(&self, name: &str) -> Option<&Arc<Message>> {
        self.by_name.get(name).map(|&i| &self.messages[i])
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if the schema has no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Arc<Message> {
        Arc::new(
            Message::builder("header", 0)
                .field(Field::new("s0", FieldType::Int8))
                .field(Field::string("s1"))
                .build(),
        )
    }

    #[test]
    fn test_builder_packs_offsets() {
        let msg = Message::builder("scalar", 10)
            .field(Field::new("i8", FieldType::Int8))
            .field(Field::new("i16", FieldType::Int16))
            .field(Field::new("d", FieldType::Double))
            .field(Field::byte_string("f", 32))
            .field(Field::string("s"))
            .build();

        let offsets: Vec<_> = msg.fields.iter().map(|f| (f.offset, f.size)).collect();
        assert_eq!(offsets, vec![(0, 1), (1, 2), (3, 8), (11, 32), (43, 8)]);
        assert_eq!(msg.size, 51);
    }

    #[test]
    fn test_nested_message_size() {
        let msg = Message::builder("msg", 10)
            .field(Field::message("header", header()))
            .field(Field::new("f0", FieldType::Int8))
            .build();
        assert_eq!(msg.fields[0].size, 9);
        assert_eq!(msg.fields[1].offset, 9);
    }

    #[test]
    fn test_string_pointer_detection() {
        assert!(Field::string("s").is_string_pointer());
        let ptr = Field::pointer("p", Field::new("", FieldType::Int32));
        assert!(!ptr.is_string_pointer());
        assert!(!Field::byte_string("f", 8).is_string_pointer());
    }

    #[test]
    fn test_primary_key_on_pointee() {
        let element = Field::new("", FieldType::Int8).primary_key(true);
        let mut field = Field::pointer("s", element);
        field.sub_type = SubType::ByteString;
        assert!(field.is_primary_key());
    }

    #[test]
    fn test_field_options_parse() {
        let field = Field::new("i8", FieldType::Int8)
            .option("sql.index", "unique")
            .unwrap()
            .option("sql.primary-key", "yes")
            .unwrap()
            .option("sql.column", "small")
            .unwrap()
            .option("json.ignored", "whatever")
            .unwrap();
        assert_eq!(field.options.index, IndexPolicy::Unique);
        assert!(field.options.primary_key);
        assert_eq!(field.column_name(), "small");
    }

    #[test]
    fn test_field_sql_table_renames_column() {
        let field = Field::new("f", FieldType::Int32)
            .option("sql.table", "renamed")
            .unwrap();
        assert_eq!(field.column_name(), "renamed");
        assert_eq!(field.name, "f");
    }

    #[test]
    fn test_field_options_invalid() {
        let err = Field::new("i8", FieldType::Int8)
            .option("sql.index", "sometimes")
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = Field::new("i8", FieldType::Int8)
            .option("sql.primary-key", "maybe")
            .unwrap_err();
        assert!(err.to_string().contains("sql.primary-key"));
    }

    #[test]
    fn test_index_policy_spellings() {
        assert_eq!("none".parse::<IndexPolicy>(), Ok(IndexPolicy::No));
        assert_eq!("non-unique".parse::<IndexPolicy>(), Ok(IndexPolicy::Yes));
        assert_eq!("yes".parse::<IndexPolicy>(), Ok(IndexPolicy::Yes));
        assert_eq!("unique".parse::<IndexPolicy>(), Ok(IndexPolicy::Unique));
        assert!("other".parse::<IndexPolicy>().is_err());
    }

    #[test]
    fn test_table_name_override() {
        let msg = Message::builder("msg", 10)
            .option("sql.table", "table")
            .unwrap()
            .build();
        assert_eq!(msg.table_name(), "table");
        assert_eq!(Message::builder("plain", 1).build().table_name(), "plain");
    }

    #[test]
    fn test_resolve_path() {
        let msg = Message::builder("msg", 10)
            .field(Field::message("header", header()))
            .field(Field::new("f0", FieldType::Int8))
            .build();

        assert_eq!(msg.resolve_path("f0").unwrap().name, "f0");
        assert_eq!(msg.resolve_path("header.s1").unwrap().name, "s1");

        let err = msg.resolve_path("f0.x").unwrap_err();
        assert!(err.to_string().contains("not submessage"));
        let err = msg.resolve_path("header.missing").unwrap_err();
        assert!(err.to_string().contains("has no field 'missing'"));
    }

    #[test]
    fn test_schema_lookup() {
        let schema = MessageSchema::new(vec![
            Message::builder("ignored", 0).build(),
            Message::builder("a", 10).build(),
            Message::builder("b", 20).build(),
        ])
        .unwrap();

        assert_eq!(schema.len(), 3);
        assert_eq!(schema.by_id(10).unwrap().name, "a");
        assert_eq!(schema.by_name("b").unwrap().msgid, 20);
        assert!(schema.by_id(0).is_none());
        assert!(schema.by_name("c").is_none());
    }

    #[test]
    fn test_schema_duplicate_id() {
        let err = MessageSchema::new(vec![
            Message::builder("a", 10).build(),
            Message::builder("b", 10).build(),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateMessageId { msgid: 10, .. }));
    }

    #[test]
    fn test_schema_zero_ids_do_not_collide() {
        let schema = MessageSchema::new(vec![
            Message::builder("a", 0).build(),
            Message::builder("b", 0).build(),
        ]);
        assert!(schema.is_ok());
    }

    #[test]
    fn test_index_policy_serde() {
        let policy: IndexPolicy = serde_json::from_str("\"non-unique\"").unwrap();
        assert_eq!(policy, IndexPolicy::Yes);
        let policy: IndexPolicy = serde_json::from_str("\"unique\"").unwrap();
        assert_eq!(policy, IndexPolicy::Unique);
    }
}
