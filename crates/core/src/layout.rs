//! Binary record layout
//!
//! A record is a fixed region followed by a trailing area:
//!
//! ```text
//! ┌──────────────────────────────┬────────────────────────────────┐
//! │ Fixed region (message.size)  │ Trailing area (variable)       │
//! │ scalars, blobs, pointers     │ byte-string payloads           │
//! └──────────────────────────────┴────────────────────────────────┘
//! ```
//!
//! # Offset Pointer Layout (8 bytes, little endian)
//!
//! ```text
//! ┌──────────────────┬────────────────────────┬──────────────┐
//! │ offset (4 bytes) │ size (low 24 bits)     │ entity (8)   │
//! └──────────────────┴────────────────────────┴──────────────┘
//! ```
//!
//! `offset` is relative to the start of the trailing area, `size` counts
//! elements of `entity` bytes. Byte strings include a terminating NUL in
//! `size`; `size == 0` is the empty string.
//!
//! All accessors are bounds-checked against the current buffer length.

use crate::error::{Error, Result};
use crate::scheme::{Field, FieldType};
use byteorder::{ByteOrder, LittleEndian};

/// Size of an inline offset pointer
pub const POINTER_SIZE: usize = 8;

/// Inline reference into the trailing area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetPointer {
    /// Offset from the end of the fixed region
    pub offset: u32,
    /// Element count (24 bits)
    pub size: u32,
    /// Element width in bytes
    pub entity: u8,
}

impl OffsetPointer {
    /// Largest element count representable in 24 bits
    pub const MAX_SIZE: u32 = 0x00FF_FFFF;

    /// Create a pointer
    pub fn new(offset: u32, size: u32, entity: u8) -> Self {
        OffsetPointer {
            offset,
            size,
            entity,
        }
    }

    /// Length of the referenced range in bytes
    pub fn byte_len(&self) -> usize {
        self.size as usize * self.entity as usize
    }

    /// Decode from the first 8 bytes of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < POINTER_SIZE {
            return Err(Error::Layout(format!(
                "offset pointer needs {} bytes, got {}",
                POINTER_SIZE,
                bytes.len()
            )));
        }
        let packed = LittleEndian::read_u32(&bytes[4..8]);
        Ok(OffsetPointer {
            offset: LittleEndian::read_u32(&bytes[0..4]),
            size: packed & Self::MAX_SIZE,
            entity: (packed >> 24) as u8,
        })
    }

    /// Encode into the first 8 bytes of `out`
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        if out.len() < POINTER_SIZE {
            return Err(Error::Layout(format!(
                "offset pointer needs {} bytes, got {}",
                POINTER_SIZE,
                out.len()
            )));
        }
        if self.size > Self::MAX_SIZE {
            return Err(Error::Layout(format!(
                "offset pointer size {} exceeds {}",
                self.size,
                Self::MAX_SIZE
            )));
        }
        LittleEndian::write_u32(&mut out[0..4], self.offset);
        LittleEndian::write_u32(&mut out[4..8], self.size | ((self.entity as u32) << 24));
        Ok(())
    }
}

fn range_check(len: usize, offset: usize, size: usize, what: &str) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(()),
        _ => Err(Error::Layout(format!(
            "{} range {}+{} out of bounds (length {})",
            what, offset, size, len
        ))),
    }
}

/// Borrowed read-only view of a record
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    data: &'a [u8],
    fixed_size: usize,
}

impl<'a> RecordView<'a> {
    /// View `data` as a record with a fixed region of `fixed_size` bytes
    pub fn new(data: &'a [u8], fixed_size: usize) -> Result<Self> {
        if data.len() < fixed_size {
            return Err(Error::Layout(format!(
                "record of {} bytes is shorter than fixed region of {}",
                data.len(),
                fixed_size
            )));
        }
        Ok(RecordView { data, fixed_size })
    }

    /// Whole record
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Fixed region size
    pub fn fixed_size(&self) -> usize {
        self.fixed_size
    }

    /// Trailing area
    pub fn trailing(&self) -> &'a [u8] {
        &self.data[self.fixed_size..]
    }

    /// Bytes at an absolute offset
    pub fn bytes_at(&self, offset: usize, size: usize) -> Result<&'a [u8]> {
        range_check(self.data.len(), offset, size, "field")?;
        Ok(&self.data[offset..offset + size])
    }

    /// Bytes at a trailing-area offset
    pub fn read_at(&self, offset: usize, size: usize) -> Result<&'a [u8]> {
        range_check(self.trailing().len(), offset, size, "trailing")?;
        let start = self.fixed_size + offset;
        Ok(&self.data[start..start + size])
    }

    /// Decode the offset pointer stored at `offset`
    pub fn read_pointer(&self, offset: usize) -> Result<OffsetPointer> {
        OffsetPointer::from_bytes(self.bytes_at(offset, POINTER_SIZE)?)
    }

    /// Bytes referenced by the pointer stored at `offset`
    pub fn pointee(&self, offset: usize) -> Result<&'a [u8]> {
        let ptr = self.read_pointer(offset)?;
        self.read_at(ptr.offset as usize, ptr.byte_len())
    }

    /// Integer field widened to `i64`, sign-extended for signed types
    pub fn read_integer(&self, field: &Field) -> Result<i64> {
        let off = field.offset;
        let value = match field.field_type {
            FieldType::Int8 => self.bytes_at(off, 1)?[0] as i8 as i64,
            FieldType::UInt8 => self.bytes_at(off, 1)?[0] as i64,
            FieldType::Int16 => LittleEndian::read_i16(self.bytes_at(off, 2)?) as i64,
            FieldType::UInt16 => LittleEndian::read_u16(self.bytes_at(off, 2)?) as i64,
            FieldType::Int32 => LittleEndian::read_i32(self.bytes_at(off, 4)?) as i64,
            FieldType::UInt32 => LittleEndian::read_u32(self.bytes_at(off, 4)?) as i64,
            FieldType::Int64 => LittleEndian::read_i64(self.bytes_at(off, 8)?),
            FieldType::UInt64 => {
                let v = LittleEndian::read_u64(self.bytes_at(off, 8)?);
                i64::try_from(v).map_err(|_| {
                    Error::Layout(format!("field {}: value {} exceeds i64", field.name, v))
                })?
            }
            ref other => {
                return Err(Error::Layout(format!(
                    "field {} of type {} is not an integer",
                    field.name,
                    other.name()
                )))
            }
        };
        Ok(value)
    }

    /// Double field
    pub fn read_double(&self, field: &Field) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.bytes_at(field.offset, 8)?))
    }
}

/// Growable owned record: fixed region plus trailing area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBuffer {
    data: Vec<u8>,
    fixed_size: usize,
}

impl RecordBuffer {
    /// Zeroed fixed region, empty trailing area
    pub fn new(fixed_size: usize) -> Self {
        RecordBuffer {
            data: vec![0; fixed_size],
            fixed_size,
        }
    }

    /// Take ownership of an encoded record
    pub fn from_bytes(data: Vec<u8>, fixed_size: usize) -> Result<Self> {
        RecordView::new(&data, fixed_size)?;
        Ok(RecordBuffer { data, fixed_size })
    }

    /// Read-only view
    pub fn view(&self) -> RecordView<'_> {
        RecordView {
            data: &self.data,
            fixed_size: self.fixed_size,
        }
    }

    /// Whole record
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume into the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Fixed region size
    pub fn fixed_size(&self) -> usize {
        self.fixed_size
    }

    /// Total length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the record has no bytes at all
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length of the trailing area
    pub fn trailing_len(&self) -> usize {
        self.data.len() - self.fixed_size
    }

    /// Bytes at a trailing-area offset
    pub fn read_at(&self, offset: usize, size: usize) -> Result<&[u8]> {
        range_check(self.trailing_len(), offset, size, "trailing")?;
        let start = self.fixed_size + offset;
        Ok(&self.data[start..start + size])
    }

    /// Mutable bytes of the fixed region
    pub fn fixed_mut(&mut self, offset: usize, size: usize) -> Result<&mut [u8]> {
        range_check(self.fixed_size, offset, size, "field")?;
        Ok(&mut self.data[offset..offset + size])
    }

    /// Append raw bytes at the end of the trailing area
    pub fn append_bytes(&mut self, data: &[u8]) -> Result<OffsetPointer> {
        let offset = u32::try_from(self.trailing_len())
            .map_err(|_| Error::Layout("trailing area exceeds 4 GiB".to_string()))?;
        let size = u32::try_from(data.len())
            .ok()
            .filter(|s| *s <= OffsetPointer::MAX_SIZE)
            .ok_or_else(|| {
                Error::Layout(format!("payload of {} bytes is too large", data.len()))
            })?;
        self.data.extend_from_slice(data);
        Ok(OffsetPointer::new(offset, size, 1))
    }

    /// Append a byte string and its terminating NUL
    ///
    /// The empty string appends nothing and yields `size == 0`.
    pub fn append_string(&mut self, text: &[u8]) -> Result<OffsetPointer> {
        if text.is_empty() {
            return self.append_bytes(&[]);
        }
        if text.len() >= OffsetPointer::MAX_SIZE as usize {
            return Err(Error::Layout(format!(
                "string of {} bytes is too large",
                text.len()
            )));
        }
        let ptr = self.append_bytes(text)?;
        self.data.push(0);
        Ok(OffsetPointer::new(ptr.offset, ptr.size + 1, 1))
    }

    /// Store a pointer at a fixed-region offset
    pub fn write_pointer(&mut self, offset: usize, ptr: OffsetPointer) -> Result<()> {
        ptr.write_to(self.fixed_mut(offset, POINTER_SIZE)?)
    }

    /// Append a string and point the field at it
    pub fn set_string(&mut self, field: &Field, text: &[u8]) -> Result<OffsetPointer> {
        let ptr = self.append_string(text)?;
        self.write_pointer(field.offset, ptr)?;
        Ok(ptr)
    }

    /// Store an integer narrowed to the field's declared width
    pub fn write_integer(&mut self, field: &Field, value: i64) -> Result<()> {
        let off = field.offset;
        match field.field_type {
            FieldType::Int8 | FieldType::UInt8 => self.fixed_mut(off, 1)?[0] = value as u8,
            FieldType::Int16 | FieldType::UInt16 => {
                LittleEndian::write_u16(self.fixed_mut(off, 2)?, value as u16)
            }
            FieldType::Int32 | FieldType::UInt32 => {
                LittleEndian::write_u32(self.fixed_mut(off, 4)?, value as u32)
            }
            FieldType::Int64 | FieldType::UInt64 => {
                LittleEndian::write_i64(self.fixed_mut(off, 8)?, value)
            }
            ref other => {
                return Err(Error::Layout(format!(
                    "field {} of type {} is not an integer",
                    field.name,
                    other.name()
                )))
            }
        }
        Ok(())
    }

    /// Store a double
    pub fn write_double(&mut self, field: &Field, value: f64) -> Result<()> {
        LittleEndian::write_f64(self.fixed_mut(field.offset, 8)?, value);
        Ok(())
    }

    /// Copy `min(data.len(), field.size)` bytes into a fixed-size field
    pub fn write_bytes(&mut self, field: &Field, data: &[u8]) -> Result<()> {
        let n = data.len().min(field.size);
        self.fixed_mut(field.offset, n)?.copy_from_slice(&data[..n]);
        Ok(())
    }
}
