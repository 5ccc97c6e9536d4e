//! Record codec.
//!
//! A record is a length-prefixed run of tagged fields:
//!
//! ```text
//! | total_length: u16 | tag: u16 | payload | tag: u16 | payload | ...
//! ```
//!
//! The tag doubles as the payload size for fixed-width types (0 = null,
//! 2 = i16, 4 = i32, 8 = f64). Any tag of 9 or more is a string whose length
//! is `tag - 9`. Fields carry no names, so the reader must know the expected
//! type sequence and consume fields in the order they were packed.

use crate::storage::error::{StorageError, StorageResult};
use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Size of the length prefix; also the cursor position of the first field.
pub const RECORD_HEADER_SIZE: usize = 2;

const TAG_SIZE: usize = 2;

pub const TYPE_NULL: u16 = 0;
pub const TYPE_SHORT: u16 = 2;
pub const TYPE_INT: u16 = 4;
pub const TYPE_DOUBLE: u16 = 8;
pub const TYPE_STRING: u16 = 9;

/// Longest string that still fits in a 16-bit tag.
pub const MAX_STRING_LEN: usize = u16::MAX as usize - TYPE_STRING as usize;

/// Field types understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Null,
    Short,
    Int,
    Double,
    String,
}

impl FieldType {
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            TYPE_NULL => Some(FieldType::Null),
            TYPE_SHORT => Some(FieldType::Short),
            TYPE_INT => Some(FieldType::Int),
            TYPE_DOUBLE => Some(FieldType::Double),
            t if t >= TYPE_STRING => Some(FieldType::String),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Null => "null",
            FieldType::Short => "int16",
            FieldType::Int => "int32",
            FieldType::Double => "double64",
            FieldType::String => "string",
        };
        f.write_str(name)
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Short(i16),
    Int(i32),
    Double(f64),
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Short(v) => write!(f, "int16 ({})", v),
            Value::Int(v) => write!(f, "int32 ({})", v),
            Value::Double(v) => write!(f, "double64 ({})", v),
            Value::String(s) => write!(f, "String{} ({})", s.len(), s),
        }
    }
}

/// Builds a record field by field.
///
/// ```
/// use eagledb::storage::record::{RecordBuilder, RecordCursor};
///
/// let mut builder = RecordBuilder::begin();
/// builder.pack_int(150).pack_string("abc")?.pack_int(38501);
/// let record = builder.finish()?;
///
/// let mut cursor = RecordCursor::new(&record)?;
/// assert_eq!(cursor.unpack_int()?, 150);
/// assert_eq!(cursor.unpack_string()?, "abc");
/// assert_eq!(cursor.unpack_int()?, 38501);
/// # Ok::<(), eagledb::storage::error::StorageError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    buf: BytesMut,
}

impl RecordBuilder {
    /// Start a record with room reserved for the length prefix.
    pub fn begin() -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u16_le(0);
        Self { buf }
    }

    pub fn pack_null(&mut self) -> &mut Self {
        self.buf.put_u16_le(TYPE_NULL);
        self
    }

    pub fn pack_short(&mut self, value: i16) -> &mut Self {
        self.buf.put_u16_le(TYPE_SHORT);
        self.buf.put_i16_le(value);
        self
    }

    pub fn pack_int(&mut self, value: i32) -> &mut Self {
        self.buf.put_u16_le(TYPE_INT);
        self.buf.put_i32_le(value);
        self
    }

    pub fn pack_double(&mut self, value: f64) -> &mut Self {
        self.buf.put_u16_le(TYPE_DOUBLE);
        self.buf.put_f64_le(value);
        self
    }

    pub fn pack_string(&mut self, value: &str) -> StorageResult<&mut Self> {
        if value.len() > MAX_STRING_LEN {
            return Err(StorageError::FieldTooLarge { len: value.len() });
        }
        self.buf.put_u16_le(TYPE_STRING + value.len() as u16);
        self.buf.put_slice(value.as_bytes());
        Ok(self)
    }

    pub fn pack_value(&mut self, value: &Value) -> StorageResult<&mut Self> {
        match value {
            Value::Null => Ok(self.pack_null()),
            Value::Short(v) => Ok(self.pack_short(*v)),
            Value::Int(v) => Ok(self.pack_int(*v)),
            Value::Double(v) => Ok(self.pack_double(*v)),
            Value::String(s) => self.pack_string(s),
        }
    }

    /// Write the total length into the prefix and hand out the record bytes.
    pub fn finish(mut self) -> StorageResult<Bytes> {
        let len = self.buf.len();
        if len > u16::MAX as usize {
            return Err(StorageError::RecordTooLarge { len });
        }
        LittleEndian::write_u16(&mut self.buf[..RECORD_HEADER_SIZE], len as u16);
        Ok(self.buf.freeze())
    }
}

/// Encode a full row of values as one record.
pub fn encode_values(values: &[Value]) -> StorageResult<Bytes> {
    let mut builder = RecordBuilder::begin();
    for value in values {
        builder.pack_value(value)?;
    }
    builder.finish()
}

/// Read the embedded length of the record starting at `bytes[0]`.
pub fn record_len(bytes: &[u8]) -> StorageResult<u16> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return Err(StorageError::MalformedRecord(format!(
            "{} bytes is too short for a length prefix",
            bytes.len()
        )));
    }
    Ok(LittleEndian::read_u16(bytes))
}

fn truncated(offset: usize) -> StorageError {
    StorageError::MalformedRecord(format!("field at offset {} runs past the record", offset))
}

fn read_tag(buf: &[u8], at: usize) -> StorageResult<u16> {
    let bytes = buf.get(at..at + TAG_SIZE).ok_or_else(|| truncated(at))?;
    Ok(LittleEndian::read_u16(bytes))
}

/// Payload width of a field with the given (valid) tag.
fn payload_len(tag: u16) -> usize {
    if tag >= TYPE_STRING {
        (tag - TYPE_STRING) as usize
    } else {
        tag as usize
    }
}

/// Check the tag at `cursor`, advance past the field and return its payload.
fn take_field<'a>(buf: &'a [u8], cursor: &mut u16, expected: FieldType) -> StorageResult<&'a [u8]> {
    let at = *cursor as usize;
    let tag = read_tag(buf, at)?;
    if FieldType::from_tag(tag) != Some(expected) {
        return Err(StorageError::TypeMismatch {
            expected,
            found: tag,
        });
    }

    let start = at + TAG_SIZE;
    let end = start + payload_len(tag);
    let payload = buf.get(start..end).ok_or_else(|| truncated(at))?;
    *cursor = u16::try_from(end).map_err(|_| truncated(at))?;
    Ok(payload)
}

pub fn unpack_null(buf: &[u8], cursor: &mut u16) -> StorageResult<()> {
    take_field(buf, cursor, FieldType::Null).map(|_| ())
}

pub fn unpack_short(buf: &[u8], cursor: &mut u16) -> StorageResult<i16> {
    take_field(buf, cursor, FieldType::Short).map(LittleEndian::read_i16)
}

pub fn unpack_int(buf: &[u8], cursor: &mut u16) -> StorageResult<i32> {
    take_field(buf, cursor, FieldType::Int).map(LittleEndian::read_i32)
}

pub fn unpack_double(buf: &[u8], cursor: &mut u16) -> StorageResult<f64> {
    take_field(buf, cursor, FieldType::Double).map(LittleEndian::read_f64)
}

pub fn unpack_string(buf: &[u8], cursor: &mut u16) -> StorageResult<String> {
    // Only move the caller's cursor once the payload has been accepted
    let mut next = *cursor;
    let payload = take_field(buf, &mut next, FieldType::String)?;
    let value = String::from_utf8(payload.to_vec()).map_err(|e| {
        StorageError::MalformedRecord(format!("string at offset {} is not UTF-8: {}", cursor, e))
    })?;
    *cursor = next;
    Ok(value)
}

/// Sequential reader over one record's fields.
#[derive(Debug, Clone)]
pub struct RecordCursor<'a> {
    record: &'a [u8],
    next: u16,
}

impl<'a> RecordCursor<'a> {
    /// Wrap a record, trimming the slice to its embedded length.
    pub fn new(bytes: &'a [u8]) -> StorageResult<Self> {
        let len = record_len(bytes)? as usize;
        if len < RECORD_HEADER_SIZE || len > bytes.len() {
            return Err(StorageError::MalformedRecord(format!(
                "embedded length {} does not match {} available bytes",
                len,
                bytes.len()
            )));
        }
        Ok(Self {
            record: &bytes[..len],
            next: RECORD_HEADER_SIZE as u16,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.next as usize >= self.record.len()
    }

    /// Type of the next field, or `None` at the end of the record.
    pub fn peek_type(&self) -> StorageResult<Option<FieldType>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        let at = self.next as usize;
        let tag = read_tag(self.record, at)?;
        FieldType::from_tag(tag)
            .map(Some)
            .ok_or(StorageError::UnknownFieldTag { tag, offset: at })
    }

    pub fn unpack_null(&mut self) -> StorageResult<()> {
        unpack_null(self.record, &mut self.next)
    }

    pub fn unpack_short(&mut self) -> StorageResult<i16> {
        unpack_short(self.record, &mut self.next)
    }

    pub fn unpack_int(&mut self) -> StorageResult<i32> {
        unpack_int(self.record, &mut self.next)
    }

    pub fn unpack_double(&mut self) -> StorageResult<f64> {
        unpack_double(self.record, &mut self.next)
    }

    pub fn unpack_string(&mut self) -> StorageResult<String> {
        unpack_string(self.record, &mut self.next)
    }

    /// Decode the next field by its own tag.
    pub fn next_value(&mut self) -> StorageResult<Option<Value>> {
        let value = match self.peek_type()? {
            None => return Ok(None),
            Some(FieldType::Null) => self.unpack_null().map(|_| Value::Null)?,
            Some(FieldType::Short) => Value::Short(self.unpack_short()?),
            Some(FieldType::Int) => Value::Int(self.unpack_int()?),
            Some(FieldType::Double) => Value::Double(self.unpack_double()?),
            Some(FieldType::String) => Value::String(self.unpack_string()?),
        };
        Ok(Some(value))
    }
}

/// Decode every field of a record using the tags alone.
pub fn decode_values(record: &[u8]) -> StorageResult<Vec<Value>> {
    let mut cursor = RecordCursor::new(record)?;
    let mut values = Vec::new();
    while let Some(value) = cursor.next_value()? {
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_record_layout() -> Result<()> {
        let mut builder = RecordBuilder::begin();
        builder.pack_int(150).pack_string("abc")?.pack_int(38501);
        let record = builder.finish()?;

        // prefix + (tag + i32) + (tag + 3 bytes) + (tag + i32)
        assert_eq!(record.len(), 2 + 6 + 5 + 6);
        assert_eq!(record_len(&record)?, 19);
        assert_eq!(&record[2..4], &TYPE_INT.to_le_bytes());
        assert_eq!(&record[4..8], &150i32.to_le_bytes());
        assert_eq!(&record[8..10], &(TYPE_STRING + 3).to_le_bytes());
        assert_eq!(&record[10..13], b"abc");
        Ok(())
    }

    #[test]
    fn test_unpack_with_caller_cursor() -> Result<()> {
        let mut builder = RecordBuilder::begin();
        builder
            .pack_short(-7)
            .pack_double(2.5)
            .pack_null()
            .pack_string("hello")?;
        let record = builder.finish()?;

        let mut next = RECORD_HEADER_SIZE as u16;
        assert_eq!(unpack_short(&record, &mut next)?, -7);
        assert_eq!(next, 6);
        assert_eq!(unpack_double(&record, &mut next)?, 2.5);
        unpack_null(&record, &mut next)?;
        assert_eq!(unpack_string(&record, &mut next)?, "hello");
        assert_eq!(next as usize, record.len());
        Ok(())
    }

    #[test]
    fn test_type_mismatch() -> Result<()> {
        let mut builder = RecordBuilder::begin();
        builder.pack_int(42);
        let record = builder.finish()?;

        let mut next = RECORD_HEADER_SIZE as u16;
        let result = unpack_string(&record, &mut next);
        assert!(matches!(
            result,
            Err(StorageError::TypeMismatch {
                expected: FieldType::String,
                found: TYPE_INT
            })
        ));
        // Cursor is not advanced by a failed unpack
        assert_eq!(next, RECORD_HEADER_SIZE as u16);

        assert!(matches!(
            unpack_short(&record, &mut next),
            Err(StorageError::TypeMismatch { .. })
        ));
        assert_eq!(unpack_int(&record, &mut next)?, 42);
        Ok(())
    }

    #[test]
    fn test_invalid_utf8_keeps_cursor() -> Result<()> {
        // length 6, string of 2 bytes that are not UTF-8
        let record = [6u8, 0, 11, 0, 0xff, 0xfe];
        let mut next = RECORD_HEADER_SIZE as u16;
        assert!(matches!(
            unpack_string(&record, &mut next),
            Err(StorageError::MalformedRecord(_))
        ));
        assert_eq!(next, RECORD_HEADER_SIZE as u16);

        let mut cursor = RecordCursor::new(&record)?;
        assert!(cursor.unpack_string().is_err());
        assert_eq!(cursor.peek_type()?, Some(FieldType::String));
        Ok(())
    }

    #[test]
    fn test_empty_string_is_a_string() -> Result<()> {
        let mut builder = RecordBuilder::begin();
        builder.pack_string("")?;
        let record = builder.finish()?;

        let mut cursor = RecordCursor::new(&record)?;
        assert_eq!(cursor.peek_type()?, Some(FieldType::String));
        assert_eq!(cursor.unpack_string()?, "");
        assert!(cursor.is_exhausted());
        Ok(())
    }

    #[test]
    fn test_field_too_large() -> Result<()> {
        let mut builder = RecordBuilder::begin();
        let huge = "x".repeat(MAX_STRING_LEN + 1);
        assert!(matches!(
            builder.pack_string(&huge),
            Err(StorageError::FieldTooLarge { .. })
        ));
        // The rejected field left nothing behind
        assert_eq!(builder.finish()?.len(), RECORD_HEADER_SIZE);
        Ok(())
    }

    #[test]
    fn test_record_too_large() -> Result<()> {
        let mut builder = RecordBuilder::begin();
        let big = "y".repeat(40_000);
        builder.pack_string(&big)?;
        builder.pack_string(&big)?;
        assert!(matches!(
            builder.finish(),
            Err(StorageError::RecordTooLarge { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_decode_values() -> Result<()> {
        let values = vec![
            Value::Int(1),
            Value::Null,
            Value::String("test".to_string()),
            Value::Short(3),
            Value::Double(-0.125),
        ];
        let record = encode_values(&values)?;
        assert_eq!(decode_values(&record)?, values);
        Ok(())
    }

    #[test]
    fn test_unknown_tag() {
        // length 4, tag 5
        let record = [4u8, 0, 5, 0];
        let result = decode_values(&record);
        assert!(matches!(
            result,
            Err(StorageError::UnknownFieldTag { tag: 5, offset: 2 })
        ));
    }

    #[test]
    fn test_truncated_field() {
        // Claims an i32 but only carries two payload bytes
        let record = [6u8, 0, 4, 0, 1, 2];
        let mut next = RECORD_HEADER_SIZE as u16;
        assert!(matches!(
            unpack_int(&record, &mut next),
            Err(StorageError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_cursor_rejects_bad_length() {
        let record = [40u8, 0, 0, 0];
        assert!(RecordCursor::new(&record).is_err());
        assert!(RecordCursor::new(&[1u8]).is_err());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Int(5).to_string(), "int32 (5)");
        assert_eq!(Value::String("ab".into()).to_string(), "String2 (ab)");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
