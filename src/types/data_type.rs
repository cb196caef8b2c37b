use std::fmt;

use super::Value;

/// Column data types.
///
/// Every type encodes to exactly [`DataType::max_size`] bytes so rows and
/// index-log records are fixed-size page entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 1 byte (0 = false, 1 = true)
    Boolean,

    /// 32-bit signed integer, little-endian
    Integer,

    /// 64-bit signed integer, little-endian
    BigInt,

    /// 64-bit IEEE 754 float
    Double,

    /// Fixed-length string of n bytes, space-padded.
    /// Values may not end in a space so the padding strips back off exactly.
    Char(u16),

    /// String of up to n bytes.
    /// Stored as: length (2 bytes) + data, zero-padded to n
    VarChar(u16),

    /// Microseconds since Unix epoch, 8 bytes
    Timestamp,
}

impl DataType {
    /// Returns true if the value width never varies.
    pub fn is_fixed_size(&self) -> bool {
        !matches!(self, DataType::VarChar(_))
    }

    /// Returns the encoded size in bytes.
    pub fn max_size(&self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::Integer => 4,
            DataType::BigInt => 8,
            DataType::Double => 8,
            DataType::Char(n) => *n as usize,
            DataType::VarChar(n) => 2 + *n as usize,
            DataType::Timestamp => 8,
        }
    }

    /// Returns true if `value` can be stored in a column of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (DataType::Boolean, Value::Boolean(_))
            | (DataType::Integer, Value::Integer(_))
            | (DataType::BigInt, Value::BigInt(_))
            | (DataType::Double, Value::Double(_))
            | (DataType::Timestamp, Value::Timestamp(_)) => true,
            (DataType::Char(n), Value::String(s)) => {
                s.len() <= *n as usize && !s.ends_with(' ')
            }
            (DataType::VarChar(n), Value::String(s)) => s.len() <= *n as usize,
            _ => false,
        }
    }

    /// Appends the encoding of `value` to `out`, exactly `max_size` bytes.
    /// Returns None if the value does not fit this type.
    pub fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Option<()> {
        if !self.accepts(value) {
            return None;
        }
        match (self, value) {
            (DataType::Boolean, Value::Boolean(b)) => out.push(u8::from(*b)),
            (DataType::Integer, Value::Integer(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (DataType::BigInt, Value::BigInt(v)) | (DataType::Timestamp, Value::Timestamp(v)) => {
                out.extend_from_slice(&v.to_le_bytes())
            }
            (DataType::Double, Value::Double(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (DataType::Char(n), Value::String(s)) => {
                out.extend_from_slice(s.as_bytes());
                out.resize(out.len() + *n as usize - s.len(), b' ');
            }
            (DataType::VarChar(n), Value::String(s)) => {
                out.extend_from_slice(&(s.len() as u16).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
                out.resize(out.len() + *n as usize - s.len(), 0);
            }
            _ => return None,
        }
        Some(())
    }

    /// Appends `max_size` zero bytes, the encoding used for null slots.
    pub fn encode_null(&self, out: &mut Vec<u8>) {
        out.resize(out.len() + self.max_size(), 0);
    }

    /// Decodes a value from the first `max_size` bytes of `data`.
    pub fn decode(&self, data: &[u8]) -> Option<Value> {
        let data = data.get(..self.max_size())?;
        let value = match self {
            DataType::Boolean => Value::Boolean(data[0] != 0),
            DataType::Integer => Value::Integer(i32::from_le_bytes(data.try_into().ok()?)),
            DataType::BigInt => Value::BigInt(i64::from_le_bytes(data.try_into().ok()?)),
            DataType::Double => Value::Double(f64::from_le_bytes(data.try_into().ok()?)),
            DataType::Timestamp => Value::Timestamp(i64::from_le_bytes(data.try_into().ok()?)),
            DataType::Char(_) => {
                let s = std::str::from_utf8(data).ok()?;
                Value::String(s.trim_end_matches(' ').to_string())
            }
            DataType::VarChar(n) => {
                let len = u16::from_le_bytes([data[0], data[1]]) as usize;
                if len > *n as usize {
                    return None;
                }
                let s = std::str::from_utf8(&data[2..2 + len]).ok()?;
                Value::String(s.to_string())
            }
        };
        Some(value)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::BigInt => write!(f, "BIGINT"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::VarChar(n) => write!(f, "VARCHAR({})", n),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(DataType::Integer.max_size(), 4);
        assert_eq!(DataType::Char(20).max_size(), 20);
        assert_eq!(DataType::VarChar(100).max_size(), 102);
        assert!(!DataType::VarChar(100).is_fixed_size());
    }

    #[test]
    fn test_integer_encoding() {
        let mut out = Vec::new();
        DataType::Integer
            .encode(&Value::Integer(42), &mut out)
            .unwrap();
        assert_eq!(out, vec![42, 0, 0, 0]);
        assert_eq!(DataType::Integer.decode(&out), Some(Value::Integer(42)));
    }

    #[test]
    fn test_varchar_padded_to_max() {
        let mut out = Vec::new();
        DataType::VarChar(8)
            .encode(&Value::from("hello"), &mut out)
            .unwrap();
        assert_eq!(out.len(), 10);
        assert_eq!(&out[..7], &[5, 0, b'h', b'e', b'l', b'l', b'o']);
        assert_eq!(DataType::VarChar(8).decode(&out), Some(Value::from("hello")));
    }

    #[test]
    fn test_char_trims_padding() {
        let mut out = Vec::new();
        DataType::Char(5).encode(&Value::from("hi"), &mut out).unwrap();
        assert_eq!(out, b"hi   ");
        assert_eq!(DataType::Char(5).decode(&out), Some(Value::from("hi")));
    }

    #[test]
    fn test_char_trailing_space_rejected() {
        let char4 = DataType::Char(4);
        assert!(!char4.accepts(&Value::from("a ")));
        assert!(char4.encode(&Value::from("a "), &mut Vec::new()).is_none());
        assert!(DataType::VarChar(4).accepts(&Value::from("a ")));

        let mut out = Vec::new();
        char4.encode(&Value::from("a b"), &mut out).unwrap();
        assert_eq!(char4.decode(&out), Some(Value::from("a b")));
    }

    #[test]
    fn test_rejects_mismatch() {
        let mut out = Vec::new();
        assert!(DataType::Integer
            .encode(&Value::BigInt(1), &mut out)
            .is_none());
        assert!(DataType::VarChar(2)
            .encode(&Value::from("toolong"), &mut out)
            .is_none());
        assert!(out.is_empty());
        assert!(DataType::BigInt.decode(&[1, 2]).is_none());
    }
}
