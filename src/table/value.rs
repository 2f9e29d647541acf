//! Cell values and their fixed-width column encoding.

use std::fmt;

use crate::column_type::ColumnType;
use crate::error::{Result, StrataError};

/// A single cell. Symbols travel as text; the writer maps them to keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Date(i64),
    Timestamp(i64),
    Float(f32),
    Double(f64),
    Symbol(String),
    Long256([u64; 4]),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Bytes stored in a `column_type` column. Symbols are encoded by the
    /// writer and rejected here.
    pub(crate) fn encode(&self, column_type: ColumnType, out: &mut Vec<u8>) -> Result<()> {
        match (column_type, self) {
            (_, Value::Null) => {
                let null = column_type.null_bytes();
                if null.is_empty() {
                    return Err(StrataError::InvalidArgument(format!(
                        "{} columns are not writable",
                        column_type
                    )));
                }
                out.extend_from_slice(&null);
            }
            (ColumnType::Boolean, Value::Bool(v)) => out.push(*v as u8),
            (ColumnType::Byte, Value::Byte(v)) => out.push(*v as u8),
            (ColumnType::Short, Value::Short(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ColumnType::Short, Value::Byte(v)) => out.extend_from_slice(&(*v as i16).to_le_bytes()),
            (ColumnType::Char, Value::Char(v)) => {
                let unit = u16::try_from(*v as u32).map_err(|_| {
                    StrataError::InvalidArgument(format!("'{}' does not fit a CHAR column", v))
                })?;
                out.extend_from_slice(&unit.to_le_bytes());
            }
            (ColumnType::Int, Value::Int(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ColumnType::Long, Value::Long(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ColumnType::Long, Value::Int(v)) => out.extend_from_slice(&(*v as i64).to_le_bytes()),
            (ColumnType::Date, Value::Date(v) | Value::Long(v))
            | (ColumnType::Timestamp, Value::Timestamp(v) | Value::Long(v)) => {
                out.extend_from_slice(&v.to_le_bytes())
            }
            (ColumnType::Float, Value::Float(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ColumnType::Double, Value::Double(v)) => out.extend_from_slice(&v.to_le_bytes()),
            (ColumnType::Double, Value::Float(v)) => out.extend_from_slice(&(*v as f64).to_le_bytes()),
            (ColumnType::Long256, Value::Long256(words)) => {
                for w in words {
                    out.extend_from_slice(&w.to_le_bytes());
                }
            }
            (t, v) => {
                return Err(StrataError::InvalidArgument(format!(
                    "cannot store {:?} in a {} column",
                    v, t
                )))
            }
        }
        Ok(())
    }

    /// Inverse of [`encode`](Self::encode); null sentinels decode as `Null`
    /// and symbol keys as `Int`.
    pub(crate) fn decode(column_type: ColumnType, bytes: &[u8]) -> Result<Value> {
        let fixed = |n: usize| -> Result<&[u8]> {
            bytes.get(..n).ok_or_else(|| {
                StrataError::InvalidArgument(format!(
                    "{} bytes cannot hold a {} value",
                    bytes.len(),
                    column_type
                ))
            })
        };
        let value = match column_type {
            ColumnType::Boolean => Value::Bool(fixed(1)?[0] != 0),
            ColumnType::Byte => Value::Byte(fixed(1)?[0] as i8),
            ColumnType::Short => Value::Short(i16::from_le_bytes(to_array(fixed(2)?))),
            ColumnType::Char => {
                let unit = u16::from_le_bytes(to_array(fixed(2)?));
                Value::Char(char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
            }
            ColumnType::Int | ColumnType::Symbol => {
                let v = i32::from_le_bytes(to_array(fixed(4)?));
                match (column_type, v) {
                    (ColumnType::Int, i32::MIN) | (ColumnType::Symbol, -1) => Value::Null,
                    _ => Value::Int(v),
                }
            }
            ColumnType::Long | ColumnType::Date | ColumnType::Timestamp => {
                let v = i64::from_le_bytes(to_array(fixed(8)?));
                match (column_type, v) {
                    (_, i64::MIN) => Value::Null,
                    (ColumnType::Date, v) => Value::Date(v),
                    (ColumnType::Timestamp, v) => Value::Timestamp(v),
                    (_, v) => Value::Long(v),
                }
            }
            ColumnType::Float => {
                let v = f32::from_le_bytes(to_array(fixed(4)?));
                if v.is_nan() { Value::Null } else { Value::Float(v) }
            }
            ColumnType::Double => {
                let v = f64::from_le_bytes(to_array(fixed(8)?));
                if v.is_nan() { Value::Null } else { Value::Double(v) }
            }
            ColumnType::Long256 => {
                let raw = fixed(32)?;
                let mut words = [0u64; 4];
                for (i, w) in words.iter_mut().enumerate() {
                    *w = u64::from_le_bytes(to_array(&raw[i * 8..i * 8 + 8]));
                }
                Value::Long256(words)
            }
            other => {
                return Err(StrataError::InvalidArgument(format!(
                    "{} columns are not readable as fixed-width values",
                    other
                )))
            }
        };
        Ok(value)
    }
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) | Value::Date(v) | Value::Timestamp(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Symbol(v) => f.write_str(v),
            Value::Long256(w) => write!(f, "0x{:016x}{:016x}{:016x}{:016x}", w[3], w[2], w[1], w[0]),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Symbol(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Symbol(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
