//! Column Type Registry
//!
//! The fixed set of logical column types. Every binary format in the crate
//! sizes its fields through this table.
//!
//! ## Type Table
//! ```text
//! ┌────┬───────────┬───────┬────────────┐
//! │ Id │ Name      │ Width │ Precedence │
//! ├────┼───────────┼───────┼────────────┤
//! │  0 │ BOOLEAN   │   1   │      0     │
//! │  1 │ BYTE      │   1   │      1     │
//! │  2 │ SHORT     │   2   │      3     │
//! │  3 │ CHAR      │   2   │      2     │
//! │  4 │ INT       │   4   │      4     │
//! │  5 │ LONG      │   8   │      7     │
//! │  6 │ DATE      │   8   │      5     │
//! │  7 │ TIMESTAMP │   8   │      6     │
//! │  8 │ FLOAT     │   4   │      8     │
//! │  9 │ DOUBLE    │   8   │      9     │
//! │ 10 │ STRING    │  var  │     11     │
//! │ 11 │ SYMBOL    │   4   │     10     │
//! │ 12 │ LONG256   │  32   │     12     │
//! │ 13 │ BINARY    │  var  │     13     │
//! │ 14 │ PARAMETER │   -   │      -     │
//! │ 15 │ CURSOR    │   -   │      -     │
//! │ 16 │ VARARG    │   -   │     14     │
//! │ 17 │ RECORD    │   -   │      -     │
//! └────┴───────────┴───────┴────────────┘
//! ```
//!
//! The registry is built once and shared by reference; nothing mutates it
//! after construction, so concurrent readers need no synchronization.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, StrataError};

/// Logical column type identifiers as persisted in the metadata file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum ColumnType {
    Boolean = 0,
    Byte = 1,
    Short = 2,
    Char = 3,
    Int = 4,
    Long = 5,
    Date = 6,
    Timestamp = 7,
    Float = 8,
    Double = 9,
    String = 10,
    Symbol = 11,
    Long256 = 12,
    Binary = 13,
    Parameter = 14,
    Cursor = 15,
    VarArg = 16,
    Record = 17,
}

impl ColumnType {
    /// Highest valid type id
    pub const MAX_ID: i32 = ColumnType::Record as i32;

    const ALL: [ColumnType; 18] = [
        ColumnType::Boolean,
        ColumnType::Byte,
        ColumnType::Short,
        ColumnType::Char,
        ColumnType::Int,
        ColumnType::Long,
        ColumnType::Date,
        ColumnType::Timestamp,
        ColumnType::Float,
        ColumnType::Double,
        ColumnType::String,
        ColumnType::Symbol,
        ColumnType::Long256,
        ColumnType::Binary,
        ColumnType::Parameter,
        ColumnType::Cursor,
        ColumnType::VarArg,
        ColumnType::Record,
    ];

    /// Numeric id as written to disk
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Map a persisted id back to a type
    pub fn from_id(id: i32) -> Result<Self> {
        if (0..=Self::MAX_ID).contains(&id) {
            Ok(Self::ALL[id as usize])
        } else {
            Err(StrataError::UnknownType(id))
        }
    }

    /// Bytes written for a null value of a fixed-width type
    pub fn null_bytes(self) -> Vec<u8> {
        match self {
            ColumnType::Int => i32::MIN.to_le_bytes().to_vec(),
            ColumnType::Symbol => (-1i32).to_le_bytes().to_vec(),
            ColumnType::Long | ColumnType::Date | ColumnType::Timestamp => {
                i64::MIN.to_le_bytes().to_vec()
            }
            ColumnType::Float => f32::NAN.to_le_bytes().to_vec(),
            ColumnType::Double => f64::NAN.to_le_bytes().to_vec(),
            ColumnType::Boolean | ColumnType::Byte => vec![0],
            ColumnType::Short | ColumnType::Char => vec![0, 0],
            ColumnType::Long256 => vec![0; 32],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(LogicalType::of(*self).name)
    }
}

/// Immutable description of one logical type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalType {
    pub column_type: ColumnType,
    pub name: &'static str,
    /// Fixed storage width; `None` for variable-width and non-storable types
    pub width: Option<usize>,
    /// Rank used to pick the most general type; `None` when not comparable
    pub precedence: Option<u8>,
}

impl LogicalType {
    const fn new(
        column_type: ColumnType,
        name: &'static str,
        width: Option<usize>,
        precedence: Option<u8>,
    ) -> Self {
        Self {
            column_type,
            name,
            width,
            precedence,
        }
    }

    fn of(column_type: ColumnType) -> &'static LogicalType {
        &TYPES[column_type as usize]
    }
}

static TYPES: [LogicalType; 18] = [
    LogicalType::new(ColumnType::Boolean, "BOOLEAN", Some(1), Some(0)),
    LogicalType::new(ColumnType::Byte, "BYTE", Some(1), Some(1)),
    LogicalType::new(ColumnType::Short, "SHORT", Some(2), Some(3)),
    LogicalType::new(ColumnType::Char, "CHAR", Some(2), Some(2)),
    LogicalType::new(ColumnType::Int, "INT", Some(4), Some(4)),
    LogicalType::new(ColumnType::Long, "LONG", Some(8), Some(7)),
    LogicalType::new(ColumnType::Date, "DATE", Some(8), Some(5)),
    LogicalType::new(ColumnType::Timestamp, "TIMESTAMP", Some(8), Some(6)),
    LogicalType::new(ColumnType::Float, "FLOAT", Some(4), Some(8)),
    LogicalType::new(ColumnType::Double, "DOUBLE", Some(8), Some(9)),
    LogicalType::new(ColumnType::String, "STRING", None, Some(11)),
    LogicalType::new(ColumnType::Symbol, "SYMBOL", Some(4), Some(10)),
    LogicalType::new(ColumnType::Long256, "LONG256", Some(32), Some(12)),
    LogicalType::new(ColumnType::Binary, "BINARY", None, Some(13)),
    LogicalType::new(ColumnType::Parameter, "PARAMETER", None, None),
    LogicalType::new(ColumnType::Cursor, "CURSOR", None, None),
    LogicalType::new(ColumnType::VarArg, "VARARG", None, Some(14)),
    LogicalType::new(ColumnType::Record, "RECORD", None, None),
];

/// Name aliases accepted in addition to the canonical names
const ALIASES: &[(&str, ColumnType)] = &[
    ("text", ColumnType::String),
    ("bytea", ColumnType::String),
    ("smallint", ColumnType::Short),
    ("bigint", ColumnType::Long),
    ("real", ColumnType::Float),
];

/// Lookup table over the fixed type set
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    by_name: HashMap<String, ColumnType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut by_name = HashMap::with_capacity(TYPES.len() + ALIASES.len());
        for t in TYPES.iter() {
            by_name.insert(t.name.to_ascii_lowercase(), t.column_type);
        }
        for (alias, column_type) in ALIASES {
            by_name.insert((*alias).to_string(), *column_type);
        }
        Self { by_name }
    }

    /// Full description of a persisted type id
    pub fn lookup(&self, id: i32) -> Result<&'static LogicalType> {
        ColumnType::from_id(id).map(LogicalType::of)
    }

    /// Storage width in bytes; `None` for variable-width types
    pub fn width_of(&self, id: i32) -> Result<Option<usize>> {
        Ok(self.lookup(id)?.width)
    }

    /// Widening precedence rank
    pub fn precedence_of(&self, id: i32) -> Result<Option<u8>> {
        Ok(self.lookup(id)?.precedence)
    }

    /// Case-insensitive name lookup
    pub fn id_of(&self, name: &str) -> Result<ColumnType> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| StrataError::UnknownTypeName(name.to_string()))
    }

    pub fn name_of(&self, column_type: ColumnType) -> &'static str {
        LogicalType::of(column_type).name
    }

    /// The more general of two types when merging heterogeneous values
    pub fn widest(&self, a: ColumnType, b: ColumnType) -> Result<ColumnType> {
        match (LogicalType::of(a).precedence, LogicalType::of(b).precedence) {
            (Some(pa), Some(pb)) => Ok(if pb > pa { b } else { a }),
            _ => Err(StrataError::InvalidArgument(format!(
                "types {} and {} cannot be widened",
                a, b
            ))),
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
