use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;

/// Values that can be bound as statement parameters.
///
/// A missing value is always the explicit [`ParamValue::Null`] marker:
/// ```rust
/// use sql_pipe::prelude::*;
///
/// let name: Option<&str> = None;
/// assert_eq!(ParamValue::from(name), ParamValue::Null);
/// assert_eq!(ParamValue::from(7_i32), ParamValue::Int(7));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value, bound as its serialized text
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl ParamValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Length in characters (text) or bytes (binary) of the bound value.
    #[must_use]
    pub fn length(&self) -> usize {
        match self {
            ParamValue::Text(s) => s.chars().count(),
            ParamValue::Json(v) => v.to_string().chars().count(),
            ParamValue::Blob(b) => b.len(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let ParamValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        ParamValue::Blob(value)
    }
}

impl From<NaiveDateTime> for ParamValue {
    fn from(value: NaiveDateTime) -> Self {
        ParamValue::Timestamp(value)
    }
}

impl From<JsonValue> for ParamValue {
    fn from(value: JsonValue) -> Self {
        ParamValue::Json(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// Declared server-side type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    NVarChar,
    VarChar,
    NChar,
    Char,
    Int,
    BigInt,
    SmallInt,
    TinyInt,
    Bit,
    Float,
    Real,
    Decimal { precision: u8, scale: u8 },
    DateTime,
    DateTime2,
    Date,
    Time,
    UniqueIdentifier,
    VarBinary,
    Xml,
}

/// Size value meaning `MAX` for variable-length types.
pub const SIZE_MAX: i32 = -1;

impl SqlType {
    /// Text types whose size is derived from the bound value when not given.
    #[must_use]
    pub fn is_variable_length_text(self) -> bool {
        matches!(self, SqlType::NVarChar | SqlType::VarChar)
    }

    /// Largest inline size before the declaration has to become `MAX`.
    #[must_use]
    pub fn max_inline_size(self) -> Option<i32> {
        match self {
            SqlType::NVarChar | SqlType::NChar => Some(4000),
            SqlType::VarChar | SqlType::Char | SqlType::VarBinary => Some(8000),
            _ => None,
        }
    }

    /// T-SQL declaration for this type, e.g. `NVARCHAR(200)` or `VARBINARY(MAX)`.
    #[must_use]
    pub fn declaration(self, size: Option<i32>) -> String {
        let sized = |name: &str| match size {
            Some(n) if n > 0 && self.max_inline_size().is_none_or(|max| n <= max) => {
                format!("{name}({n})")
            }
            Some(_) => format!("{name}(MAX)"),
            None => match self {
                SqlType::NChar | SqlType::Char => format!("{name}(1)"),
                _ => format!("{name}(MAX)"),
            },
        };
        match self {
            SqlType::NVarChar => sized("NVARCHAR"),
            SqlType::VarChar => sized("VARCHAR"),
            SqlType::NChar => sized("NCHAR"),
            SqlType::Char => sized("CHAR"),
            SqlType::VarBinary => sized("VARBINARY"),
            SqlType::Int => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::TinyInt => "TINYINT".to_string(),
            SqlType::Bit => "BIT".to_string(),
            SqlType::Float => "FLOAT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
            SqlType::DateTime => "DATETIME".to_string(),
            SqlType::DateTime2 => "DATETIME2".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::UniqueIdentifier => "UNIQUEIDENTIFIER".to_string(),
            SqlType::Xml => "XML".to_string(),
        }
    }
}

/// Whether the command text is a batch or the name of a stored procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandType {
    #[default]
    Text,
    StoredProcedure,
}

/// A single cell read from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    /// Exact numeric rendered as text to keep its precision
    Decimal(String),
    Text(String),
    Xml(String),
    Binary(Vec<u8>),
    Guid(String),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

impl ColumnValue {
    /// Stable name of the value's type, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnValue::Null => "Null",
            ColumnValue::Bool(_) => "Boolean",
            ColumnValue::Byte(_) => "Byte",
            ColumnValue::Int16(_) => "Int16",
            ColumnValue::Int32(_) => "Int32",
            ColumnValue::Int64(_) => "Int64",
            ColumnValue::Single(_) => "Single",
            ColumnValue::Double(_) => "Double",
            ColumnValue::Decimal(_) => "Decimal",
            ColumnValue::Text(_) => "String",
            ColumnValue::Xml(_) => "Xml",
            ColumnValue::Binary(_) => "Binary",
            ColumnValue::Guid(_) => "Guid",
            ColumnValue::DateTime(_) => "DateTime",
            ColumnValue::Date(_) => "Date",
            ColumnValue::Time(_) => "Time",
            ColumnValue::DateTimeOffset(_) => "DateTimeOffset",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(value) | ColumnValue::Xml(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Byte(v) => Some(i64::from(*v)),
            ColumnValue::Int16(v) => Some(i64::from(*v)),
            ColumnValue::Int32(v) => Some(i64::from(*v)),
            ColumnValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Bool(v) => Some(*v),
            other => other.as_i64().and_then(|i| match i {
                0 => Some(false),
                1 => Some(true),
                _ => None,
            }),
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let ColumnValue::Binary(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}
