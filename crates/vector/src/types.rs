use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical type tag of a value or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    /// Type of an untyped NULL literal. Coerces to any other type.
    Null,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Varchar,
    Blob,
}

impl LogicalType {
    /// Width in bytes of one fixed-size slot.
    pub fn element_width(self) -> usize {
        match self {
            LogicalType::Null | LogicalType::Boolean | LogicalType::TinyInt => 1,
            LogicalType::SmallInt => 2,
            LogicalType::Integer => 4,
            LogicalType::BigInt | LogicalType::Double => 8,
            LogicalType::Varchar | LogicalType::Blob => 16,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            LogicalType::TinyInt | LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self == LogicalType::Double
    }

    pub fn is_varlen(self) -> bool {
        matches!(self, LogicalType::Varchar | LogicalType::Blob)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalType::Null => "NULL",
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::TinyInt => "TINYINT",
            LogicalType::SmallInt => "SMALLINT",
            LogicalType::Integer => "INTEGER",
            LogicalType::BigInt => "BIGINT",
            LogicalType::Double => "DOUBLE",
            LogicalType::Varchar => "VARCHAR",
            LogicalType::Blob => "BLOB",
        };
        f.write_str(s)
    }
}

/// Extra type information for VARCHAR columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarcharInfo {
    pub max_length: u32,
}

impl VarcharInfo {
    pub fn new(max_length: u32) -> Self {
        Self { max_length }
    }
}

/// Full data type: logical tag plus optional type info.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataType {
    logical_type: LogicalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    varchar_info: Option<VarcharInfo>,
}

impl DataType {
    pub const fn new(logical_type: LogicalType) -> Self {
        Self {
            logical_type,
            varchar_info: None,
        }
    }

    pub fn varchar_with(info: VarcharInfo) -> Self {
        Self {
            logical_type: LogicalType::Varchar,
            varchar_info: Some(info),
        }
    }

    pub const fn null() -> Self {
        Self::new(LogicalType::Null)
    }

    pub const fn boolean() -> Self {
        Self::new(LogicalType::Boolean)
    }

    pub const fn integer() -> Self {
        Self::new(LogicalType::Integer)
    }

    pub const fn bigint() -> Self {
        Self::new(LogicalType::BigInt)
    }

    pub const fn double() -> Self {
        Self::new(LogicalType::Double)
    }

    pub const fn varchar() -> Self {
        Self::new(LogicalType::Varchar)
    }

    pub const fn blob() -> Self {
        Self::new(LogicalType::Blob)
    }

    pub fn logical_type(&self) -> LogicalType {
        self.logical_type
    }

    pub fn varchar_info(&self) -> Option<VarcharInfo> {
        self.varchar_info
    }

    /// Slot width in bytes.
    pub fn size(&self) -> usize {
        self.logical_type.element_width()
    }

    pub fn is_varlen(&self) -> bool {
        self.logical_type.is_varlen()
    }

    pub fn is_numeric(&self) -> bool {
        self.logical_type.is_numeric()
    }
}

impl From<LogicalType> for DataType {
    fn from(logical_type: LogicalType) -> Self {
        DataType::new(logical_type)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.varchar_info {
            Some(info) => write!(f, "{}({})", self.logical_type, info.max_length),
            None => write!(f, "{}", self.logical_type),
        }
    }
}

/// Named, typed output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of fields describing a table or an operator output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of the first field named `name` (case-insensitive).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn data_types(&self) -> Vec<DataType> {
        self.fields.iter().map(|f| f.data_type.clone()).collect()
    }
}
