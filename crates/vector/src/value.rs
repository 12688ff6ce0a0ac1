//! Scalar values and the variable-length (VARCHAR/BLOB) representation.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use quiver_common::{QuiverError, Result};

use crate::types::{DataType, LogicalType};

/// Maximum byte length stored directly inside a fixed-width slot.
pub const VARLEN_INLINE_LENGTH: usize = 12;
/// Number of leading bytes kept in the slot for heap-backed values.
pub const VARLEN_PREFIX_LENGTH: usize = 4;

/// Variable-length payload.
///
/// Short payloads (`len <= VARLEN_INLINE_LENGTH`) live inline. Longer payloads
/// keep a prefix for cheap comparisons and reference heap bytes.
#[derive(Clone, Debug)]
pub enum Varlen {
    Inline {
        length: u32,
        data: [u8; VARLEN_INLINE_LENGTH],
    },
    Heap {
        prefix: [u8; VARLEN_PREFIX_LENGTH],
        data: Arc<[u8]>,
    },
}

impl Varlen {
    pub fn new(bytes: &[u8]) -> Self {
        if bytes.len() <= VARLEN_INLINE_LENGTH {
            let mut data = [0u8; VARLEN_INLINE_LENGTH];
            data[..bytes.len()].copy_from_slice(bytes);
            Varlen::Inline {
                length: bytes.len() as u32,
                data,
            }
        } else {
            let mut prefix = [0u8; VARLEN_PREFIX_LENGTH];
            prefix.copy_from_slice(&bytes[..VARLEN_PREFIX_LENGTH]);
            Varlen::Heap {
                prefix,
                data: Arc::from(bytes),
            }
        }
    }

    pub fn is_inlined(&self) -> bool {
        matches!(self, Varlen::Inline { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Varlen::Inline { length, .. } => *length as usize,
            Varlen::Heap { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Varlen::Inline { length, data } => &data[..*length as usize],
            Varlen::Heap { data, .. } => data,
        }
    }

    /// Leading bytes as stored in the slot (at most [`VARLEN_PREFIX_LENGTH`] for heap values).
    pub fn prefix(&self) -> &[u8] {
        match self {
            Varlen::Inline { .. } => {
                let bytes = self.as_bytes();
                &bytes[..bytes.len().min(VARLEN_PREFIX_LENGTH)]
            }
            Varlen::Heap { prefix, .. } => prefix,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }
}

impl PartialEq for Varlen {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.prefix() == other.prefix() && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Varlen {}

impl Hash for Varlen {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl PartialOrd for Varlen {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Varlen {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

/// Physical payload of a [`Value`].
#[derive(Clone, Debug)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    Varchar(Varlen),
    Blob(Varlen),
}

/// Typed scalar. A NULL keeps its declared type so it can be appended to a
/// column of that type.
#[derive(Clone, Debug)]
pub struct Value {
    data_type: DataType,
    data: ScalarValue,
}

impl Value {
    /// NULL of the given type.
    pub fn null(data_type: DataType) -> Self {
        Self {
            data_type,
            data: ScalarValue::Null,
        }
    }

    /// Untyped NULL literal.
    pub fn null_literal() -> Self {
        Self::null(DataType::null())
    }

    pub fn make_bool(v: bool) -> Self {
        Self {
            data_type: DataType::boolean(),
            data: ScalarValue::Boolean(v),
        }
    }

    pub fn make_tiny_int(v: i8) -> Self {
        Self {
            data_type: DataType::new(LogicalType::TinyInt),
            data: ScalarValue::TinyInt(v),
        }
    }

    pub fn make_small_int(v: i16) -> Self {
        Self {
            data_type: DataType::new(LogicalType::SmallInt),
            data: ScalarValue::SmallInt(v),
        }
    }

    pub fn make_int(v: i32) -> Self {
        Self {
            data_type: DataType::integer(),
            data: ScalarValue::Integer(v),
        }
    }

    pub fn make_big_int(v: i64) -> Self {
        Self {
            data_type: DataType::bigint(),
            data: ScalarValue::BigInt(v),
        }
    }

    pub fn make_double(v: f64) -> Self {
        Self {
            data_type: DataType::double(),
            data: ScalarValue::Double(v),
        }
    }

    pub fn make_varchar(s: &str) -> Self {
        Self {
            data_type: DataType::varchar(),
            data: ScalarValue::Varchar(Varlen::new(s.as_bytes())),
        }
    }

    pub fn make_blob(bytes: &[u8]) -> Self {
        Self {
            data_type: DataType::blob(),
            data: ScalarValue::Blob(Varlen::new(bytes)),
        }
    }

    /// Builds a value from a payload, checking that the two agree.
    pub fn from_scalar(data_type: DataType, data: ScalarValue) -> Result<Self> {
        let ok = match (&data, data_type.logical_type()) {
            (ScalarValue::Null, _) => true,
            (ScalarValue::Boolean(_), LogicalType::Boolean)
            | (ScalarValue::TinyInt(_), LogicalType::TinyInt)
            | (ScalarValue::SmallInt(_), LogicalType::SmallInt)
            | (ScalarValue::Integer(_), LogicalType::Integer)
            | (ScalarValue::BigInt(_), LogicalType::BigInt)
            | (ScalarValue::Double(_), LogicalType::Double)
            | (ScalarValue::Varchar(_), LogicalType::Varchar)
            | (ScalarValue::Blob(_), LogicalType::Blob) => true,
            _ => false,
        };
        if !ok {
            return Err(QuiverError::Type(format!(
                "payload {data:?} does not match type {data_type}"
            )));
        }
        Ok(Self { data_type, data })
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn logical_type(&self) -> LogicalType {
        self.data_type.logical_type()
    }

    pub fn scalar(&self) -> &ScalarValue {
        &self.data
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, ScalarValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data {
            ScalarValue::Boolean(b) => Some(b),
            _ => None,
        }
    }

    /// Integer payload widened to i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self.data {
            ScalarValue::TinyInt(v) => Some(v as i64),
            ScalarValue::SmallInt(v) => Some(v as i64),
            ScalarValue::Integer(v) => Some(v as i64),
            ScalarValue::BigInt(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric payload widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self.data {
            ScalarValue::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_varlen(&self) -> Option<&Varlen> {
        match &self.data {
            ScalarValue::Varchar(v) | ScalarValue::Blob(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ScalarValue::Varchar(v) => v.as_str(),
            _ => None,
        }
    }

    /// SQL-style comparison. Returns `None` when either side is NULL or the
    /// types are not comparable. Numeric types compare across widths.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use ScalarValue as S;
        match (&self.data, &other.data) {
            (S::Null, _) | (_, S::Null) => None,
            (S::Boolean(a), S::Boolean(b)) => Some(a.cmp(b)),
            (S::Varchar(a), S::Varchar(b)) | (S::Blob(a), S::Blob(b)) => Some(a.cmp(b)),
            (S::Double(_), _) | (_, S::Double(_)) => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                Some(canonical_f64(a).total_cmp(&canonical_f64(b)))
            }
            _ => {
                let (a, b) = (self.as_i64()?, other.as_i64()?);
                Some(a.cmp(&b))
            }
        }
    }

    /// Total order used by ORDER BY: NULLs sort last, incomparable values by type tag.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.compare(other).unwrap_or_else(|| {
                (self.logical_type() as u8).cmp(&(other.logical_type() as u8))
            }),
        }
    }

    /// Converts to `target`, failing with a type error when the conversion is
    /// not defined or the value does not fit.
    pub fn try_cast(&self, target: &DataType) -> Result<Value> {
        use ScalarValue as S;
        if self.is_null() {
            return Ok(Value::null(target.clone()));
        }
        if self.logical_type() == target.logical_type() {
            return Ok(Value {
                data_type: target.clone(),
                data: self.data.clone(),
            });
        }
        let fail = || {
            QuiverError::Type(format!(
                "cannot cast {} value '{}' to {}",
                self.data_type, self, target
            ))
        };
        let data = match target.logical_type() {
            LogicalType::Null => return Err(fail()),
            LogicalType::Boolean => match &self.data {
                S::Varchar(v) => match v.as_str().map(|s| s.trim().to_ascii_lowercase()) {
                    Some(s) if s == "true" || s == "t" || s == "1" => S::Boolean(true),
                    Some(s) if s == "false" || s == "f" || s == "0" => S::Boolean(false),
                    _ => return Err(fail()),
                },
                _ => S::Boolean(self.as_i64().ok_or_else(fail)? != 0),
            },
            LogicalType::TinyInt => S::TinyInt(i8::try_from(self.integral().ok_or_else(fail)?).map_err(|_| fail())?),
            LogicalType::SmallInt => S::SmallInt(i16::try_from(self.integral().ok_or_else(fail)?).map_err(|_| fail())?),
            LogicalType::Integer => S::Integer(i32::try_from(self.integral().ok_or_else(fail)?).map_err(|_| fail())?),
            LogicalType::BigInt => S::BigInt(self.integral().ok_or_else(fail)?),
            LogicalType::Double => match &self.data {
                S::Varchar(v) => S::Double(
                    v.as_str()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .ok_or_else(fail)?,
                ),
                S::Boolean(b) => S::Double(if *b { 1.0 } else { 0.0 }),
                _ => S::Double(self.as_f64().ok_or_else(fail)?),
            },
            LogicalType::Varchar => match &self.data {
                S::Blob(v) => S::Varchar(v.clone()),
                _ => S::Varchar(Varlen::new(self.to_string().as_bytes())),
            },
            LogicalType::Blob => match &self.data {
                S::Varchar(v) => S::Blob(v.clone()),
                _ => return Err(fail()),
            },
        };
        Ok(Value {
            data_type: target.clone(),
            data,
        })
    }

    fn integral(&self) -> Option<i64> {
        match &self.data {
            ScalarValue::Boolean(b) => Some(*b as i64),
            ScalarValue::Double(d) => {
                if d.is_finite() && *d >= i64::MIN as f64 && *d <= i64::MAX as f64 {
                    Some(d.trunc() as i64)
                } else {
                    None
                }
            }
            ScalarValue::Varchar(v) => v.as_str().and_then(|s| s.trim().parse::<i64>().ok()),
            _ => self.as_i64(),
        }
    }
}

/// Folds `-0.0` into `0.0` and every NaN into one NaN, so equality, hashing
/// and ordering of doubles agree.
fn canonical_f64(d: f64) -> f64 {
    if d == 0.0 {
        0.0
    } else if d.is_nan() {
        f64::NAN
    } else {
        d
    }
}

/// Equality used for grouping and join keys: NULL equals NULL, numbers are
/// compared after widening, doubles by canonical bit pattern.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use ScalarValue as S;
        match (&self.data, &other.data) {
            (S::Null, S::Null) => true,
            (S::Boolean(a), S::Boolean(b)) => a == b,
            (S::Varchar(a), S::Varchar(b)) | (S::Blob(a), S::Blob(b)) => a == b,
            (S::Double(a), S::Double(b)) => {
                canonical_f64(*a).to_bits() == canonical_f64(*b).to_bits()
            }
            (S::Double(_), _) | (_, S::Double(_)) => false,
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use ScalarValue as S;
        match &self.data {
            S::Null => 0u8.hash(state),
            S::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            S::Double(d) => {
                2u8.hash(state);
                canonical_f64(*d).to_bits().hash(state);
            }
            S::Varchar(v) | S::Blob(v) => {
                3u8.hash(state);
                v.hash(state);
            }
            _ => {
                4u8.hash(state);
                self.as_i64().hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            ScalarValue::Null => f.write_str("NULL"),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
            ScalarValue::TinyInt(v) => write!(f, "{v}"),
            ScalarValue::SmallInt(v) => write!(f, "{v}"),
            ScalarValue::Integer(v) => write!(f, "{v}"),
            ScalarValue::BigInt(v) => write!(f, "{v}"),
            ScalarValue::Double(v) => write!(f, "{v}"),
            ScalarValue::Varchar(v) => f.write_str(&String::from_utf8_lossy(v.as_bytes())),
            ScalarValue::Blob(v) => {
                f.write_str("\\x")?;
                for b in v.as_bytes() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}
