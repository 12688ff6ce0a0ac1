//! Fixed-capacity column of one data type.
//!
//! Lifecycle: `new` (uninitialized) -> `initialize*` -> appends/reads and
//! optional `reserve` -> `reset` (uninitialized again).
//!
//! Storage is reference counted: `Clone` and [`ColumnVector::shallow_copy`]
//! share the slot region, null bitmap and heap arena. Writes through one
//! handle are visible through every other handle. Callers that need an
//! independent vector copy the values into a fresh one.

use std::sync::Arc;

use parking_lot::RwLock;
use quiver_common::{QuiverError, ResourceUsage, Result};

use crate::buffer::{VectorBufferType, VectorStorage};
use crate::types::{DataType, LogicalType};
use crate::value::{ScalarValue, Value, Varlen, VARLEN_INLINE_LENGTH, VARLEN_PREFIX_LENGTH};
use crate::DEFAULT_VECTOR_SIZE;

/// How the slots of a vector map to logical rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnVectorType {
    /// One slot per row.
    Flat,
    /// A single slot broadcast to every row.
    Constant,
}

#[derive(Debug, Clone)]
pub struct ColumnVector {
    data_type: DataType,
    vector_type: ColumnVectorType,
    initialized: bool,
    storage: Option<Arc<RwLock<VectorStorage>>>,
    usage: Option<Arc<ResourceUsage>>,
}

impl ColumnVector {
    /// Uninitialized flat vector of `data_type`.
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            vector_type: ColumnVectorType::Flat,
            initialized: false,
            storage: None,
            usage: None,
        }
    }

    /// Uninitialized vector whose allocations report to `usage`.
    pub fn with_usage(data_type: DataType, usage: Arc<ResourceUsage>) -> Self {
        Self {
            usage: Some(usage),
            ..Self::new(data_type)
        }
    }

    /// Flat vector holding `values`, sized to fit them.
    pub fn from_values(data_type: DataType, values: &[Value]) -> Result<Self> {
        let mut v = Self::new(data_type);
        v.initialize_with(values.len().max(1), ColumnVectorType::Flat)?;
        for value in values {
            v.append_value(value)?;
        }
        Ok(v)
    }

    /// Constant vector broadcasting `value`.
    pub fn constant(value: &Value) -> Result<Self> {
        let mut v = Self::new(value.data_type().clone());
        v.initialize_with(1, ColumnVectorType::Constant)?;
        v.append_value(value)?;
        Ok(v)
    }

    /// Initializes a flat vector with the default vector size.
    pub fn initialize(&mut self) -> Result<()> {
        self.initialize_with(DEFAULT_VECTOR_SIZE, ColumnVectorType::Flat)
    }

    pub fn initialize_with(&mut self, capacity: usize, vector_type: ColumnVectorType) -> Result<()> {
        if self.initialized {
            return Err(QuiverError::Type(
                "column vector is already initialized; reset it first".to_string(),
            ));
        }
        let capacity = match vector_type {
            ColumnVectorType::Constant if capacity != 1 => {
                return Err(QuiverError::Storage(format!(
                    "constant vector must have capacity 1, got {capacity}"
                )))
            }
            _ if capacity == 0 => {
                return Err(QuiverError::Storage(
                    "column vector capacity must be positive".to_string(),
                ))
            }
            _ => capacity,
        };
        let buffer_type = if self.data_type.is_varlen() {
            VectorBufferType::Heap
        } else {
            VectorBufferType::Standard
        };
        self.storage = Some(Arc::new(RwLock::new(VectorStorage::new(
            buffer_type,
            self.data_type.size(),
            capacity,
            self.usage.clone(),
        ))));
        self.vector_type = vector_type;
        self.initialized = true;
        Ok(())
    }

    pub fn set_data_type(&mut self, data_type: DataType) -> Result<()> {
        if self.initialized {
            return Err(QuiverError::Type(
                "cannot change data type of an initialized column vector".to_string(),
            ));
        }
        self.data_type = data_type;
        Ok(())
    }

    pub fn set_vector_type(&mut self, vector_type: ColumnVectorType) -> Result<()> {
        if self.initialized {
            return Err(QuiverError::Type(
                "cannot change vector type of an initialized column vector".to_string(),
            ));
        }
        self.vector_type = vector_type;
        Ok(())
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn vector_type(&self) -> ColumnVectorType {
        self.vector_type
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_constant(&self) -> bool {
        self.vector_type == ColumnVectorType::Constant
    }

    /// Slot width in bytes.
    pub fn data_type_size(&self) -> usize {
        self.data_type.size()
    }

    /// Slot capacity, 0 when uninitialized.
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.read().capacity)
    }

    /// Index of the next free slot.
    pub fn tail_index(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.read().tail_index)
    }

    /// Number of stored values.
    pub fn size(&self) -> usize {
        self.tail_index()
    }

    pub fn buffer_type(&self) -> Option<VectorBufferType> {
        self.storage.as_ref().map(|s| s.read().buffer_type)
    }

    /// Bytes used in the heap arena.
    pub fn heap_size(&self) -> usize {
        self.storage.as_ref().map_or(0, |s| s.read().heap.len())
    }

    /// Address of the fixed-width slot region, null when uninitialized.
    /// Stable until the next `reserve` that grows the vector.
    pub fn data_ptr(&self) -> *const u8 {
        self.storage
            .as_ref()
            .map_or(std::ptr::null(), |s| s.read().data.as_ptr())
    }

    /// Whether both handles refer to the same backing storage.
    pub fn shares_storage_with(&self, other: &ColumnVector) -> bool {
        match (&self.storage, &other.storage) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn storage(&self) -> Result<&Arc<RwLock<VectorStorage>>> {
        match (&self.storage, self.initialized) {
            (Some(s), true) => Ok(s),
            _ => Err(QuiverError::Type(
                "column vector is not initialized".to_string(),
            )),
        }
    }

    pub fn append_value(&mut self, value: &Value) -> Result<()> {
        let storage = self.storage()?;
        let lt = value.logical_type();
        if lt != self.data_type.logical_type() && !(lt == LogicalType::Null && value.is_null()) {
            return Err(QuiverError::Type(format!(
                "cannot append {} value to {} column vector",
                value.data_type(),
                self.data_type
            )));
        }
        let mut s = storage.write();
        let idx = s.tail_index;
        if self.vector_type == ColumnVectorType::Constant && idx >= 1 {
            return Err(QuiverError::Storage(
                "constant vector already holds a value".to_string(),
            ));
        }
        if idx >= s.capacity {
            return Err(QuiverError::Storage(format!(
                "column vector is full (capacity {})",
                s.capacity
            )));
        }
        write_slot(&mut s, idx, value.scalar())?;
        s.tail_index += 1;
        Ok(())
    }

    /// Appends row `row` of `other`, broadcasting constant sources.
    pub fn append_from(&mut self, other: &ColumnVector, row: usize) -> Result<()> {
        let v = other.value_at(row)?;
        self.append_value(&v)
    }

    /// Value in slot `i`.
    pub fn get_value(&self, i: usize) -> Result<Value> {
        let s = self.storage()?.read();
        if i >= s.tail_index {
            return Err(QuiverError::Type(format!(
                "index {i} out of range for column vector of size {}",
                s.tail_index
            )));
        }
        if s.is_null(i) {
            return Ok(Value::null(self.data_type.clone()));
        }
        let scalar = read_slot(&s, i, self.data_type.logical_type());
        Value::from_scalar(self.data_type.clone(), scalar)
    }

    /// Value for logical row `row`; constant vectors answer every row.
    pub fn value_at(&self, row: usize) -> Result<Value> {
        match self.vector_type {
            ColumnVectorType::Constant => self.get_value(0),
            ColumnVectorType::Flat => self.get_value(row),
        }
    }

    /// Grows capacity to `capacity` slots. No-op when already large enough.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        if self.vector_type == ColumnVectorType::Constant {
            return Err(QuiverError::Storage(
                "cannot reserve a constant vector".to_string(),
            ));
        }
        self.storage()?.write().grow(capacity);
        Ok(())
    }

    /// Makes `self` another handle onto `other`'s storage and metadata.
    pub fn shallow_copy(&mut self, other: &ColumnVector) {
        self.data_type = other.data_type.clone();
        self.vector_type = other.vector_type;
        self.initialized = other.initialized;
        self.storage = other.storage.clone();
        self.usage = other.usage.clone();
    }

    /// Detaches storage and returns to the uninitialized state.
    pub fn reset(&mut self) {
        self.storage = None;
        self.initialized = false;
        self.vector_type = ColumnVectorType::Flat;
    }

    /// Values of every logical row as an owned list.
    pub fn values(&self) -> Result<Vec<Value>> {
        (0..self.size()).map(|i| self.get_value(i)).collect()
    }
}

/// Length prefix stored in a variable-length slot.
fn slot_length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        QuiverError::Storage(format!(
            "variable-length value of {len} bytes exceeds the slot length limit"
        ))
    })
}

fn write_slot(s: &mut VectorStorage, idx: usize, scalar: &ScalarValue) -> Result<()> {
    use ScalarValue as S;
    let varlen = match scalar {
        S::Varchar(v) | S::Blob(v) => Some(v.as_bytes()),
        _ => None,
    };
    let length = varlen.map(|b| slot_length(b.len())).transpose()?.unwrap_or(0);
    let heap_offset = match varlen {
        Some(bytes) if bytes.len() > VARLEN_INLINE_LENGTH => Some(s.push_heap(bytes)),
        _ => None,
    };
    s.set_null(idx, matches!(scalar, S::Null));
    let slot = s.slot_mut(idx);
    slot.fill(0);
    match scalar {
        S::Null => {}
        S::Boolean(b) => slot[0] = *b as u8,
        S::TinyInt(v) => slot[0] = *v as u8,
        S::SmallInt(v) => slot.copy_from_slice(&v.to_le_bytes()),
        S::Integer(v) => slot.copy_from_slice(&v.to_le_bytes()),
        S::BigInt(v) => slot.copy_from_slice(&v.to_le_bytes()),
        S::Double(v) => slot.copy_from_slice(&v.to_bits().to_le_bytes()),
        S::Varchar(v) | S::Blob(v) => {
            let bytes = v.as_bytes();
            slot[..4].copy_from_slice(&length.to_le_bytes());
            match heap_offset {
                None => slot[4..4 + bytes.len()].copy_from_slice(bytes),
                Some(offset) => {
                    slot[4..4 + VARLEN_PREFIX_LENGTH]
                        .copy_from_slice(&bytes[..VARLEN_PREFIX_LENGTH]);
                    slot[8..16].copy_from_slice(&(offset as u64).to_le_bytes());
                }
            }
        }
    }
    Ok(())
}

fn read_slot(s: &VectorStorage, idx: usize, lt: LogicalType) -> ScalarValue {
    let slot = s.slot(idx);
    let word = |n: usize| -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..n].copy_from_slice(&slot[..n]);
        buf
    };
    match lt {
        LogicalType::Null => ScalarValue::Null,
        LogicalType::Boolean => ScalarValue::Boolean(slot[0] != 0),
        LogicalType::TinyInt => ScalarValue::TinyInt(slot[0] as i8),
        LogicalType::SmallInt => ScalarValue::SmallInt(i16::from_le_bytes([slot[0], slot[1]])),
        LogicalType::Integer => {
            ScalarValue::Integer(i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]))
        }
        LogicalType::BigInt => ScalarValue::BigInt(i64::from_le_bytes(word(8))),
        LogicalType::Double => ScalarValue::Double(f64::from_bits(u64::from_le_bytes(word(8)))),
        LogicalType::Varchar | LogicalType::Blob => {
            let len = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]) as usize;
            let varlen = if len <= VARLEN_INLINE_LENGTH {
                Varlen::new(&slot[4..4 + len])
            } else {
                let mut off = [0u8; 8];
                off.copy_from_slice(&slot[8..16]);
                let offset = u64::from_le_bytes(off) as usize;
                Varlen::new(&s.heap[offset..offset + len])
            };
            if lt == LogicalType::Varchar {
                ScalarValue::Varchar(varlen)
            } else {
                ScalarValue::Blob(varlen)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{slot_length, ColumnVector, ColumnVectorType};
    use crate::types::DataType;
    use crate::value::Value;
    use quiver_common::{QuiverError, ResourceUsage};

    #[test]
    fn oversized_varlen_length_is_a_storage_error() {
        assert_eq!(slot_length(12).unwrap(), 12);
        assert_eq!(slot_length(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            slot_length(u32::MAX as usize + 1),
            Err(QuiverError::Storage(_))
        ));
    }

    #[test]
    fn append_and_get_integers() {
        let mut v = ColumnVector::new(DataType::integer());
        v.initialize_with(4, ColumnVectorType::Flat).unwrap();
        for i in 0..4 {
            v.append_value(&Value::make_int(i * 10)).unwrap();
        }
        assert_eq!(v.tail_index(), 4);
        assert_eq!(v.get_value(2).unwrap(), Value::make_int(20));
        assert!(matches!(
            v.append_value(&Value::make_int(1)),
            Err(QuiverError::Storage(_))
        ));
        assert!(matches!(v.get_value(4), Err(QuiverError::Type(_))));
    }

    #[test]
    fn type_mismatch_is_type_error() {
        let mut v = ColumnVector::new(DataType::integer());
        v.initialize().unwrap();
        assert!(matches!(
            v.append_value(&Value::make_varchar("x")),
            Err(QuiverError::Type(_))
        ));
        v.append_value(&Value::null_literal()).unwrap();
        assert!(v.get_value(0).unwrap().is_null());
    }

    #[test]
    fn use_before_initialize_fails() {
        let mut v = ColumnVector::new(DataType::bigint());
        assert!(matches!(
            v.append_value(&Value::make_big_int(1)),
            Err(QuiverError::Type(_))
        ));
        assert!(matches!(v.get_value(0), Err(QuiverError::Type(_))));
        assert_eq!(v.capacity(), 0);
    }

    #[test]
    fn metadata_is_frozen_after_initialize() {
        let mut v = ColumnVector::new(DataType::integer());
        v.set_data_type(DataType::double()).unwrap();
        v.initialize().unwrap();
        assert!(matches!(
            v.set_data_type(DataType::integer()),
            Err(QuiverError::Type(_))
        ));
        assert!(matches!(
            v.set_vector_type(ColumnVectorType::Constant),
            Err(QuiverError::Type(_))
        ));
        assert!(matches!(v.initialize(), Err(QuiverError::Type(_))));
    }

    #[test]
    fn constant_vector_broadcasts() {
        let v = ColumnVector::constant(&Value::make_double(2.5)).unwrap();
        assert_eq!(v.value_at(100).unwrap(), Value::make_double(2.5));
        assert_eq!(v.capacity(), 1);
    }

    #[test]
    fn reserve_preserves_contents() {
        let mut v = ColumnVector::new(DataType::bigint());
        v.initialize_with(2, ColumnVectorType::Flat).unwrap();
        v.append_value(&Value::make_big_int(-1)).unwrap();
        v.append_value(&Value::null(DataType::bigint())).unwrap();
        v.reserve(1).unwrap();
        assert_eq!(v.capacity(), 2);
        v.reserve(100).unwrap();
        assert_eq!(v.capacity(), 100);
        assert_eq!(v.get_value(0).unwrap(), Value::make_big_int(-1));
        assert!(v.get_value(1).unwrap().is_null());
        v.append_value(&Value::make_big_int(3)).unwrap();
        assert_eq!(v.size(), 3);
    }

    #[test]
    fn resource_usage_tracks_storage_lifetime() {
        let usage = ResourceUsage::new();
        {
            let mut v = ColumnVector::with_usage(DataType::varchar(), usage.clone());
            v.initialize_with(8, ColumnVectorType::Flat).unwrap();
            v.append_value(&Value::make_varchar("a string longer than twelve"))
                .unwrap();
            assert_eq!(usage.object_count(), 1);
            assert!(usage.raw_memory_count() >= 8 * 16 + 27);
            let copy = v.clone();
            v.reset();
            assert_eq!(usage.object_count(), 1);
            drop(copy);
        }
        assert_eq!(usage.object_count(), 0);
        assert_eq!(usage.raw_memory_count(), 0);
    }
}
