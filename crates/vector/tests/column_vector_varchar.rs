use quiver_common::QuiverError;
use quiver_vector::{
    ColumnVector, ColumnVectorType, DataType, Value, VarcharInfo, VectorBufferType,
    DEFAULT_VECTOR_SIZE, VARLEN_INLINE_LENGTH,
};

fn varchar_type() -> DataType {
    DataType::varchar_with(VarcharInfo::new(65))
}

fn short_value(i: usize) -> Value {
    Value::make_varchar(&format!("Fake{i}"))
}

fn long_value(i: usize) -> Value {
    Value::make_varchar(&format!("ThisIsAVeryLongFakeString{i}"))
}

#[test]
fn flat_inline() {
    let mut v = ColumnVector::new(varchar_type());
    v.initialize().unwrap();
    assert_eq!(v.capacity(), DEFAULT_VECTOR_SIZE);
    assert_eq!(v.tail_index(), 0);
    assert_eq!(v.buffer_type(), Some(VectorBufferType::Heap));
    assert_eq!(v.vector_type(), ColumnVectorType::Flat);
    assert_eq!(v.data_type(), &varchar_type());

    for i in 0..DEFAULT_VECTOR_SIZE {
        v.append_value(&short_value(i)).unwrap();
    }
    assert!(matches!(
        v.append_value(&short_value(0)),
        Err(QuiverError::Storage(_))
    ));
    for i in 0..DEFAULT_VECTOR_SIZE {
        let got = v.get_value(i).unwrap();
        assert!(got.as_varlen().unwrap().is_inlined());
        assert_eq!(got, short_value(i));
        assert_eq!(got.data_type(), &varchar_type());
    }
    assert_eq!(v.heap_size(), 0);
    assert!(matches!(
        v.get_value(DEFAULT_VECTOR_SIZE),
        Err(QuiverError::Type(_))
    ));
}

#[test]
fn flat_heap() {
    let mut v = ColumnVector::new(varchar_type());
    v.initialize().unwrap();
    for i in 0..DEFAULT_VECTOR_SIZE {
        v.append_value(&long_value(i)).unwrap();
    }
    assert!(v.heap_size() > 0);
    for i in 0..DEFAULT_VECTOR_SIZE {
        let got = v.get_value(i).unwrap();
        let varlen = got.as_varlen().unwrap();
        assert!(!varlen.is_inlined());
        assert!(varlen.len() > VARLEN_INLINE_LENGTH);
        assert_eq!(got.as_str(), long_value(i).as_str());
    }
}

#[test]
fn mixed_lengths_keep_exact_bytes() {
    let mut v = ColumnVector::new(DataType::blob());
    v.initialize_with(3, ColumnVectorType::Flat).unwrap();
    let payloads: [&[u8]; 3] = [b"", &[0u8; 12], &[7u8; 13]];
    for p in payloads {
        v.append_value(&Value::make_blob(p)).unwrap();
    }
    for (i, p) in payloads.iter().enumerate() {
        let got = v.get_value(i).unwrap();
        let varlen = got.as_varlen().unwrap();
        assert_eq!(varlen.as_bytes(), *p);
        assert_eq!(varlen.is_inlined(), p.len() <= VARLEN_INLINE_LENGTH);
    }
}

#[test]
fn reset_then_initialize_matches_fresh_vector() {
    let mut v = ColumnVector::new(varchar_type());
    v.initialize().unwrap();
    for i in 0..10 {
        v.append_value(&long_value(i)).unwrap();
    }
    v.reset();
    assert!(!v.is_initialized());
    assert_eq!(v.capacity(), 0);
    assert_eq!(v.tail_index(), 0);
    assert!(matches!(v.get_value(0), Err(QuiverError::Type(_))));

    v.initialize().unwrap();
    let mut fresh = ColumnVector::new(varchar_type());
    fresh.initialize().unwrap();
    assert_eq!(v.capacity(), fresh.capacity());
    assert_eq!(v.tail_index(), 0);
    assert_eq!(v.data_type(), fresh.data_type());
    assert_eq!(v.vector_type(), fresh.vector_type());
    assert_eq!(v.heap_size(), 0);

    v.append_value(&short_value(3)).unwrap();
    assert_eq!(v.get_value(0).unwrap(), short_value(3));
}

#[test]
fn reset_twice_is_harmless() {
    let mut v = ColumnVector::new(varchar_type());
    v.reset();
    v.initialize().unwrap();
    v.reset();
    v.reset();
    assert_eq!(v.capacity(), 0);
}

#[test]
fn reserve_keeps_heap_values() {
    let mut v = ColumnVector::new(varchar_type());
    v.initialize_with(16, ColumnVectorType::Flat).unwrap();
    for i in 0..16 {
        let value = if i % 2 == 0 { short_value(i) } else { long_value(i) };
        v.append_value(&value).unwrap();
    }
    let heap_before = v.heap_size();
    v.reserve(8).unwrap();
    assert_eq!(v.capacity(), 16);
    v.reserve(64).unwrap();
    assert_eq!(v.capacity(), 64);
    assert_eq!(v.heap_size(), heap_before);
    for i in 0..16 {
        let expected = if i % 2 == 0 { short_value(i) } else { long_value(i) };
        assert_eq!(v.get_value(i).unwrap(), expected);
    }
    for i in 16..64 {
        v.append_value(&long_value(i)).unwrap();
    }
    assert_eq!(v.tail_index(), 64);
}

#[test]
fn constant_vector_rules() {
    let mut v = ColumnVector::new(varchar_type());
    v.initialize_with(1, ColumnVectorType::Constant).unwrap();
    v.append_value(&long_value(0)).unwrap();
    assert!(matches!(
        v.append_value(&long_value(1)),
        Err(QuiverError::Storage(_))
    ));
    assert!(matches!(v.reserve(2), Err(QuiverError::Storage(_))));
    assert!(matches!(
        v.reserve(DEFAULT_VECTOR_SIZE),
        Err(QuiverError::Storage(_))
    ));
    assert_eq!(v.get_value(0).unwrap(), long_value(0));
    assert!(matches!(v.get_value(1), Err(QuiverError::Type(_))));
}

#[test]
fn shallow_copy_shares_storage() {
    let mut a = ColumnVector::new(varchar_type());
    a.initialize().unwrap();
    for i in 0..100 {
        a.append_value(&long_value(i)).unwrap();
    }

    let mut b = ColumnVector::new(DataType::integer());
    b.shallow_copy(&a);
    assert_eq!(b.tail_index(), a.tail_index());
    assert_eq!(b.capacity(), a.capacity());
    assert_eq!(b.data_type(), a.data_type());
    assert_eq!(b.data_ptr(), a.data_ptr());
    assert!(b.shares_storage_with(&a));
    for i in 0..100 {
        assert_eq!(a.get_value(i).unwrap(), b.get_value(i).unwrap());
    }

    // Writes through either handle are visible through the other.
    b.append_value(&short_value(100)).unwrap();
    assert_eq!(a.tail_index(), 101);
    assert_eq!(a.get_value(100).unwrap(), short_value(100));

    // The storage outlives the source handle.
    a.reset();
    assert_eq!(b.get_value(5).unwrap(), long_value(5));
}
