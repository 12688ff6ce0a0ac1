use std::fmt;

use quiver_common::{QuiverError, Result};

use crate::column_vector::{ColumnVector, ColumnVectorType};
use crate::types::DataType;
use crate::value::Value;

/// One batch of rows stored column-wise.
///
/// Every flat column holds exactly `row_count` values; constant columns hold
/// one value that stands for all rows.
#[derive(Debug, Clone, Default)]
pub struct DataBlock {
    columns: Vec<ColumnVector>,
    row_count: usize,
}

impl DataBlock {
    pub fn new(columns: Vec<ColumnVector>, row_count: usize) -> Result<Self> {
        for (i, c) in columns.iter().enumerate() {
            let expected = match c.vector_type() {
                ColumnVectorType::Flat => row_count,
                ColumnVectorType::Constant => 1,
            };
            if c.size() != expected {
                return Err(QuiverError::Storage(format!(
                    "column {i} has {} values, block expects {expected}",
                    c.size()
                )));
            }
        }
        Ok(Self { columns, row_count })
    }

    /// Block without columns that still carries a row count, e.g. the
    /// single row produced by a FROM-less SELECT.
    pub fn empty_with_rows(row_count: usize) -> Self {
        Self {
            columns: Vec::new(),
            row_count,
        }
    }

    /// Empty block with initialized flat columns ready for [`DataBlock::append_row`].
    pub fn with_types(types: &[DataType], capacity: usize) -> Result<Self> {
        let columns = types
            .iter()
            .map(|t| {
                let mut c = ColumnVector::new(t.clone());
                c.initialize_with(capacity.max(1), ColumnVectorType::Flat)?;
                Ok(c)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns,
            row_count: 0,
        })
    }

    /// Builds a block from row-major values.
    pub fn from_rows(types: &[DataType], rows: &[Vec<Value>]) -> Result<Self> {
        let mut block = Self::with_types(types, rows.len())?;
        for row in rows {
            block.append_row(row)?;
        }
        Ok(block)
    }

    pub fn append_row(&mut self, row: &[Value]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(QuiverError::Storage(format!(
                "row has {} values, block has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        for (c, v) in self.columns.iter_mut().zip(row) {
            c.append_value(v)?;
        }
        self.row_count += 1;
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn column(&self, i: usize) -> Option<&ColumnVector> {
        self.columns.get(i)
    }

    pub fn columns(&self) -> &[ColumnVector] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<ColumnVector> {
        self.columns
    }

    pub fn value(&self, column: usize, row: usize) -> Result<Value> {
        let c = self.columns.get(column).ok_or_else(|| {
            QuiverError::Storage(format!(
                "column {column} out of range for block with {} columns",
                self.columns.len()
            ))
        })?;
        c.value_at(row)
    }

    pub fn row(&self, row: usize) -> Result<Vec<Value>> {
        self.columns.iter().map(|c| c.value_at(row)).collect()
    }

    pub fn rows(&self) -> Result<Vec<Vec<Value>>> {
        (0..self.row_count).map(|r| self.row(r)).collect()
    }
}

/// One line per row, values separated by a single space.
impl fmt::Display for DataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.row_count {
            let mut first = true;
            for c in &self.columns {
                if !first {
                    f.write_str(" ")?;
                }
                first = false;
                match c.value_at(r) {
                    Ok(v) => write!(f, "{v}")?,
                    Err(_) => f.write_str("?")?,
                }
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DataBlock;
    use crate::column_vector::ColumnVector;
    use crate::types::DataType;
    use crate::value::Value;
    use quiver_common::QuiverError;

    #[test]
    fn renders_rows() {
        let block = DataBlock::from_rows(
            &[DataType::integer(), DataType::varchar()],
            &[
                vec![Value::make_int(1), Value::make_varchar("a")],
                vec![Value::make_int(2), Value::null(DataType::varchar())],
            ],
        )
        .unwrap();
        assert_eq!(block.row_count(), 2);
        assert_eq!(block.to_string(), "1 a\n2 NULL\n");
    }

    #[test]
    fn constant_columns_broadcast() {
        let flat =
            ColumnVector::from_values(DataType::integer(), &[Value::make_int(1), Value::make_int(2)])
                .unwrap();
        let c = ColumnVector::constant(&Value::make_varchar("x")).unwrap();
        let block = DataBlock::new(vec![flat, c], 2).unwrap();
        assert_eq!(block.to_string(), "1 x\n2 x\n");
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let a = ColumnVector::from_values(DataType::integer(), &[Value::make_int(1)]).unwrap();
        assert!(matches!(DataBlock::new(vec![a], 2), Err(QuiverError::Storage(_))));
        let mut b = DataBlock::with_types(&[DataType::integer()], 4).unwrap();
        assert!(matches!(b.append_row(&[]), Err(QuiverError::Storage(_))));
    }
}
