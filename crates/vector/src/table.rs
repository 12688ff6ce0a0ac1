use quiver_common::{QuiverError, Result};

use crate::data_block::DataBlock;
use crate::types::Schema;
use crate::value::Value;

/// Materialized query output: a schema plus the blocks produced by the sink.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    schema: Schema,
    blocks: Vec<DataBlock>,
}

impl ResultTable {
    pub fn new(schema: Schema, blocks: Vec<DataBlock>) -> Self {
        Self { schema, blocks }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    pub fn column_name(&self, i: usize) -> Result<&str> {
        self.schema
            .field(i)
            .map(|f| f.name.as_str())
            .ok_or_else(|| {
                QuiverError::Executor(format!(
                    "column index {i} out of range for result with {} columns",
                    self.schema.len()
                ))
            })
    }

    pub fn data_block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn data_block(&self, i: usize) -> Result<&DataBlock> {
        self.blocks.get(i).ok_or_else(|| {
            QuiverError::Executor(format!(
                "data block index {i} out of range for result with {} blocks",
                self.blocks.len()
            ))
        })
    }

    pub fn blocks(&self) -> &[DataBlock] {
        &self.blocks
    }

    pub fn row_count(&self) -> usize {
        self.blocks.iter().map(DataBlock::row_count).sum()
    }

    /// All rows in block order.
    pub fn rows(&self) -> Result<Vec<Vec<Value>>> {
        let mut out = Vec::with_capacity(self.row_count());
        for b in &self.blocks {
            out.extend(b.rows()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::ResultTable;
    use crate::data_block::DataBlock;
    use crate::types::{DataType, Field, Schema};
    use crate::value::Value;
    use quiver_common::QuiverError;

    #[test]
    fn out_of_range_access_is_executor_error() {
        let schema = Schema::new(vec![Field::new("a", DataType::integer())]);
        let block = DataBlock::from_rows(&schema.data_types(), &[vec![Value::make_int(1)]]).unwrap();
        let t = ResultTable::new(schema, vec![block]);
        assert_eq!(t.column_name(0).unwrap(), "a");
        assert_eq!(t.data_block_count(), 1);
        assert!(matches!(t.column_name(1), Err(QuiverError::Executor(_))));
        assert!(matches!(t.data_block(1), Err(QuiverError::Executor(_))));
    }
}
