use std::fmt;

use quiver_common::Result;
use quiver_planner::LogicalNodeType;
use quiver_vector::{ResultTable, Value};

/// Output of one statement, tagged with the kind of its root operator.
#[derive(Debug, Clone)]
pub struct QueryResult {
    kind: LogicalNodeType,
    table: ResultTable,
}

impl QueryResult {
    pub fn new(kind: LogicalNodeType, table: ResultTable) -> Self {
        Self { kind, table }
    }

    pub fn kind(&self) -> LogicalNodeType {
        self.kind
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }

    pub fn into_table(self) -> ResultTable {
        self.table
    }

    /// All rows, row-major.
    pub fn rows(&self) -> Result<Vec<Vec<Value>>> {
        self.table.rows()
    }

    /// Affected-row count reported by INSERT, UPDATE and DELETE.
    pub fn affected_rows(&self) -> Option<u64> {
        match self.kind {
            LogicalNodeType::Insert | LogicalNodeType::Update | LogicalNodeType::Delete => self
                .table
                .blocks()
                .first()
                .and_then(|b| b.value(0, 0).ok())
                .and_then(|v| v.as_i64())
                .and_then(|n| u64::try_from(n).ok()),
            _ => None,
        }
    }
}

/// Writers render a fixed acknowledgement; everything else renders a header
/// of column names followed by the rows of each block.
impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LogicalNodeType::Insert => f.write_str("INSERT 0 1"),
            LogicalNodeType::Update => f.write_str("UPDATE 0 1"),
            LogicalNodeType::Delete => f.write_str("DELETE 0 1"),
            LogicalNodeType::CreateTable => f.write_str("CREATE TABLE"),
            _ => {
                writeln!(f, "{}", self.table.schema().names().join(" "))?;
                for block in self.table.blocks() {
                    write!(f, "{block}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QueryResult;
    use quiver_planner::LogicalNodeType;
    use quiver_vector::{DataBlock, DataType, Field, ResultTable, Schema, Value};

    fn count_table(n: i64) -> ResultTable {
        let schema = Schema::new(vec![Field::new("count", DataType::bigint())]);
        let block =
            DataBlock::from_rows(&schema.data_types(), &[vec![Value::make_big_int(n)]]).unwrap();
        ResultTable::new(schema, vec![block])
    }

    #[test]
    fn writers_render_fixed_acknowledgements() {
        let insert = QueryResult::new(LogicalNodeType::Insert, count_table(3));
        assert_eq!(insert.to_string(), "INSERT 0 1");
        assert_eq!(insert.affected_rows(), Some(3));
        assert_eq!(
            QueryResult::new(LogicalNodeType::Update, count_table(0)).to_string(),
            "UPDATE 0 1"
        );
        assert_eq!(
            QueryResult::new(LogicalNodeType::Delete, count_table(2)).to_string(),
            "DELETE 0 1"
        );
        let create = QueryResult::new(LogicalNodeType::CreateTable, count_table(0));
        assert_eq!(create.to_string(), "CREATE TABLE");
        assert_eq!(create.affected_rows(), None);
    }

    #[test]
    fn reads_render_header_and_rows() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::integer()),
            Field::new("b", DataType::varchar()),
        ]);
        let types = schema.data_types();
        let blocks = vec![
            DataBlock::from_rows(&types, &[vec![Value::make_int(1), Value::make_varchar("x")]])
                .unwrap(),
            DataBlock::from_rows(&types, &[vec![Value::make_int(2), Value::null(DataType::varchar())]])
                .unwrap(),
        ];
        let result = QueryResult::new(LogicalNodeType::Projection, ResultTable::new(schema, blocks));
        assert_eq!(result.to_string(), "a b\n1 x\n2 NULL\n");
        assert_eq!(result.rows().unwrap().len(), 2);
    }
}
