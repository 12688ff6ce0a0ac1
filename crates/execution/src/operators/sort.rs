use std::cmp::Ordering;
use std::sync::Arc;

use quiver_common::Result;
use quiver_vector::{DataBlock, DataType, Value};

use super::{blocks_from_rows, Sink, StageOutput};
use crate::expressions::PhysicalExpr;

/// Compiled ORDER BY key: expression, ascending, nulls first.
pub type SortKeyExpr = (Arc<dyn PhysicalExpr>, bool, bool);

/// Materializes its input and emits it in key order. The sort is stable, so
/// rows with equal keys keep their arrival order.
pub struct SortSink {
    keys: Vec<SortKeyExpr>,
    types: Vec<DataType>,
    batch_rows: usize,
    rows: Vec<(Vec<Value>, Vec<Value>)>,
}

impl SortSink {
    pub fn new(keys: Vec<SortKeyExpr>, types: Vec<DataType>, batch_rows: usize) -> Self {
        Self {
            keys,
            types,
            batch_rows,
            rows: Vec::new(),
        }
    }
}

fn compare_keys(a: &[Value], b: &[Value], keys: &[SortKeyExpr]) -> Ordering {
    for ((x, y), (_, ascending, nulls_first)) in a.iter().zip(b).zip(keys) {
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if *nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if *nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if *ascending => x.sort_cmp(y),
            (false, false) => x.sort_cmp(y).reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl Sink for SortSink {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn consume(&mut self, block: DataBlock) -> Result<()> {
        let keys = self
            .keys
            .iter()
            .map(|(e, _, _)| e.evaluate(&block))
            .collect::<Result<Vec<_>>>()?;
        for row in 0..block.row_count() {
            let key = keys
                .iter()
                .map(|k| k.value_at(row))
                .collect::<Result<Vec<_>>>()?;
            self.rows.push((key, block.row(row)?));
        }
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<StageOutput> {
        let keys = std::mem::take(&mut self.keys);
        let mut rows = std::mem::take(&mut self.rows);
        rows.sort_by(|a, b| compare_keys(&a.0, &b.0, &keys));
        let rows = rows.into_iter().map(|(_, row)| row).collect();
        Ok(StageOutput::Blocks(blocks_from_rows(
            &self.types,
            rows,
            self.batch_rows,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::SortSink;
    use crate::expressions::compile_expr;
    use crate::operators::{Sink, StageOutput};
    use crate::udf::FunctionRegistry;
    use quiver_planner::Expr;
    use quiver_vector::{DataBlock, DataType, Value};

    fn types() -> Vec<DataType> {
        vec![DataType::integer(), DataType::varchar()]
    }

    fn key(index: usize, ascending: bool, nulls_first: bool) -> super::SortKeyExpr {
        let expr = Expr::ColumnRef {
            name: format!("c{index}"),
            index,
            data_type: types()[index].clone(),
        };
        (
            compile_expr(&expr, &types(), &FunctionRegistry::new()).unwrap(),
            ascending,
            nulls_first,
        )
    }

    fn input() -> DataBlock {
        DataBlock::from_rows(
            &types(),
            &[
                vec![Value::make_int(2), Value::make_varchar("x")],
                vec![Value::null(DataType::integer()), Value::make_varchar("n")],
                vec![Value::make_int(1), Value::make_varchar("y")],
                vec![Value::make_int(2), Value::make_varchar("a")],
            ],
        )
        .unwrap()
    }

    fn sorted(keys: Vec<super::SortKeyExpr>, batch_rows: usize) -> Vec<DataBlock> {
        let mut sink = Box::new(SortSink::new(keys, types(), batch_rows));
        sink.consume(input()).unwrap();
        match sink.finalize().unwrap() {
            StageOutput::Blocks(blocks) => blocks,
            StageOutput::HashTable(_) => panic!("expected blocks"),
        }
    }

    fn rendered(blocks: &[DataBlock]) -> String {
        blocks.iter().map(|b| b.to_string()).collect()
    }

    #[test]
    fn ascending_is_stable_with_nulls_last() {
        let blocks = sorted(vec![key(0, true, false)], 1024);
        assert_eq!(rendered(&blocks), "1 y\n2 x\n2 a\nNULL n\n");
    }

    #[test]
    fn descending_nulls_first_then_second_key() {
        let blocks = sorted(vec![key(0, false, true), key(1, true, false)], 2);
        assert_eq!(blocks.len(), 2);
        assert_eq!(rendered(&blocks), "NULL n\n2 a\n2 x\n1 y\n");
    }
}
