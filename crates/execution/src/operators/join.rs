//! Join operators. The build side of a hash join and the inner side of a
//! nested-loop join run in their own stages; the probe/outer side streams.

use std::collections::HashMap;
use std::sync::Arc;

use quiver_common::{QuiverError, Result};
use quiver_planner::JoinType;
use quiver_vector::{ColumnVector, DataBlock, DataType, Value};

use super::{block_from_rows, blocks_from_rows, Operator, Sink, StageOutput};
use crate::expressions::{selected_rows, PhysicalExpr};

/// Build-side rows keyed by their join key values. Rows with a NULL key
/// never match and are left out.
#[derive(Debug, Default)]
pub struct JoinHashTable {
    entries: HashMap<Vec<Value>, Vec<Vec<Value>>>,
    rows: usize,
}

impl JoinHashTable {
    pub fn get(&self, key: &[Value]) -> Option<&[Vec<Value>]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Number of build rows held.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    fn insert(&mut self, key: Vec<Value>, row: Vec<Value>) {
        self.entries.entry(key).or_default().push(row);
        self.rows += 1;
    }
}

fn key_at(keys: &[ColumnVector], row: usize) -> Result<Option<Vec<Value>>> {
    let mut key = Vec::with_capacity(keys.len());
    for k in keys {
        let v = k.value_at(row)?;
        if v.is_null() {
            return Ok(None);
        }
        key.push(v);
    }
    Ok(Some(key))
}

fn evaluate_keys(
    keys: &[Arc<dyn PhysicalExpr>],
    block: &DataBlock,
) -> Result<Vec<ColumnVector>> {
    keys.iter().map(|k| k.evaluate(block)).collect()
}

pub struct HashBuildSink {
    keys: Vec<Arc<dyn PhysicalExpr>>,
    table: JoinHashTable,
}

impl HashBuildSink {
    pub fn new(keys: Vec<Arc<dyn PhysicalExpr>>) -> Self {
        Self {
            keys,
            table: JoinHashTable::default(),
        }
    }
}

impl Sink for HashBuildSink {
    fn name(&self) -> &'static str {
        "HashJoinBuild"
    }

    fn consume(&mut self, block: DataBlock) -> Result<()> {
        let keys = evaluate_keys(&self.keys, &block)?;
        for row in 0..block.row_count() {
            if let Some(key) = key_at(&keys, row)? {
                self.table.insert(key, block.row(row)?);
            }
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<StageOutput> {
        Ok(StageOutput::HashTable(Arc::new(self.table)))
    }
}

/// Candidate output rows tagged with the probe row they came from.
type Candidates = Vec<(usize, Vec<Value>)>;

/// Drops candidates whose condition is not TRUE, keeping their order.
fn apply_condition(
    condition: Option<&Arc<dyn PhysicalExpr>>,
    candidates: Candidates,
    types: &[DataType],
    batch_rows: usize,
) -> Result<Candidates> {
    let Some(condition) = condition else {
        return Ok(candidates);
    };
    let mut kept = Vec::new();
    for chunk in candidates.chunks(batch_rows.max(1)) {
        let rows: Vec<Vec<Value>> = chunk.iter().map(|(_, r)| r.clone()).collect();
        let block = block_from_rows(types, &rows)?;
        for i in selected_rows(condition.as_ref(), &block)? {
            kept.push(chunk[i].clone());
        }
    }
    Ok(kept)
}

/// Emits matched rows in probe order; for LEFT joins, probe rows without a
/// match are padded with NULLs on the right.
fn emit_rows(
    block: &DataBlock,
    matched: Candidates,
    left_outer: bool,
    right_types: &[DataType],
) -> Result<Vec<Vec<Value>>> {
    let mut out = Vec::with_capacity(matched.len());
    let mut matched = matched.into_iter().peekable();
    for row in 0..block.row_count() {
        let mut any = false;
        while let Some((_, values)) = matched.next_if(|(r, _)| *r == row) {
            out.push(values);
            any = true;
        }
        if !any && left_outer {
            let mut values = block.row(row)?;
            values.extend(right_types.iter().map(|t| Value::null(t.clone())));
            out.push(values);
        }
    }
    Ok(out)
}

fn check_join_type(join_type: JoinType) -> Result<bool> {
    match join_type {
        JoinType::Inner | JoinType::Cross => Ok(false),
        JoinType::Left => Ok(true),
        JoinType::Full => Err(QuiverError::Executor(
            "FULL OUTER JOIN is not supported".to_string(),
        )),
    }
}

/// Probes the build-side hash table with each input row.
pub struct HashProbeOperator {
    table: Arc<JoinHashTable>,
    join_type: JoinType,
    left_keys: Vec<Arc<dyn PhysicalExpr>>,
    residual: Option<Arc<dyn PhysicalExpr>>,
    right_types: Vec<DataType>,
    out_types: Vec<DataType>,
    batch_rows: usize,
}

impl HashProbeOperator {
    pub fn new(
        table: Arc<JoinHashTable>,
        join_type: JoinType,
        left_keys: Vec<Arc<dyn PhysicalExpr>>,
        residual: Option<Arc<dyn PhysicalExpr>>,
        right_types: Vec<DataType>,
        out_types: Vec<DataType>,
        batch_rows: usize,
    ) -> Self {
        Self {
            table,
            join_type,
            left_keys,
            residual,
            right_types,
            out_types,
            batch_rows,
        }
    }
}

impl Operator for HashProbeOperator {
    fn name(&self) -> &'static str {
        "HashJoinProbe"
    }

    fn execute(&mut self, block: DataBlock) -> Result<Vec<DataBlock>> {
        let left_outer = check_join_type(self.join_type)?;
        let keys = evaluate_keys(&self.left_keys, &block)?;
        let mut candidates = Vec::new();
        for row in 0..block.row_count() {
            let Some(key) = key_at(&keys, row)? else {
                continue;
            };
            let Some(matches) = self.table.get(&key) else {
                continue;
            };
            let left = block.row(row)?;
            for right in matches {
                let mut values = left.clone();
                values.extend(right.iter().cloned());
                candidates.push((row, values));
            }
        }
        let matched = apply_condition(
            self.residual.as_ref(),
            candidates,
            &self.out_types,
            self.batch_rows,
        )?;
        let rows = emit_rows(&block, matched, left_outer, &self.right_types)?;
        blocks_from_rows(&self.out_types, rows, self.batch_rows)
    }
}

/// Pairs each input row with every materialized inner row.
pub struct NestedLoopOperator {
    inner: Vec<Vec<Value>>,
    join_type: JoinType,
    condition: Option<Arc<dyn PhysicalExpr>>,
    right_types: Vec<DataType>,
    out_types: Vec<DataType>,
    batch_rows: usize,
}

impl NestedLoopOperator {
    pub fn new(
        inner: Vec<Vec<Value>>,
        join_type: JoinType,
        condition: Option<Arc<dyn PhysicalExpr>>,
        right_types: Vec<DataType>,
        out_types: Vec<DataType>,
        batch_rows: usize,
    ) -> Self {
        Self {
            inner,
            join_type,
            condition,
            right_types,
            out_types,
            batch_rows,
        }
    }
}

impl Operator for NestedLoopOperator {
    fn name(&self) -> &'static str {
        "NestedLoopJoin"
    }

    fn execute(&mut self, block: DataBlock) -> Result<Vec<DataBlock>> {
        let left_outer = check_join_type(self.join_type)?;
        let mut candidates = Vec::with_capacity(block.row_count() * self.inner.len());
        for row in 0..block.row_count() {
            let left = block.row(row)?;
            for right in &self.inner {
                let mut values = left.clone();
                values.extend(right.iter().cloned());
                candidates.push((row, values));
            }
        }
        let matched = apply_condition(
            self.condition.as_ref(),
            candidates,
            &self.out_types,
            self.batch_rows,
        )?;
        let rows = emit_rows(&block, matched, left_outer, &self.right_types)?;
        blocks_from_rows(&self.out_types, rows, self.batch_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::{HashBuildSink, HashProbeOperator, NestedLoopOperator};
    use crate::expressions::compile_expr;
    use crate::operators::{Operator, Sink, StageOutput};
    use crate::udf::FunctionRegistry;
    use quiver_common::QuiverError;
    use quiver_planner::{BinaryOp, Expr, JoinType};
    use quiver_vector::{DataBlock, DataType, Value};

    fn col(index: usize, data_type: DataType) -> Expr {
        Expr::ColumnRef {
            name: format!("c{index}"),
            index,
            data_type,
        }
    }

    fn left_block() -> DataBlock {
        DataBlock::from_rows(
            &[DataType::integer(), DataType::varchar()],
            &[
                vec![Value::make_int(1), Value::make_varchar("a")],
                vec![Value::make_int(2), Value::make_varchar("b")],
                vec![Value::null(DataType::integer()), Value::make_varchar("n")],
                vec![Value::make_int(1), Value::make_varchar("c")],
            ],
        )
        .unwrap()
    }

    fn right_block() -> DataBlock {
        DataBlock::from_rows(
            &[DataType::integer(), DataType::integer()],
            &[
                vec![Value::make_int(1), Value::make_int(10)],
                vec![Value::make_int(1), Value::make_int(11)],
                vec![Value::make_int(3), Value::make_int(30)],
                vec![Value::null(DataType::integer()), Value::make_int(99)],
            ],
        )
        .unwrap()
    }

    fn out_types() -> Vec<DataType> {
        vec![
            DataType::integer(),
            DataType::varchar(),
            DataType::integer(),
            DataType::integer(),
        ]
    }

    fn probe(join_type: JoinType, residual: Option<Expr>) -> HashProbeOperator {
        let registry = FunctionRegistry::new();
        let mut build = Box::new(HashBuildSink::new(vec![compile_expr(
            &col(0, DataType::integer()),
            &[DataType::integer(), DataType::integer()],
            &registry,
        )
        .unwrap()]));
        build.consume(right_block()).unwrap();
        let StageOutput::HashTable(table) = build.finalize().unwrap() else {
            panic!("expected a hash table");
        };
        assert_eq!(table.row_count(), 3);
        let residual = residual.map(|r| compile_expr(&r, &out_types(), &registry).unwrap());
        HashProbeOperator::new(
            table,
            join_type,
            vec![compile_expr(
                &col(0, DataType::integer()),
                &[DataType::integer(), DataType::varchar()],
                &registry,
            )
            .unwrap()],
            residual,
            vec![DataType::integer(), DataType::integer()],
            out_types(),
            1024,
        )
    }

    fn rendered(blocks: Vec<DataBlock>) -> String {
        blocks.iter().map(|b| b.to_string()).collect()
    }

    #[test]
    fn inner_hash_join_skips_null_keys() {
        let mut op = probe(JoinType::Inner, None);
        assert_eq!(
            rendered(op.execute(left_block()).unwrap()),
            "1 a 1 10\n1 a 1 11\n1 c 1 10\n1 c 1 11\n"
        );
    }

    #[test]
    fn left_hash_join_pads_unmatched_rows() {
        let residual = Expr::BinaryOp {
            left: Box::new(col(3, DataType::integer())),
            op: BinaryOp::Gt,
            right: Box::new(Expr::Literal(Value::make_int(10))),
        };
        let mut op = probe(JoinType::Left, Some(residual));
        assert_eq!(
            rendered(op.execute(left_block()).unwrap()),
            "1 a 1 11\n2 b NULL NULL\nNULL n NULL NULL\n1 c 1 11\n"
        );
    }

    #[test]
    fn full_join_is_rejected_at_runtime() {
        let mut op = probe(JoinType::Full, None);
        assert!(matches!(
            op.execute(left_block()),
            Err(QuiverError::Executor(_))
        ));
    }

    #[test]
    fn nested_loop_cross_and_conditional() {
        let inner = right_block().rows().unwrap()[..2].to_vec();
        let mut cross = NestedLoopOperator::new(
            inner.clone(),
            JoinType::Cross,
            None,
            vec![DataType::integer(), DataType::integer()],
            out_types(),
            3,
        );
        let blocks = cross.execute(left_block()).unwrap();
        assert_eq!(blocks.iter().map(|b| b.row_count()).sum::<usize>(), 8);
        assert!(blocks.iter().all(|b| b.row_count() <= 3));

        let registry = FunctionRegistry::new();
        let condition = Expr::BinaryOp {
            left: Box::new(col(0, DataType::integer())),
            op: BinaryOp::Lt,
            right: Box::new(col(3, DataType::integer())),
        };
        let mut left = NestedLoopOperator::new(
            inner,
            JoinType::Left,
            Some(compile_expr(&condition, &out_types(), &registry).unwrap()),
            vec![DataType::integer(), DataType::integer()],
            out_types(),
            1024,
        );
        let block = DataBlock::from_rows(
            &[DataType::integer(), DataType::varchar()],
            &[
                vec![Value::make_int(10), Value::make_varchar("x")],
                vec![Value::make_int(50), Value::make_varchar("y")],
            ],
        )
        .unwrap();
        assert_eq!(
            rendered(left.execute(block).unwrap()),
            "10 x 1 11\n50 y NULL NULL\n"
        );
    }
}
