//! Runtime operators instantiated from stage specs.
//!
//! A stage pulls blocks from its source, pushes each through its streaming
//! [`Operator`] chain, and hands the results to its [`Sink`]. Sinks
//! materialize a [`StageOutput`] that consumer stages read once the stage
//! has completed.

mod aggregate;
mod basic;
mod join;
mod sort;
mod writer;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use quiver_common::{QuiverError, Result, StageId};
use quiver_planner::Expr;
use quiver_vector::{DataBlock, DataType, Value};

use crate::context::QueryContext;
use crate::expressions::{compile_expr, selected_rows, vector_from_values, PhysicalExpr};
use crate::pipeline::{OperatorSpec, SinkSpec, SourceSpec};
use crate::udf::FunctionRegistry;

pub use aggregate::HashAggregateSink;
pub use basic::{FilterOperator, LimitOperator, ProjectOperator};
pub use join::{HashBuildSink, HashProbeOperator, JoinHashTable, NestedLoopOperator};
pub use sort::SortSink;
pub use writer::{CollectSink, CreateTableSink, DeleteSink, InsertSink, UpdateSink};

/// Streaming operator: one input block in, zero or more blocks out.
pub trait Operator: Send {
    fn name(&self) -> &'static str;

    fn execute(&mut self, block: DataBlock) -> Result<Vec<DataBlock>>;

    /// True once the operator will not emit anything for further input.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Stage terminal: consumes every block, then materializes the stage output.
pub trait Sink: Send {
    fn name(&self) -> &'static str;

    fn consume(&mut self, block: DataBlock) -> Result<()>;

    fn finalize(self: Box<Self>) -> Result<StageOutput>;
}

/// Materialized result of a completed stage.
#[derive(Debug)]
pub enum StageOutput {
    Blocks(Vec<DataBlock>),
    HashTable(Arc<JoinHashTable>),
}

/// Outputs of completed stages of one pipeline run.
#[derive(Debug, Default)]
pub struct StageOutputs {
    inner: Mutex<HashMap<StageId, StageOutput>>,
}

impl StageOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, stage: StageId, output: StageOutput) {
        self.inner.lock().insert(stage, output);
    }

    /// Blocks produced by `stage`. Blocks share vector storage with the
    /// stored output.
    pub fn blocks(&self, stage: StageId) -> Result<Vec<DataBlock>> {
        match self.inner.lock().get(&stage) {
            Some(StageOutput::Blocks(blocks)) => Ok(blocks.clone()),
            Some(StageOutput::HashTable(_)) => Err(QuiverError::Executor(format!(
                "stage {stage} produced a hash table, not blocks"
            ))),
            None => Err(missing(stage)),
        }
    }

    pub fn hash_table(&self, stage: StageId) -> Result<Arc<JoinHashTable>> {
        match self.inner.lock().get(&stage) {
            Some(StageOutput::HashTable(t)) => Ok(Arc::clone(t)),
            Some(StageOutput::Blocks(_)) => Err(QuiverError::Executor(format!(
                "stage {stage} produced blocks, not a hash table"
            ))),
            None => Err(missing(stage)),
        }
    }

    /// Removes and returns the blocks of `stage`.
    pub fn take_blocks(&self, stage: StageId) -> Result<Vec<DataBlock>> {
        match self.inner.lock().remove(&stage) {
            Some(StageOutput::Blocks(blocks)) => Ok(blocks),
            Some(StageOutput::HashTable(_)) => Err(QuiverError::Executor(format!(
                "stage {stage} produced a hash table, not blocks"
            ))),
            None => Err(missing(stage)),
        }
    }
}

fn missing(stage: StageId) -> QuiverError {
    QuiverError::Executor(format!("stage {stage} has no output yet"))
}

/// Reads every input block of a stage.
pub fn read_source(
    spec: &SourceSpec,
    ctx: &QueryContext,
    outputs: &StageOutputs,
) -> Result<Vec<DataBlock>> {
    match spec {
        SourceSpec::TableScan {
            table,
            projection,
            filters,
            types,
        } => {
            let def = ctx.table_def(table)?;
            let blocks = ctx.storage().scan(&def, Some(projection))?;
            if filters.is_empty() {
                return Ok(blocks);
            }
            let predicates = compile_all(filters, types, ctx.functions())?;
            let mut out = Vec::with_capacity(blocks.len());
            for mut block in blocks {
                for p in &predicates {
                    let rows = selected_rows(p.as_ref(), &block)?;
                    block = take_rows(&block, &rows)?;
                }
                if !block.is_empty() {
                    out.push(block);
                }
            }
            Ok(out)
        }
        SourceSpec::DummyScan => Ok(vec![DataBlock::empty_with_rows(1)]),
        SourceSpec::Values {
            rows,
            types,
            batch_rows,
        } => {
            let one = DataBlock::empty_with_rows(1);
            let values = rows
                .iter()
                .map(|row| -> Result<Vec<Value>> {
                    row.iter()
                        .map(|e| compile_expr(e, &[], ctx.functions())?.evaluate(&one)?.value_at(0))
                        .collect()
                })
                .collect::<Result<Vec<_>>>()?;
            blocks_from_rows(types, values, *batch_rows)
        }
        SourceSpec::StageOutput(stage) => outputs.blocks(*stage),
    }
}

/// Instantiates a streaming operator. Join operators pick up the output of
/// their build/inner stage, which must already be complete.
pub fn create_operator(
    spec: &OperatorSpec,
    ctx: &QueryContext,
    outputs: &StageOutputs,
) -> Result<Box<dyn Operator>> {
    let functions = ctx.functions();
    let batch_rows = ctx.config().vector_size;
    Ok(match spec {
        OperatorSpec::Filter {
            predicate,
            input_types,
        } => Box::new(FilterOperator::new(compile_expr(
            predicate,
            input_types,
            functions,
        )?)),
        OperatorSpec::Project { exprs, input_types } => {
            Box::new(ProjectOperator::new(compile_all(exprs, input_types, functions)?))
        }
        OperatorSpec::Limit { limit, offset } => Box::new(LimitOperator::new(*limit, *offset)),
        OperatorSpec::HashProbe {
            build,
            join_type,
            left_keys,
            residual,
            left_types,
            right_types,
        } => {
            let out_types = concat_types(left_types, right_types);
            let residual = residual
                .as_ref()
                .map(|r| compile_expr(r, &out_types, functions))
                .transpose()?;
            Box::new(HashProbeOperator::new(
                outputs.hash_table(*build)?,
                *join_type,
                compile_all(left_keys, left_types, functions)?,
                residual,
                right_types.clone(),
                out_types,
                batch_rows,
            ))
        }
        OperatorSpec::NestedLoop {
            inner,
            join_type,
            condition,
            left_types,
            right_types,
        } => {
            let out_types = concat_types(left_types, right_types);
            let condition = condition
                .as_ref()
                .map(|c| compile_expr(c, &out_types, functions))
                .transpose()?;
            let mut inner_rows = Vec::new();
            for block in outputs.blocks(*inner)? {
                inner_rows.extend(block.rows()?);
            }
            Box::new(NestedLoopOperator::new(
                inner_rows,
                *join_type,
                condition,
                right_types.clone(),
                out_types,
                batch_rows,
            ))
        }
    })
}

/// Instantiates a stage sink.
pub fn create_sink(spec: &SinkSpec, ctx: &QueryContext) -> Result<Box<dyn Sink>> {
    let functions = ctx.functions();
    let batch_rows = ctx.config().vector_size;
    Ok(match spec {
        SinkSpec::Collect => Box::new(CollectSink::new()),
        SinkSpec::HashBuild { keys, types } => {
            Box::new(HashBuildSink::new(compile_all(keys, types, functions)?))
        }
        SinkSpec::HashAggregate {
            groups,
            aggregates,
            input_types,
            output_types,
            batch_rows,
        } => {
            let args = aggregates
                .iter()
                .map(|a| {
                    a.arg
                        .as_ref()
                        .map(|e| compile_expr(e, input_types, functions))
                        .transpose()
                })
                .collect::<Result<Vec<_>>>()?;
            Box::new(HashAggregateSink::new(
                compile_all(groups, input_types, functions)?,
                aggregates.clone(),
                args,
                output_types.clone(),
                *batch_rows,
            ))
        }
        SinkSpec::Sort {
            keys,
            input_types,
            batch_rows,
        } => {
            let compiled = keys
                .iter()
                .map(|k| -> Result<_> {
                    Ok((
                        compile_expr(&k.expr, input_types, functions)?,
                        k.ascending,
                        k.nulls_first,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            Box::new(SortSink::new(compiled, input_types.clone(), *batch_rows))
        }
        SinkSpec::Insert {
            table,
            column_map,
            table_types,
        } => Box::new(InsertSink::new(
            ctx.table_def(table)?,
            Arc::clone(ctx.storage()),
            column_map.clone(),
            table_types.clone(),
        )),
        SinkSpec::Update {
            table,
            assignments,
            predicate,
            table_types,
        } => {
            let assignments = assignments
                .iter()
                .map(|(col, e)| -> Result<_> { Ok((*col, compile_expr(e, table_types, functions)?)) })
                .collect::<Result<Vec<_>>>()?;
            let predicate = predicate
                .as_ref()
                .map(|p| compile_expr(p, table_types, functions))
                .transpose()?;
            Box::new(UpdateSink::new(
                ctx.table_def(table)?,
                Arc::clone(ctx.storage()),
                assignments,
                predicate,
                table_types.clone(),
                batch_rows,
            ))
        }
        SinkSpec::Delete {
            table,
            predicate,
            table_types,
        } => {
            let predicate = predicate
                .as_ref()
                .map(|p| compile_expr(p, table_types, functions))
                .transpose()?;
            Box::new(DeleteSink::new(
                ctx.table_def(table)?,
                Arc::clone(ctx.storage()),
                predicate,
                table_types.clone(),
                batch_rows,
            ))
        }
        SinkSpec::CreateTable {
            table,
            schema,
            if_not_exists,
        } => Box::new(CreateTableSink::new(
            Arc::clone(ctx.catalog()),
            Arc::clone(ctx.storage()),
            table.clone(),
            schema.clone(),
            *if_not_exists,
        )),
    })
}

fn compile_all(
    exprs: &[Expr],
    input_types: &[DataType],
    functions: &FunctionRegistry,
) -> Result<Vec<Arc<dyn PhysicalExpr>>> {
    exprs
        .iter()
        .map(|e| compile_expr(e, input_types, functions))
        .collect()
}

fn concat_types(left: &[DataType], right: &[DataType]) -> Vec<DataType> {
    left.iter().chain(right).cloned().collect()
}

/// Block holding `rows` of `block`, in the given order.
pub fn take_rows(block: &DataBlock, rows: &[usize]) -> Result<DataBlock> {
    if rows.len() == block.row_count() && rows.iter().enumerate().all(|(i, r)| i == *r) {
        return Ok(block.clone());
    }
    if block.column_count() == 0 {
        return Ok(DataBlock::empty_with_rows(rows.len()));
    }
    let columns = block
        .columns()
        .iter()
        .map(|c| {
            if c.is_constant() {
                return Ok(c.clone());
            }
            let values = rows
                .iter()
                .map(|&r| c.value_at(r))
                .collect::<Result<Vec<_>>>()?;
            vector_from_values(c.data_type(), values)
        })
        .collect::<Result<Vec<_>>>()?;
    DataBlock::new(columns, rows.len())
}

/// Packs row-major values into blocks of at most `batch_rows` rows.
pub fn blocks_from_rows(
    types: &[DataType],
    rows: Vec<Vec<Value>>,
    batch_rows: usize,
) -> Result<Vec<DataBlock>> {
    rows.chunks(batch_rows.max(1))
        .map(|chunk| block_from_rows(types, chunk))
        .collect()
}

fn block_from_rows(types: &[DataType], rows: &[Vec<Value>]) -> Result<DataBlock> {
    if types.is_empty() {
        return Ok(DataBlock::empty_with_rows(rows.len()));
    }
    let columns = types
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let values = rows
                .iter()
                .map(|r| {
                    r.get(i).cloned().ok_or_else(|| {
                        QuiverError::Executor(format!(
                            "row has {} values, expected {}",
                            r.len(),
                            types.len()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            vector_from_values(t, values)
        })
        .collect::<Result<Vec<_>>>()?;
    DataBlock::new(columns, rows.len())
}

/// Single-row block carrying an affected-row count.
pub fn count_block(count: u64) -> Result<DataBlock> {
    DataBlock::from_rows(
        &[DataType::bigint()],
        &[vec![Value::make_big_int(count as i64)]],
    )
}

#[cfg(test)]
mod tests {
    use super::{blocks_from_rows, take_rows, StageOutput, StageOutputs};
    use quiver_common::{QuiverError, StageId};
    use quiver_vector::{ColumnVector, DataBlock, DataType, Value};

    #[test]
    fn take_rows_keeps_constants_and_reorders() {
        let flat = ColumnVector::from_values(
            DataType::integer(),
            &[Value::make_int(1), Value::make_int(2), Value::make_int(3)],
        )
        .unwrap();
        let constant = ColumnVector::constant(&Value::make_varchar("k")).unwrap();
        let block = DataBlock::new(vec![flat, constant], 3).unwrap();
        let out = take_rows(&block, &[2, 0]).unwrap();
        assert_eq!(out.row_count(), 2);
        assert!(out.column(1).unwrap().is_constant());
        assert_eq!(out.to_string(), "3 k\n1 k\n");
    }

    #[test]
    fn rows_are_chunked_by_batch_size() {
        let rows: Vec<Vec<Value>> = (0..5).map(|i| vec![Value::make_big_int(i)]).collect();
        let blocks = blocks_from_rows(&[DataType::bigint()], rows, 2).unwrap();
        let sizes: Vec<usize> = blocks.iter().map(|b| b.row_count()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn stage_outputs_are_typed() {
        let outputs = StageOutputs::new();
        outputs.insert(StageId(1), StageOutput::Blocks(vec![]));
        assert!(outputs.blocks(StageId(1)).unwrap().is_empty());
        assert!(matches!(
            outputs.hash_table(StageId(1)),
            Err(QuiverError::Executor(_))
        ));
        assert!(matches!(
            outputs.blocks(StageId(7)),
            Err(QuiverError::Executor(_))
        ));
    }
}
