use quiver_common::{QuiverError, Result};
use quiver_vector::{DataType, Field, Schema, Value};

use crate::explain::{explain_logical, explain_physical};
use crate::logical_plan::{
    split_conjuncts, AggregateExpr, BinaryOp, ColumnBinding, Expr, JoinType, LogicalOperator,
    LogicalPlan, SortKey, EXPLAIN_COLUMN,
};
use crate::physical_plan::{
    CreateTableExec, DeleteExec, DummyScanExec, FilterExec, HashAggregateExec, HashJoinExec,
    InsertExec, LimitExec, NestedLoopJoinExec, PhysicalPlan, ProjectExec, SortExec,
    TableScanExec, UpdateExec, ValuesExec,
};
use crate::scalar::common_type;

#[derive(Debug, Clone)]
pub struct PhysicalPlannerConfig {
    /// Rows per block emitted by operators that materialize their output.
    pub target_batch_rows: usize,
}

impl Default for PhysicalPlannerConfig {
    fn default() -> Self {
        Self {
            target_batch_rows: quiver_common::config::DEFAULT_VECTOR_SIZE,
        }
    }
}

/// Lower an optimized logical plan to executable physical operators.
///
/// Contracts:
/// - children are lowered before their parent;
/// - every physical operator reports the same output columns as the logical
///   node it came from;
/// - column references are rewritten to input slot positions;
/// - logical shapes without a lowering return an executor error.
pub fn create_physical_plan(
    logical: &LogicalPlan,
    cfg: &PhysicalPlannerConfig,
) -> Result<PhysicalPlan> {
    let mut children = logical
        .children()
        .into_iter()
        .map(|c| create_physical_plan(c, cfg))
        .collect::<Result<Vec<_>>>()?;
    let schema = logical.schema();
    let name = logical.node_type();

    match &logical.op {
        LogicalOperator::TableScan {
            table,
            schema: table_schema,
            projection,
            filters,
            ..
        } => {
            ensure_arity(name, 0, &children)?;
            let layout = logical.output_columns();
            let projection = projection
                .clone()
                .unwrap_or_else(|| (0..table_schema.len()).collect());
            let filters = filters
                .iter()
                .map(|f| resolve(f, &layout))
                .collect::<Result<Vec<_>>>()?;
            Ok(PhysicalPlan::TableScan(TableScanExec {
                table: table.clone(),
                table_schema: table_schema.clone(),
                projection,
                filters,
                schema,
            }))
        }
        LogicalOperator::DummyScan { .. } => {
            ensure_arity(name, 0, &children)?;
            Ok(PhysicalPlan::DummyScan(DummyScanExec { schema }))
        }
        LogicalOperator::Values { rows, .. } => {
            ensure_arity(name, 0, &children)?;
            let rows = rows
                .iter()
                .map(|r| r.iter().map(|e| resolve(e, &[])).collect::<Result<Vec<Expr>>>())
                .collect::<Result<Vec<_>>>()?;
            Ok(PhysicalPlan::Values(ValuesExec {
                rows,
                batch_rows: cfg.target_batch_rows,
                schema,
            }))
        }
        LogicalOperator::Filter { predicate, input } => {
            let input_plan = take_one(name, &mut children)?;
            let layout = input.output_columns();
            Ok(PhysicalPlan::Filter(FilterExec {
                predicate: resolve(predicate, &layout)?,
                input: input_plan,
                schema,
            }))
        }
        LogicalOperator::Projection { exprs, input, .. } => {
            let input_plan = take_one(name, &mut children)?;
            let layout = input.output_columns();
            let exprs = exprs
                .iter()
                .map(|(e, n)| -> Result<(Expr, String)> { Ok((resolve(e, &layout)?, n.clone())) })
                .collect::<Result<Vec<_>>>()?;
            Ok(PhysicalPlan::Project(ProjectExec {
                exprs,
                input: input_plan,
                schema,
            }))
        }
        LogicalOperator::Join {
            join_type,
            condition,
            left,
            right,
        } => {
            let (left_plan, right_plan) = take_two(name, &mut children)?;
            lower_join(
                *join_type,
                condition.as_ref(),
                left,
                right,
                left_plan,
                right_plan,
                schema,
            )
        }
        LogicalOperator::Aggregate {
            groups,
            aggregates,
            input,
            ..
        } => {
            let input_plan = take_one(name, &mut children)?;
            let layout = input.output_columns();
            let groups = groups
                .iter()
                .map(|g| resolve(g, &layout))
                .collect::<Result<Vec<_>>>()?;
            let aggregates = aggregates
                .iter()
                .map(|a| -> Result<AggregateExpr> {
                    Ok(AggregateExpr {
                        func: a.func,
                        arg: a.arg.as_ref().map(|e| resolve(e, &layout)).transpose()?,
                        data_type: a.data_type.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(PhysicalPlan::HashAggregate(HashAggregateExec {
                groups,
                aggregates,
                batch_rows: cfg.target_batch_rows,
                input: input_plan,
                schema,
            }))
        }
        LogicalOperator::Sort { keys, input } => {
            let input_plan = take_one(name, &mut children)?;
            let layout = input.output_columns();
            let keys = keys
                .iter()
                .map(|k| -> Result<SortKey> {
                    Ok(SortKey {
                        expr: resolve(&k.expr, &layout)?,
                        ascending: k.ascending,
                        nulls_first: k.nulls_first,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(PhysicalPlan::Sort(SortExec {
                keys,
                batch_rows: cfg.target_batch_rows,
                input: input_plan,
                schema,
            }))
        }
        LogicalOperator::Limit { limit, offset, .. } => {
            let input_plan = take_one(name, &mut children)?;
            Ok(PhysicalPlan::Limit(LimitExec {
                limit: *limit,
                offset: *offset,
                input: input_plan,
                schema,
            }))
        }
        LogicalOperator::Insert {
            table,
            column_map,
            table_schema,
            ..
        } => {
            let input_plan = take_one(name, &mut children)?;
            Ok(PhysicalPlan::Insert(InsertExec {
                table: table.clone(),
                table_schema: table_schema.clone(),
                column_map: column_map.clone(),
                input: input_plan,
                schema,
            }))
        }
        LogicalOperator::Update {
            table,
            table_schema,
            assignments,
            predicate,
            input,
            ..
        } => {
            let input_plan = take_one(name, &mut children)?;
            let layout = full_row_layout(input, table_schema, "UPDATE")?;
            let assignments = assignments
                .iter()
                .map(|(i, e)| -> Result<(usize, Expr)> { Ok((*i, resolve(e, &layout)?)) })
                .collect::<Result<Vec<_>>>()?;
            Ok(PhysicalPlan::Update(UpdateExec {
                table: table.clone(),
                table_schema: table_schema.clone(),
                assignments,
                predicate: predicate.as_ref().map(|p| resolve(p, &layout)).transpose()?,
                input: input_plan,
                schema,
            }))
        }
        LogicalOperator::Delete {
            table,
            predicate,
            input,
            ..
        } => {
            let input_plan = take_one(name, &mut children)?;
            let table_schema = input_plan.schema().clone();
            let layout = full_row_layout(input, &table_schema, "DELETE")?;
            Ok(PhysicalPlan::Delete(DeleteExec {
                table: table.clone(),
                table_schema,
                predicate: predicate.as_ref().map(|p| resolve(p, &layout)).transpose()?,
                input: input_plan,
                schema,
            }))
        }
        LogicalOperator::CreateTable {
            table,
            schema: table_schema,
            if_not_exists,
            ..
        } => {
            ensure_arity(name, 0, &children)?;
            Ok(PhysicalPlan::CreateTable(CreateTableExec {
                table: table.clone(),
                table_schema: table_schema.clone(),
                if_not_exists: *if_not_exists,
                schema,
            }))
        }
        LogicalOperator::Explain {
            logical_text,
            input,
            ..
        } => {
            let input_plan = take_one(name, &mut children)?;
            let mut lines = vec!["== logical plan ==".to_string()];
            lines.extend(logical_text.lines().map(str::to_string));
            lines.push("== optimized plan ==".to_string());
            lines.extend(explain_logical(input).lines().map(str::to_string));
            lines.push("== physical plan ==".to_string());
            lines.extend(explain_physical(&input_plan).lines().map(str::to_string));
            let rows = lines
                .into_iter()
                .map(|l| vec![Expr::Literal(Value::make_varchar(&l))])
                .collect();
            Ok(PhysicalPlan::Values(ValuesExec {
                rows,
                batch_rows: cfg.target_batch_rows,
                schema: Schema::new(vec![Field::new(EXPLAIN_COLUMN, DataType::varchar())]),
            }))
        }
    }
}

fn ensure_arity(
    name: impl std::fmt::Display,
    expected: usize,
    children: &[PhysicalPlan],
) -> Result<()> {
    if children.len() != expected {
        return Err(QuiverError::Executor(format!(
            "{name} expects {expected} input(s), got {}",
            children.len()
        )));
    }
    Ok(())
}

fn take_one(
    name: impl std::fmt::Display,
    children: &mut Vec<PhysicalPlan>,
) -> Result<Box<PhysicalPlan>> {
    ensure_arity(name, 1, children)?;
    children
        .pop()
        .map(Box::new)
        .ok_or_else(|| QuiverError::Executor("missing input".to_string()))
}

fn take_two(
    name: impl std::fmt::Display,
    children: &mut Vec<PhysicalPlan>,
) -> Result<(Box<PhysicalPlan>, Box<PhysicalPlan>)> {
    ensure_arity(name, 2, children)?;
    let right = children.pop();
    let left = children.pop();
    match (left, right) {
        (Some(l), Some(r)) => Ok((Box::new(l), Box::new(r))),
        _ => Err(QuiverError::Executor("missing join input".to_string())),
    }
}

/// Rewrites binding references to slot positions within `layout`.
///
/// # Errors
/// Executor error when a referenced column is not produced by the input.
pub fn resolve(expr: &Expr, layout: &[ColumnBinding]) -> Result<Expr> {
    expr.clone().transform_up(&mut |e| match e {
        Expr::Column(c) => {
            let index = layout
                .iter()
                .position(|l| l.key() == c.key())
                .ok_or_else(|| {
                    QuiverError::Executor(format!(
                        "column {} (#{}.{}) is not produced by the operator input",
                        c.name, c.table_index, c.column_index
                    ))
                })?;
            Ok(Expr::ColumnRef {
                name: c.name,
                index,
                data_type: c.data_type,
            })
        }
        other => Ok(other),
    })
}

/// Writers that rewrite a table need the input to be the table's full row in
/// catalog order.
fn full_row_layout(input: &LogicalPlan, table_schema: &Schema, what: &str) -> Result<Vec<ColumnBinding>> {
    let layout = input.output_columns();
    if layout.len() != table_schema.len() {
        return Err(QuiverError::Executor(format!(
            "{what} input has {} columns, table has {}",
            layout.len(),
            table_schema.len()
        )));
    }
    Ok(layout)
}

fn lower_join(
    join_type: JoinType,
    condition: Option<&Expr>,
    left: &LogicalPlan,
    right: &LogicalPlan,
    left_plan: Box<PhysicalPlan>,
    right_plan: Box<PhysicalPlan>,
    schema: Schema,
) -> Result<PhysicalPlan> {
    if join_type == JoinType::Full {
        return Err(QuiverError::Executor(
            "no physical lowering for FULL OUTER JOIN".to_string(),
        ));
    }
    let left_layout = left.output_columns();
    let right_layout = right.output_columns();
    let mut both = left_layout.clone();
    both.extend(right_layout.iter().cloned());
    let left_tables = left.table_indices();
    let right_tables = right.table_indices();

    let mut left_keys = Vec::new();
    let mut right_keys = Vec::new();
    let mut residual = Vec::new();
    if join_type != JoinType::Cross {
        for conjunct in condition.cloned().map(split_conjuncts).unwrap_or_default() {
            let sides = match &conjunct {
                Expr::BinaryOp {
                    left: l,
                    op: BinaryOp::Eq,
                    right: r,
                } => {
                    let (lt, rt) = (l.table_indices(), r.table_indices());
                    let nonempty = !lt.is_empty() && !rt.is_empty();
                    if nonempty && lt.is_subset(&left_tables) && rt.is_subset(&right_tables) {
                        Some(((**l).clone(), (**r).clone()))
                    } else if nonempty && lt.is_subset(&right_tables) && rt.is_subset(&left_tables) {
                        Some(((**r).clone(), (**l).clone()))
                    } else {
                        None
                    }
                }
                _ => None,
            };
            match sides {
                Some((lk, rk)) => {
                    // Keys hash by value; give both sides one type.
                    let (lk, rk) = if lk.data_type() == rk.data_type() {
                        (lk, rk)
                    } else {
                        let t = common_type(&lk.data_type(), &rk.data_type())
                            .map_err(|e| QuiverError::Executor(e.to_string()))?;
                        (cast_to(lk, &t), cast_to(rk, &t))
                    };
                    left_keys.push(resolve(&lk, &left_layout)?);
                    right_keys.push(resolve(&rk, &right_layout)?);
                }
                None => residual.push(resolve(&conjunct, &both)?),
            }
        }
    }

    if left_keys.is_empty() {
        let condition = residual.into_iter().reduce(Expr::and);
        let join_type = match (join_type, &condition) {
            (JoinType::Inner, None) => JoinType::Cross,
            (t, _) => t,
        };
        return Ok(PhysicalPlan::NestedLoopJoin(NestedLoopJoinExec {
            join_type,
            condition,
            left: left_plan,
            right: right_plan,
            schema,
        }));
    }
    Ok(PhysicalPlan::HashJoin(HashJoinExec {
        join_type,
        left_keys,
        right_keys,
        residual: residual.into_iter().reduce(Expr::and),
        left: left_plan,
        right: right_plan,
        schema,
    }))
}

fn cast_to(e: Expr, t: &DataType) -> Expr {
    if e.data_type() == *t {
        e
    } else {
        Expr::Cast {
            expr: Box::new(e),
            to_type: t.clone(),
        }
    }
}
