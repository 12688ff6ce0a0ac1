use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use quiver_common::Result;
use quiver_vector::Value;
use tracing::debug;

use crate::context::OptimizerContext;
use crate::logical_plan::{
    combine_conjuncts, split_conjuncts, AggregateExpr, ColumnBinding, Expr, JoinType,
    LogicalOperator, LogicalPlan, SortKey,
};
use crate::scalar::{and3, bool_value, or3, truth_value};

/// Configuration knobs for rule-based optimization.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    pub constant_folding: bool,
    pub predicate_pushdown: bool,
    pub projection_pruning: bool,
    /// Put the input with fewer estimated rows on the build (right) side of
    /// inner and cross joins.
    pub join_side_selection: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            constant_folding: true,
            predicate_pushdown: true,
            projection_pruning: true,
            join_side_selection: true,
        }
    }
}

/// Rule-based optimizer for logical plans.
///
/// Every pass preserves the output columns of the root. A pass whose
/// preconditions do not hold leaves the subtree unchanged.
pub struct Optimizer {
    custom_rules: RwLock<HashMap<String, Arc<dyn OptimizerRule>>>,
}

/// Custom optimizer rule hook.
pub trait OptimizerRule: Send + Sync {
    /// Stable rule name used by registry.
    fn name(&self) -> &str;
    /// Rewrite input plan and return transformed plan.
    fn rewrite(
        &self,
        plan: LogicalPlan,
        ctx: &dyn OptimizerContext,
        cfg: OptimizerConfig,
    ) -> Result<LogicalPlan>;
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("custom_rules", &self.custom_rules.read().len())
            .finish()
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self {
            custom_rules: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace a custom optimizer rule.
    ///
    /// Returns `true` when an existing rule with the same name was replaced.
    pub fn register_rule(&self, rule: Arc<dyn OptimizerRule>) -> bool {
        self.custom_rules
            .write()
            .insert(rule.name().to_string(), rule)
            .is_some()
    }

    /// Deregister a custom optimizer rule by name.
    ///
    /// Returns `true` when an existing rule was removed.
    pub fn deregister_rule(&self, name: &str) -> bool {
        self.custom_rules.write().remove(name).is_some()
    }

    /// Apply the rule pipeline to a logical plan.
    ///
    /// Pass order is fixed:
    /// 1. constant folding
    /// 2. filter merge
    /// 3. predicate pushdown
    /// 4. projection pruning
    /// 5. join side selection
    /// 6. custom rules, sorted by name
    pub fn optimize(
        &self,
        plan: LogicalPlan,
        ctx: &dyn OptimizerContext,
        cfg: OptimizerConfig,
    ) -> Result<LogicalPlan> {
        let mut plan = plan;
        if cfg.constant_folding {
            plan = fold_constants(plan)?;
        }
        plan = merge_filters(plan)?;
        if cfg.predicate_pushdown {
            plan = push_down(plan, Vec::new(), ctx)?;
        }
        if cfg.projection_pruning {
            let required: HashSet<(usize, usize)> =
                plan.output_columns().iter().map(ColumnBinding::key).collect();
            plan = prune(plan, &required)?;
        }
        if cfg.join_side_selection {
            plan = select_join_sides(plan, ctx)?;
        }

        let mut rules = self
            .custom_rules
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect::<Vec<_>>();
        rules.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, rule) in rules {
            debug!(rule = %name, "applying custom optimizer rule");
            plan = rule.rewrite(plan, ctx, cfg)?;
        }
        Ok(plan)
    }
}

/// Rebuilds `plan` with `f` applied to each direct child.
pub fn map_plan_children<F>(plan: LogicalPlan, mut f: F) -> Result<LogicalPlan>
where
    F: FnMut(LogicalPlan) -> Result<LogicalPlan>,
{
    let LogicalPlan { id, op } = plan;
    let mut apply = |b: Box<LogicalPlan>| -> Result<Box<LogicalPlan>> { Ok(Box::new(f(*b)?)) };
    let op = match op {
        LogicalOperator::Filter { predicate, input } => LogicalOperator::Filter {
            predicate,
            input: apply(input)?,
        },
        LogicalOperator::Projection {
            table_index,
            exprs,
            input,
        } => LogicalOperator::Projection {
            table_index,
            exprs,
            input: apply(input)?,
        },
        LogicalOperator::Join {
            join_type,
            condition,
            left,
            right,
        } => LogicalOperator::Join {
            join_type,
            condition,
            left: apply(left)?,
            right: apply(right)?,
        },
        LogicalOperator::Aggregate {
            group_index,
            aggregate_index,
            groups,
            aggregates,
            input,
        } => LogicalOperator::Aggregate {
            group_index,
            aggregate_index,
            groups,
            aggregates,
            input: apply(input)?,
        },
        LogicalOperator::Sort { keys, input } => LogicalOperator::Sort {
            keys,
            input: apply(input)?,
        },
        LogicalOperator::Limit {
            limit,
            offset,
            input,
        } => LogicalOperator::Limit {
            limit,
            offset,
            input: apply(input)?,
        },
        LogicalOperator::Insert {
            table,
            table_index,
            column_map,
            table_schema,
            input,
        } => LogicalOperator::Insert {
            table,
            table_index,
            column_map,
            table_schema,
            input: apply(input)?,
        },
        LogicalOperator::Update {
            table,
            table_index,
            table_schema,
            assignments,
            predicate,
            input,
        } => LogicalOperator::Update {
            table,
            table_index,
            table_schema,
            assignments,
            predicate,
            input: apply(input)?,
        },
        LogicalOperator::Delete {
            table,
            table_index,
            predicate,
            input,
        } => LogicalOperator::Delete {
            table,
            table_index,
            predicate,
            input: apply(input)?,
        },
        LogicalOperator::Explain {
            table_index,
            logical_text,
            input,
        } => LogicalOperator::Explain {
            table_index,
            logical_text,
            input: apply(input)?,
        },
        leaf @ (LogicalOperator::TableScan { .. }
        | LogicalOperator::DummyScan { .. }
        | LogicalOperator::Values { .. }
        | LogicalOperator::CreateTable { .. }) => leaf,
    };
    Ok(LogicalPlan { id, op })
}

/// Applies `f` to every expression owned by `plan` and its descendants.
pub fn rewrite_plan_exprs<F>(plan: LogicalPlan, f: &F) -> Result<LogicalPlan>
where
    F: Fn(Expr) -> Result<Expr>,
{
    let plan = map_plan_children(plan, |c| rewrite_plan_exprs(c, f))?;
    let LogicalPlan { id, op } = plan;
    let all = |v: Vec<Expr>| v.into_iter().map(f).collect::<Result<Vec<_>>>();
    let op = match op {
        LogicalOperator::TableScan {
            table,
            table_index,
            schema,
            projection,
            filters,
        } => LogicalOperator::TableScan {
            table,
            table_index,
            schema,
            projection,
            filters: all(filters)?,
        },
        LogicalOperator::Values {
            table_index,
            names,
            types,
            rows,
        } => LogicalOperator::Values {
            table_index,
            names,
            types,
            rows: rows.into_iter().map(all).collect::<Result<Vec<_>>>()?,
        },
        LogicalOperator::Filter { predicate, input } => LogicalOperator::Filter {
            predicate: f(predicate)?,
            input,
        },
        LogicalOperator::Projection {
            table_index,
            exprs,
            input,
        } => LogicalOperator::Projection {
            table_index,
            exprs: exprs
                .into_iter()
                .map(|(e, n)| -> Result<(Expr, String)> { Ok((f(e)?, n)) })
                .collect::<Result<Vec<_>>>()?,
            input,
        },
        LogicalOperator::Join {
            join_type,
            condition,
            left,
            right,
        } => LogicalOperator::Join {
            join_type,
            condition: condition.map(f).transpose()?,
            left,
            right,
        },
        LogicalOperator::Aggregate {
            group_index,
            aggregate_index,
            groups,
            aggregates,
            input,
        } => LogicalOperator::Aggregate {
            group_index,
            aggregate_index,
            groups: all(groups)?,
            aggregates: aggregates
                .into_iter()
                .map(|mut a| -> Result<AggregateExpr> {
                    a.arg = a.arg.map(f).transpose()?;
                    Ok(a)
                })
                .collect::<Result<Vec<_>>>()?,
            input,
        },
        LogicalOperator::Sort { keys, input } => LogicalOperator::Sort {
            keys: keys
                .into_iter()
                .map(|mut k| -> Result<SortKey> {
                    k.expr = f(k.expr)?;
                    Ok(k)
                })
                .collect::<Result<Vec<_>>>()?,
            input,
        },
        LogicalOperator::Update {
            table,
            table_index,
            table_schema,
            assignments,
            predicate,
            input,
        } => LogicalOperator::Update {
            table,
            table_index,
            table_schema,
            assignments: assignments
                .into_iter()
                .map(|(i, e)| -> Result<(usize, Expr)> { Ok((i, f(e)?)) })
                .collect::<Result<Vec<_>>>()?,
            predicate: predicate.map(f).transpose()?,
            input,
        },
        LogicalOperator::Delete {
            table,
            table_index,
            predicate,
            input,
        } => LogicalOperator::Delete {
            table,
            table_index,
            predicate: predicate.map(f).transpose()?,
            input,
        },
        other => other,
    };
    Ok(LogicalPlan { id, op })
}

// -----------------------------
// 1) Constant folding
// -----------------------------

fn fold_constants(plan: LogicalPlan) -> Result<LogicalPlan> {
    let plan = rewrite_plan_exprs(plan, &|e| e.transform_up(&mut fold_expr))?;
    drop_true_filters(plan)
}

/// Folds one node whose children are already folded. Evaluation failures
/// (overflow, division by zero, bad casts) leave the node for execution to
/// report.
fn fold_expr(e: Expr) -> Result<Expr> {
    let folded = match &e {
        Expr::BinaryOp { left, op, right } => match (left.as_ref(), right.as_ref()) {
            (Expr::Literal(l), Expr::Literal(r)) => op.evaluate(l, r).ok(),
            _ => None,
        },
        Expr::And(a, b) => fold_logical(a, b, true)?,
        Expr::Or(a, b) => fold_logical(a, b, false)?,
        Expr::Not(inner) => match inner.as_ref() {
            Expr::Literal(v) => Some(bool_value(truth_value(v)?.map(|b| !b))),
            _ => None,
        },
        Expr::IsNull(inner) => match inner.as_ref() {
            Expr::Literal(v) => Some(bool_value(Some(v.is_null()))),
            _ => None,
        },
        Expr::IsNotNull(inner) => match inner.as_ref() {
            Expr::Literal(v) => Some(bool_value(Some(!v.is_null()))),
            _ => None,
        },
        Expr::Cast { expr, to_type } => match expr.as_ref() {
            Expr::Literal(v) => v.try_cast(to_type).ok(),
            _ => None,
        },
        _ => None,
    };
    Ok(folded.map(Expr::Literal).unwrap_or(e))
}

fn fold_logical(a: &Expr, b: &Expr, is_and: bool) -> Result<Option<Value>> {
    let lit = |e: &Expr| -> Result<Option<Option<bool>>> {
        match e {
            Expr::Literal(v) => Ok(Some(truth_value(v)?)),
            _ => Ok(None),
        }
    };
    let out = match (lit(a)?, lit(b)?, is_and) {
        (Some(x), Some(y), true) => Some(and3(x, y)),
        (Some(x), Some(y), false) => Some(or3(x, y)),
        // A dominating literal decides the result regardless of the other side.
        (Some(Some(false)), None, true) | (None, Some(Some(false)), true) => Some(Some(false)),
        (Some(Some(true)), None, false) | (None, Some(Some(true)), false) => Some(Some(true)),
        _ => None,
    };
    Ok(out.map(bool_value))
}

fn drop_true_filters(plan: LogicalPlan) -> Result<LogicalPlan> {
    let LogicalPlan { id, op } = map_plan_children(plan, drop_true_filters)?;
    match op {
        LogicalOperator::Filter {
            predicate: Expr::Literal(v),
            input,
        } if matches!(truth_value(&v), Ok(Some(true))) => Ok(*input),
        op => Ok(LogicalPlan::new(id, op)),
    }
}

// -----------------------------
// 2) Filter merge
// -----------------------------

fn merge_filters(plan: LogicalPlan) -> Result<LogicalPlan> {
    let plan = map_plan_children(plan, merge_filters)?;
    let LogicalPlan { id, op } = plan;
    match op {
        LogicalOperator::Filter { predicate, input } => match input.op {
            // Filter(Filter(x)) => Filter(x) with merged predicate
            LogicalOperator::Filter {
                predicate: inner,
                input: inner_input,
            } => Ok(LogicalPlan::new(
                id,
                LogicalOperator::Filter {
                    predicate: Expr::and(inner, predicate),
                    input: inner_input,
                },
            )),
            other => Ok(LogicalPlan::new(
                id,
                LogicalOperator::Filter {
                    predicate,
                    input: Box::new(LogicalPlan::new(input.id, other)),
                },
            )),
        },
        op => Ok(LogicalPlan::new(id, op)),
    }
}

// -----------------------------
// 3) Predicate pushdown
// -----------------------------

/// Places `preds` (conjuncts that must hold on `plan`'s output) as low in the
/// tree as their column references allow.
fn push_down(
    plan: LogicalPlan,
    mut preds: Vec<Expr>,
    ctx: &dyn OptimizerContext,
) -> Result<LogicalPlan> {
    let LogicalPlan { id, op } = plan;
    match op {
        LogicalOperator::Filter { predicate, input } => {
            preds.extend(split_conjuncts(predicate));
            push_down(*input, preds, ctx)
        }
        LogicalOperator::TableScan {
            table,
            table_index,
            schema,
            projection,
            mut filters,
        } => {
            filters.extend(preds);
            Ok(LogicalPlan::new(
                id,
                LogicalOperator::TableScan {
                    table,
                    table_index,
                    schema,
                    projection,
                    filters,
                },
            ))
        }
        LogicalOperator::Join {
            join_type: JoinType::Inner | JoinType::Cross,
            condition,
            left,
            right,
        } => {
            if let Some(c) = condition {
                preds.extend(split_conjuncts(c));
            }
            let left_tables = left.table_indices();
            let right_tables = right.table_indices();
            let (mut to_left, mut to_right, mut on_join) = (vec![], vec![], vec![]);
            for p in preds {
                let refs = p.table_indices();
                if refs.is_subset(&left_tables) {
                    to_left.push(p);
                } else if refs.is_subset(&right_tables) {
                    to_right.push(p);
                } else {
                    on_join.push(p);
                }
            }
            let condition = combine_conjuncts(on_join);
            let join_type = if condition.is_some() {
                JoinType::Inner
            } else {
                JoinType::Cross
            };
            Ok(LogicalPlan::new(
                id,
                LogicalOperator::Join {
                    join_type,
                    condition,
                    left: Box::new(push_down(*left, to_left, ctx)?),
                    right: Box::new(push_down(*right, to_right, ctx)?),
                },
            ))
        }
        LogicalOperator::Join {
            join_type: JoinType::Left,
            condition,
            left,
            right,
        } => {
            let left_tables = left.table_indices();
            let right_tables = right.table_indices();
            let (to_left, keep): (Vec<_>, Vec<_>) = preds
                .into_iter()
                .partition(|p| p.table_indices().is_subset(&left_tables));
            // ON conjuncts over the inner side filter it before matching.
            let (to_right, on_join): (Vec<_>, Vec<_>) = condition
                .map(split_conjuncts)
                .unwrap_or_default()
                .into_iter()
                .partition(|p| {
                    let refs = p.table_indices();
                    !refs.is_empty() && refs.is_subset(&right_tables)
                });
            let join = LogicalPlan::new(
                id,
                LogicalOperator::Join {
                    join_type: JoinType::Left,
                    condition: combine_conjuncts(on_join),
                    left: Box::new(push_down(*left, to_left, ctx)?),
                    right: Box::new(push_down(*right, to_right, ctx)?),
                },
            );
            Ok(wrap_filter(join, keep, ctx))
        }
        LogicalOperator::Projection {
            table_index,
            exprs,
            input,
        } => {
            let (through, keep): (Vec<_>, Vec<_>) = preds
                .into_iter()
                .partition(|p| p.table_indices().iter().all(|t| *t == table_index));
            let through = through
                .into_iter()
                .map(|p| substitute(p, table_index, &exprs))
                .collect::<Result<Vec<_>>>()?;
            let proj = LogicalPlan::new(
                id,
                LogicalOperator::Projection {
                    table_index,
                    exprs,
                    input: Box::new(push_down(*input, through, ctx)?),
                },
            );
            Ok(wrap_filter(proj, keep, ctx))
        }
        LogicalOperator::Aggregate {
            group_index,
            aggregate_index,
            groups,
            aggregates,
            input,
        } => {
            // Conjuncts over group keys only hold per group and per input row alike.
            let (through, keep): (Vec<_>, Vec<_>) = preds.into_iter().partition(|p| {
                let refs = p.table_indices();
                !refs.is_empty() && refs.iter().all(|t| *t == group_index)
            });
            let named: Vec<(Expr, String)> =
                groups.iter().map(|g| (g.clone(), g.output_name())).collect();
            let through = through
                .into_iter()
                .map(|p| substitute(p, group_index, &named))
                .collect::<Result<Vec<_>>>()?;
            let agg = LogicalPlan::new(
                id,
                LogicalOperator::Aggregate {
                    group_index,
                    aggregate_index,
                    groups,
                    aggregates,
                    input: Box::new(push_down(*input, through, ctx)?),
                },
            );
            Ok(wrap_filter(agg, keep, ctx))
        }
        LogicalOperator::Sort { keys, input } => Ok(LogicalPlan::new(
            id,
            LogicalOperator::Sort {
                keys,
                input: Box::new(push_down(*input, preds, ctx)?),
            },
        )),
        // Limit, full joins, leaves without scan filters and writers: stop here.
        op => {
            let node = map_plan_children(LogicalPlan::new(id, op), |c| {
                push_down(c, Vec::new(), ctx)
            })?;
            Ok(wrap_filter(node, preds, ctx))
        }
    }
}

fn wrap_filter(plan: LogicalPlan, preds: Vec<Expr>, ctx: &dyn OptimizerContext) -> LogicalPlan {
    match combine_conjuncts(preds) {
        Some(predicate) => LogicalPlan::new(
            ctx.next_node_id(),
            LogicalOperator::Filter {
                predicate,
                input: Box::new(plan),
            },
        ),
        None => plan,
    }
}

/// Replaces references to `table_index` output columns with the expressions
/// that produce them.
fn substitute(e: Expr, table_index: usize, exprs: &[(Expr, String)]) -> Result<Expr> {
    e.transform_up(&mut |node| match node {
        Expr::Column(c) if c.table_index == table_index => Ok(exprs
            .get(c.column_index)
            .map(|(e, _)| e.clone())
            .unwrap_or(Expr::Column(c))),
        other => Ok(other),
    })
}

// -----------------------------
// 4) Projection pruning
// -----------------------------

fn expr_keys(e: &Expr, out: &mut HashSet<(usize, usize)>) {
    out.extend(e.column_bindings().into_iter().map(ColumnBinding::key));
}

/// Narrows scan projections to the columns some ancestor reads.
fn prune(plan: LogicalPlan, required: &HashSet<(usize, usize)>) -> Result<LogicalPlan> {
    let mut need = required.clone();
    match &plan.op {
        LogicalOperator::TableScan { .. } => {}
        LogicalOperator::Filter { predicate, .. } => expr_keys(predicate, &mut need),
        LogicalOperator::Projection { exprs, .. } => {
            need.clear();
            exprs.iter().for_each(|(e, _)| expr_keys(e, &mut need));
        }
        LogicalOperator::Join { condition, .. } => {
            if let Some(c) = condition {
                expr_keys(c, &mut need);
            }
        }
        LogicalOperator::Aggregate {
            groups, aggregates, ..
        } => {
            need.clear();
            groups.iter().for_each(|g| expr_keys(g, &mut need));
            aggregates
                .iter()
                .filter_map(|a| a.arg.as_ref())
                .for_each(|a| expr_keys(a, &mut need));
        }
        LogicalOperator::Sort { keys, .. } => keys.iter().for_each(|k| expr_keys(&k.expr, &mut need)),
        LogicalOperator::Limit { .. } => {}
        // Writers and EXPLAIN consume whole rows.
        _ => {
            need.clear();
            for child in plan.children() {
                need.extend(child.output_columns().iter().map(ColumnBinding::key));
            }
        }
    }

    let plan = map_plan_children(plan, |c| prune(c, &need))?;
    let LogicalPlan { id, op } = plan;
    let op = match op {
        LogicalOperator::TableScan {
            table,
            table_index,
            schema,
            projection,
            filters,
        } => {
            let mut cols: BTreeSet<usize> = need
                .iter()
                .filter(|(t, _)| *t == table_index)
                .map(|(_, c)| *c)
                .collect();
            let mut filter_keys = HashSet::new();
            filters.iter().for_each(|f| expr_keys(f, &mut filter_keys));
            cols.extend(
                filter_keys
                    .into_iter()
                    .filter(|(t, _)| *t == table_index)
                    .map(|(_, c)| c),
            );
            if let Some(p) = &projection {
                cols.retain(|c| p.contains(c));
            }
            // Keep one column so row counts survive a scan nothing reads from.
            if cols.is_empty() && !schema.is_empty() {
                cols.insert(projection.as_ref().and_then(|p| p.first().copied()).unwrap_or(0));
            }
            let projection = if cols.len() == schema.len() {
                None
            } else {
                Some(cols.into_iter().collect())
            };
            LogicalOperator::TableScan {
                table,
                table_index,
                schema,
                projection,
                filters,
            }
        }
        other => other,
    };
    Ok(LogicalPlan::new(id, op))
}

// -----------------------------
// 5) Join side selection
// -----------------------------

fn estimated_rows(plan: &LogicalPlan, ctx: &dyn OptimizerContext) -> Option<u64> {
    match &plan.op {
        LogicalOperator::TableScan { table, .. } => ctx.table_stats(table).ok().and_then(|s| s.1),
        LogicalOperator::DummyScan { .. } => Some(1),
        LogicalOperator::Values { rows, .. } => Some(rows.len() as u64),
        LogicalOperator::Filter { input, .. }
        | LogicalOperator::Projection { input, .. }
        | LogicalOperator::Sort { input, .. } => estimated_rows(input, ctx),
        LogicalOperator::Limit { limit, input, .. } => match (limit, estimated_rows(input, ctx)) {
            (Some(l), Some(r)) => Some(r.min(*l)),
            (Some(l), None) => Some(*l),
            (None, r) => r,
        },
        LogicalOperator::Join { left, right, .. } => {
            let l = estimated_rows(left, ctx)?;
            let r = estimated_rows(right, ctx)?;
            Some(l.saturating_mul(r.max(1)))
        }
        _ => None,
    }
}

fn select_join_sides(plan: LogicalPlan, ctx: &dyn OptimizerContext) -> Result<LogicalPlan> {
    let plan = map_plan_children(plan, |c| select_join_sides(c, ctx))?;
    let LogicalPlan { id, op } = plan;
    let op = match op {
        LogicalOperator::Join {
            join_type: join_type @ (JoinType::Inner | JoinType::Cross),
            condition,
            left,
            right,
        } => {
            let swap = matches!(
                (estimated_rows(&left, ctx), estimated_rows(&right, ctx)),
                (Some(l), Some(r)) if l < r
            );
            let (left, right) = if swap { (right, left) } else { (left, right) };
            if swap {
                debug!(node = id.0, "swapped join inputs by estimated row count");
            }
            LogicalOperator::Join {
                join_type,
                condition,
                left,
                right,
            }
        }
        other => other,
    };
    Ok(LogicalPlan::new(id, op))
}

#[cfg(test)]
mod tests {
    use super::fold_expr;
    use crate::logical_plan::{BinaryOp, ColumnBinding, Expr};
    use quiver_vector::{DataType, Value};

    fn col() -> Expr {
        Expr::Column(ColumnBinding::new(0, 0, "a", DataType::boolean()))
    }

    #[test]
    fn folds_literal_arithmetic_and_comparisons() {
        let e = Expr::binary(
            Expr::binary(
                Expr::Literal(Value::make_int(2)),
                BinaryOp::Plus,
                Expr::Literal(Value::make_int(3)),
            ),
            BinaryOp::Gt,
            Expr::Literal(Value::make_int(4)),
        );
        let folded = e.transform_up(&mut fold_expr).unwrap();
        assert_eq!(folded, Expr::Literal(Value::make_bool(true)));
    }

    #[test]
    fn and_with_false_short_circuits_but_true_does_not_drop_column() {
        let f = Expr::and(col(), Expr::Literal(Value::make_bool(false)));
        assert_eq!(
            f.transform_up(&mut fold_expr).unwrap(),
            Expr::Literal(Value::make_bool(false))
        );
        let t = Expr::and(col(), Expr::Literal(Value::make_bool(true)));
        assert_eq!(t.clone().transform_up(&mut fold_expr).unwrap(), t);
    }

    #[test]
    fn division_by_zero_is_left_for_execution() {
        let e = Expr::binary(
            Expr::Literal(Value::make_int(1)),
            BinaryOp::Divide,
            Expr::Literal(Value::make_int(0)),
        );
        assert_eq!(e.clone().transform_up(&mut fold_expr).unwrap(), e);
    }
}
