use crate::logical_plan::{LogicalOperator, LogicalPlan};
use crate::physical_plan::PhysicalPlan;

/// Render logical plan as human-readable multiline text.
pub fn explain_logical(plan: &LogicalPlan) -> String {
    let mut s = String::new();
    fmt_plan(plan, 0, &mut s);
    s
}

fn fmt_plan(plan: &LogicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    match &plan.op {
        LogicalOperator::TableScan {
            table,
            table_index,
            projection,
            filters,
            ..
        } => {
            out.push_str(&format!("{pad}TableScan table={table} index={table_index}\n"));
            out.push_str(&format!("{pad}  projection={projection:?}\n"));
            out.push_str(&format!("{pad}  pushed_filters={}\n", filters.len()));
            for f in filters {
                out.push_str(&format!("{pad}    {f}\n"));
            }
        }
        LogicalOperator::DummyScan { table_index } => {
            out.push_str(&format!("{pad}DummyScan index={table_index}\n"));
        }
        LogicalOperator::Values {
            table_index, rows, ..
        } => {
            out.push_str(&format!(
                "{pad}Values index={table_index} rows={}\n",
                rows.len()
            ));
        }
        LogicalOperator::Filter { predicate, input } => {
            out.push_str(&format!("{pad}Filter {predicate}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalOperator::Projection {
            table_index,
            exprs,
            input,
        } => {
            out.push_str(&format!("{pad}Projection index={table_index}\n"));
            for (e, name) in exprs {
                out.push_str(&format!("{pad}  {name} := {e}\n"));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalOperator::Join {
            join_type,
            condition,
            left,
            right,
        } => {
            out.push_str(&format!("{pad}Join type={join_type:?}\n"));
            if let Some(c) = condition {
                out.push_str(&format!("{pad}  on={c}\n"));
            }
            out.push_str(&format!("{pad}  left:\n"));
            fmt_plan(left, indent + 2, out);
            out.push_str(&format!("{pad}  right:\n"));
            fmt_plan(right, indent + 2, out);
        }
        LogicalOperator::Aggregate {
            group_index,
            aggregate_index,
            groups,
            aggregates,
            input,
        } => {
            out.push_str(&format!(
                "{pad}Aggregate groups={group_index} aggregates={aggregate_index}\n"
            ));
            out.push_str(&format!("{pad}  group_by={}\n", groups.len()));
            for g in groups {
                out.push_str(&format!("{pad}    {g}\n"));
            }
            out.push_str(&format!("{pad}  aggs={}\n", aggregates.len()));
            for a in aggregates {
                out.push_str(&format!("{pad}    {a}\n"));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalOperator::Sort { keys, input } => {
            out.push_str(&format!("{pad}Sort\n"));
            for k in keys {
                out.push_str(&format!(
                    "{pad}  {} {}\n",
                    k.expr,
                    if k.ascending { "ASC" } else { "DESC" }
                ));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalOperator::Limit {
            limit,
            offset,
            input,
        } => {
            out.push_str(&format!("{pad}Limit limit={limit:?} offset={offset}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalOperator::Insert {
            table,
            column_map,
            input,
            ..
        } => {
            out.push_str(&format!("{pad}Insert table={table} columns={column_map:?}\n"));
            fmt_plan(input, indent + 1, out);
        }
        LogicalOperator::Update {
            table,
            assignments,
            predicate,
            input,
            ..
        } => {
            out.push_str(&format!("{pad}Update table={table}\n"));
            for (i, e) in assignments {
                out.push_str(&format!("{pad}  #{i} := {e}\n"));
            }
            if let Some(p) = predicate {
                out.push_str(&format!("{pad}  where={p}\n"));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalOperator::Delete {
            table,
            predicate,
            input,
            ..
        } => {
            out.push_str(&format!("{pad}Delete table={table}\n"));
            if let Some(p) = predicate {
                out.push_str(&format!("{pad}  where={p}\n"));
            }
            fmt_plan(input, indent + 1, out);
        }
        LogicalOperator::CreateTable {
            table,
            schema,
            if_not_exists,
            ..
        } => {
            out.push_str(&format!(
                "{pad}CreateTable table={table} columns={} if_not_exists={if_not_exists}\n",
                schema.len()
            ));
        }
        LogicalOperator::Explain { input, .. } => {
            out.push_str(&format!("{pad}Explain\n"));
            fmt_plan(input, indent + 1, out);
        }
    }
}

/// Render physical plan as human-readable multiline text.
pub fn explain_physical(plan: &PhysicalPlan) -> String {
    let mut s = String::new();
    fmt_physical(plan, 0, &mut s);
    s
}

fn fmt_physical(plan: &PhysicalPlan, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    let detail = match plan {
        PhysicalPlan::TableScan(x) => format!(
            " table={} projection={:?} filters={}",
            x.table,
            x.projection,
            x.filters.len()
        ),
        PhysicalPlan::Values(x) => format!(" rows={}", x.rows.len()),
        PhysicalPlan::Filter(x) => format!(" {}", x.predicate),
        PhysicalPlan::Project(x) => format!(
            " {}",
            x.exprs
                .iter()
                .map(|(e, n)| format!("{n}:={e}"))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        PhysicalPlan::HashJoin(x) => format!(
            " type={:?} keys={} build=right",
            x.join_type,
            x.left_keys.len()
        ),
        PhysicalPlan::NestedLoopJoin(x) => format!(" type={:?}", x.join_type),
        PhysicalPlan::HashAggregate(x) => format!(
            " groups={} aggs={}",
            x.groups.len(),
            x.aggregates.len()
        ),
        PhysicalPlan::Sort(x) => format!(" keys={}", x.keys.len()),
        PhysicalPlan::Limit(x) => format!(" limit={:?} offset={}", x.limit, x.offset),
        PhysicalPlan::Insert(x) => format!(" table={}", x.table),
        PhysicalPlan::Update(x) => format!(" table={}", x.table),
        PhysicalPlan::Delete(x) => format!(" table={}", x.table),
        PhysicalPlan::CreateTable(x) => format!(" table={}", x.table),
        PhysicalPlan::DummyScan(_) => String::new(),
    };
    out.push_str(&format!("{pad}{}{detail}\n", plan.name()));
    for child in plan.children() {
        fmt_physical(child, indent + 1, out);
    }
}
