//! Syntax-directed translation from one parsed statement to a logical plan.

use quiver_common::{QuiverError, Result};
use quiver_vector::{DataType, Field, Schema};
use sqlparser::ast::{
    AssignmentTarget, Distinct, Expr as SqlExpr, FromTable, GroupByExpr, Insert, JoinConstraint,
    JoinOperator, ObjectName, OrderByExpr, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor, TableWithJoins, Value as SqlValue,
};
use tracing::debug;

use crate::bind_context::BindContext;
use crate::binder::{
    convert_data_type, ensure_boolean, rewrite_for_aggregate, DeleteBinder, ExpressionBinder,
    InsertBinder, SelectBinder, UpdateBinder,
};
use crate::binding::{Binding, BindingType};
use crate::column_identifier::normalize_ident;
use crate::context::PlannerContext;
use crate::explain::explain_logical;
use crate::logical_plan::{Expr, JoinType, LogicalOperator, LogicalPlan, SortKey};
use crate::scalar::common_type;

/// Builds the logical plan for exactly one statement.
///
/// A planner instance is tied to one query context and holds at most one
/// plan; create a new planner per statement.
pub struct LogicalPlanner<'a> {
    ctx: &'a dyn PlannerContext,
    bind_context: BindContext,
    logical_plan: Option<LogicalPlan>,
}

enum OrderTarget {
    Position(usize),
    Expr(Expr),
}

impl<'a> LogicalPlanner<'a> {
    pub fn new(ctx: &'a dyn PlannerContext) -> Self {
        Self {
            ctx,
            bind_context: BindContext::new(),
            logical_plan: None,
        }
    }

    /// Plans a parsed request. Only single-statement requests are accepted.
    ///
    /// # Errors
    /// Planner error for zero or several statements.
    pub fn plan_statements(&mut self, statements: &[Statement]) -> Result<()> {
        match statements {
            [statement] => self.build(statement),
            [] => Err(QuiverError::Planner("no statement to plan".to_string())),
            _ => Err(QuiverError::Planner(
                "unsupported: multiple statements".to_string(),
            )),
        }
    }

    /// Binds and translates `statement`, keeping the result in this planner.
    pub fn build(&mut self, statement: &Statement) -> Result<()> {
        if self.logical_plan.is_some() {
            return Err(QuiverError::Planner(
                "logical planner already holds a plan".to_string(),
            ));
        }
        let mut bc = BindContext::new();
        let plan = self.build_statement(statement, &mut bc)?;
        debug!(plan = %explain_logical(&plan), "logical plan built");
        self.bind_context = bc;
        self.logical_plan = Some(plan);
        Ok(())
    }

    pub fn logical_plan(&self) -> Option<&LogicalPlan> {
        self.logical_plan.as_ref()
    }

    /// Bind context of the outermost query block of the built statement.
    pub fn bind_context(&self) -> &BindContext {
        &self.bind_context
    }

    pub fn into_logical_plan(self) -> Result<LogicalPlan> {
        self.logical_plan
            .ok_or_else(|| QuiverError::Planner("no statement has been built".to_string()))
    }

    fn node(&self, op: LogicalOperator) -> LogicalPlan {
        LogicalPlan::new(self.ctx.next_node_id(), op)
    }

    fn build_statement(&self, statement: &Statement, bc: &mut BindContext) -> Result<LogicalPlan> {
        match statement {
            Statement::Query(q) => self.build_query(q, bc),
            Statement::Insert(insert) => self.build_insert(insert, bc),
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                returning,
                ..
            } => {
                if from.is_some() || returning.is_some() {
                    return Err(QuiverError::Unsupported(
                        "UPDATE ... FROM / RETURNING is not supported".to_string(),
                    ));
                }
                self.build_update(table, assignments, selection.as_ref(), bc)
            }
            Statement::Delete(delete) => {
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
                };
                if delete.using.is_some() || delete.returning.is_some() {
                    return Err(QuiverError::Unsupported(
                        "DELETE ... USING / RETURNING is not supported".to_string(),
                    ));
                }
                match tables.as_slice() {
                    [table] => self.build_delete(table, delete.selection.as_ref(), bc),
                    _ => Err(QuiverError::Unsupported(
                        "DELETE from more than one table".to_string(),
                    )),
                }
            }
            Statement::CreateTable(create) => {
                if create.query.is_some() {
                    return Err(QuiverError::Unsupported(
                        "CREATE TABLE ... AS is not supported".to_string(),
                    ));
                }
                let table = object_table_name(&create.name)?;
                if self.ctx.table_schema(&table).is_ok() && !create.if_not_exists {
                    return Err(QuiverError::Planner(format!(
                        "relation \"{table}\" already exists"
                    )));
                }
                let mut fields: Vec<Field> = Vec::with_capacity(create.columns.len());
                for c in &create.columns {
                    let name = normalize_ident(&c.name);
                    if fields.iter().any(|f| f.name == name) {
                        return Err(QuiverError::Planner(format!(
                            "column \"{name}\" specified more than once"
                        )));
                    }
                    fields.push(Field::new(name, convert_data_type(&c.data_type)?));
                }
                Ok(self.node(LogicalOperator::CreateTable {
                    table,
                    table_index: bc.generate_table_index(),
                    schema: Schema::new(fields),
                    if_not_exists: create.if_not_exists,
                }))
            }
            Statement::Explain {
                statement, analyze, ..
            } => {
                if *analyze {
                    return Err(QuiverError::Unsupported(
                        "EXPLAIN ANALYZE is not supported".to_string(),
                    ));
                }
                let input = self.build_statement(statement, bc)?;
                let logical_text = explain_logical(&input);
                Ok(self.node(LogicalOperator::Explain {
                    table_index: bc.generate_table_index(),
                    logical_text,
                    input: Box::new(input),
                }))
            }
            other => Err(QuiverError::Unsupported(format!(
                "statement not supported: {}",
                statement_kind(other)
            ))),
        }
    }

    fn build_query(&self, q: &Query, bc: &mut BindContext) -> Result<LogicalPlan> {
        if q.with.is_some() {
            return Err(QuiverError::Unsupported("WITH is not supported".to_string()));
        }
        let order_by: &[OrderByExpr] = q.order_by.as_ref().map_or(&[], |o| o.exprs.as_slice());
        let (mut plan, visible) = match q.body.as_ref() {
            SetExpr::Select(select) => self.build_select(select, order_by, bc)?,
            SetExpr::Values(values) => {
                let mut binder = SelectBinder::new(self.ctx, bc.generate_table_index());
                binder.forbid_aggregates(Some("VALUES"));
                let plan = self.build_values(&values.rows, &mut binder, bc)?;
                self.order_by_output(plan, order_by)?
            }
            SetExpr::Query(inner) => {
                let plan = self.build_query(inner, bc)?;
                self.order_by_output(plan, order_by)?
            }
            _ => {
                return Err(QuiverError::Unsupported(
                    "set operations (UNION/EXCEPT/INTERSECT) are not supported".to_string(),
                ))
            }
        };

        let limit = q
            .limit
            .as_ref()
            .map(|e| literal_u64(e, "LIMIT"))
            .transpose()?;
        let offset = q
            .offset
            .as_ref()
            .map(|o| literal_u64(&o.value, "OFFSET"))
            .transpose()?
            .unwrap_or(0);
        if limit.is_some() || offset > 0 {
            plan = self.node(LogicalOperator::Limit {
                limit,
                offset,
                input: Box::new(plan),
            });
        }

        // Drop ORDER BY helper columns.
        let layout = plan.output_columns();
        if layout.len() > visible {
            let exprs = layout[..visible]
                .iter()
                .map(|c| (Expr::Column(c.clone()), c.name.clone()))
                .collect();
            plan = self.node(LogicalOperator::Projection {
                table_index: bc.generate_table_index(),
                exprs,
                input: Box::new(plan),
            });
        }
        Ok(plan)
    }

    /// ORDER BY for bodies without a select list: keys must name output
    /// columns by position or name.
    fn order_by_output(
        &self,
        plan: LogicalPlan,
        order_by: &[OrderByExpr],
    ) -> Result<(LogicalPlan, usize)> {
        let layout = plan.output_columns();
        let visible = layout.len();
        if order_by.is_empty() {
            return Ok((plan, visible));
        }
        let mut keys = Vec::with_capacity(order_by.len());
        for ob in order_by {
            let pos = match ordinal(&ob.expr) {
                Some(k) => checked_position(k, visible)?,
                None => match &ob.expr {
                    SqlExpr::Identifier(id) => {
                        let name = normalize_ident(id);
                        layout.iter().position(|c| c.name == name).ok_or_else(|| {
                            QuiverError::Bind(format!("column \"{name}\" does not exist"))
                        })?
                    }
                    other => {
                        return Err(QuiverError::Bind(format!(
                            "ORDER BY expression {other} must name an output column"
                        )))
                    }
                },
            };
            keys.push(sort_key(Expr::Column(layout[pos].clone()), ob));
        }
        let plan = self.node(LogicalOperator::Sort {
            keys,
            input: Box::new(plan),
        });
        Ok((plan, visible))
    }

    fn build_select(
        &self,
        s: &Select,
        order_by: &[OrderByExpr],
        bc: &mut BindContext,
    ) -> Result<(LogicalPlan, usize)> {
        let mut plan = self.build_from(&s.from, bc)?;
        let mut binder = SelectBinder::new(self.ctx, bc.generate_table_index());

        if let Some(selection) = &s.selection {
            binder.forbid_aggregates(Some("WHERE"));
            let predicate = binder.build_expression(selection, bc)?;
            ensure_boolean(&predicate, "WHERE")?;
            plan = self.node(LogicalOperator::Filter {
                predicate,
                input: Box::new(plan),
            });
        }

        binder.forbid_aggregates(None);
        let mut select_exprs: Vec<(Expr, String)> = Vec::new();
        for item in &s.projection {
            match item {
                SelectItem::UnnamedExpr(e) => {
                    let bound = binder.build_expression(e, bc)?;
                    select_exprs.push((bound, sql_output_name(e)));
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    let bound = binder.build_expression(expr, bc)?;
                    select_exprs.push((bound, normalize_ident(alias)));
                }
                SelectItem::Wildcard(_) => {
                    for c in bc.expand_star(None)? {
                        let name = c.name.clone();
                        select_exprs.push((Expr::Column(c), name));
                    }
                }
                SelectItem::QualifiedWildcard(qualifier, _) => {
                    let q = object_table_name(qualifier)?;
                    for c in bc.expand_star(Some(&q))? {
                        let name = c.name.clone();
                        select_exprs.push((Expr::Column(c), name));
                    }
                }
            }
        }

        let group_sql: Vec<&SqlExpr> = match &s.group_by {
            GroupByExpr::Expressions(exprs, _) => exprs.iter().collect(),
            GroupByExpr::All(_) => {
                return Err(QuiverError::Unsupported(
                    "GROUP BY ALL is not supported".to_string(),
                ))
            }
        };
        binder.forbid_aggregates(Some("GROUP BY"));
        let mut groups: Vec<Expr> = Vec::new();
        for g in group_sql {
            let bound = match ordinal(g) {
                Some(k) => {
                    let pos = checked_position(k, select_exprs.len())?;
                    let e = select_exprs[pos].0.clone();
                    if e.table_indices().contains(&binder.aggregate_index()) {
                        return Err(QuiverError::Bind(
                            "aggregate functions are not allowed in GROUP BY".to_string(),
                        ));
                    }
                    e
                }
                None => match binder.build_expression(g, bc) {
                    Ok(e) => e,
                    Err(QuiverError::Bind(msg)) => match g {
                        // GROUP BY may name a select-list alias.
                        SqlExpr::Identifier(id) => {
                            let name = normalize_ident(id);
                            select_exprs
                                .iter()
                                .find(|(e, n)| {
                                    *n == name
                                        && !e.table_indices().contains(&binder.aggregate_index())
                                })
                                .map(|(e, _)| e.clone())
                                .ok_or(QuiverError::Bind(msg))?
                        }
                        _ => return Err(QuiverError::Bind(msg)),
                    },
                    Err(e) => return Err(e),
                },
            };
            if !groups.contains(&bound) {
                groups.push(bound);
            }
        }
        binder.forbid_aggregates(None);

        let having = s
            .having
            .as_ref()
            .map(|h| binder.build_expression(h, bc))
            .transpose()?;

        let mut order_targets = Vec::with_capacity(order_by.len());
        for ob in order_by {
            let target = match ordinal(&ob.expr) {
                Some(k) => OrderTarget::Position(checked_position(k, select_exprs.len())?),
                None => {
                    let by_name = match &ob.expr {
                        SqlExpr::Identifier(id) => {
                            let name = normalize_ident(id);
                            select_exprs.iter().position(|(_, n)| *n == name)
                        }
                        _ => None,
                    };
                    match by_name {
                        Some(pos) => OrderTarget::Position(pos),
                        None => OrderTarget::Expr(binder.build_expression(&ob.expr, bc)?),
                    }
                }
            };
            order_targets.push((target, ob));
        }

        let aggregating = binder.has_aggregates() || !groups.is_empty() || having.is_some();
        if aggregating {
            let group_index = bc.generate_table_index();
            let aggregate_index = binder.aggregate_index();
            let aggregates = binder.take_aggregates();
            let rewrite = |e: Expr| rewrite_for_aggregate(e, &groups, group_index, aggregate_index);
            select_exprs = select_exprs
                .into_iter()
                .map(|(e, n)| -> Result<(Expr, String)> { Ok((rewrite(e)?, n)) })
                .collect::<Result<Vec<_>>>()?;
            let having = having.map(rewrite).transpose()?;
            for (target, _) in order_targets.iter_mut() {
                if let OrderTarget::Expr(e) = target {
                    *e = rewrite(e.clone())?;
                }
            }
            plan = self.node(LogicalOperator::Aggregate {
                group_index,
                aggregate_index,
                groups: groups.clone(),
                aggregates,
                input: Box::new(plan),
            });
            if let Some(predicate) = having {
                ensure_boolean(&predicate, "HAVING")?;
                plan = self.node(LogicalOperator::Filter {
                    predicate,
                    input: Box::new(plan),
                });
            }
        }

        let distinct = match &s.distinct {
            None => false,
            Some(Distinct::Distinct) => true,
            Some(Distinct::On(_)) => {
                return Err(QuiverError::Unsupported(
                    "DISTINCT ON is not supported".to_string(),
                ))
            }
        };

        let visible = select_exprs.len();
        let mut key_positions = Vec::with_capacity(order_targets.len());
        for (target, ob) in order_targets {
            let pos = match target {
                OrderTarget::Position(p) => p,
                OrderTarget::Expr(e) => match select_exprs.iter().position(|(se, _)| *se == e) {
                    Some(p) => p,
                    None if distinct => {
                        return Err(QuiverError::Bind(
                            "for SELECT DISTINCT, ORDER BY expressions must appear in select list"
                                .to_string(),
                        ))
                    }
                    None => {
                        let name = format!("__order{}", select_exprs.len() - visible);
                        select_exprs.push((e, name));
                        select_exprs.len() - 1
                    }
                },
            };
            key_positions.push((pos, ob));
        }

        plan = self.node(LogicalOperator::Projection {
            table_index: bc.generate_table_index(),
            exprs: select_exprs,
            input: Box::new(plan),
        });

        if distinct {
            let groups = plan
                .output_columns()
                .into_iter()
                .map(Expr::Column)
                .collect();
            plan = self.node(LogicalOperator::Aggregate {
                group_index: bc.generate_table_index(),
                aggregate_index: bc.generate_table_index(),
                groups,
                aggregates: Vec::new(),
                input: Box::new(plan),
            });
        }

        if !key_positions.is_empty() {
            let layout = plan.output_columns();
            let keys = key_positions
                .into_iter()
                .map(|(pos, ob)| sort_key(Expr::Column(layout[pos].clone()), ob))
                .collect();
            plan = self.node(LogicalOperator::Sort {
                keys,
                input: Box::new(plan),
            });
        }
        Ok((plan, visible))
    }

    fn build_from(&self, from: &[TableWithJoins], bc: &mut BindContext) -> Result<LogicalPlan> {
        if from.is_empty() {
            let table_index = bc.generate_table_index();
            let binding =
                Binding::make_binding(BindingType::Dummy, "dummy", table_index, vec![], vec![])?;
            bc.add_binding("__dummy", binding)?;
            return Ok(self.node(LogicalOperator::DummyScan { table_index }));
        }
        let mut plan: Option<LogicalPlan> = None;
        for twj in from {
            let item = self.build_table_with_joins(twj, bc)?;
            plan = Some(match plan {
                None => item,
                Some(left) => self.node(LogicalOperator::Join {
                    join_type: JoinType::Cross,
                    condition: None,
                    left: Box::new(left),
                    right: Box::new(item),
                }),
            });
        }
        plan.ok_or_else(|| QuiverError::Planner("empty FROM clause".to_string()))
    }

    fn build_table_with_joins(
        &self,
        twj: &TableWithJoins,
        bc: &mut BindContext,
    ) -> Result<LogicalPlan> {
        let mut plan = self.build_table_factor(&twj.relation, bc)?;
        for join in &twj.joins {
            let right = self.build_table_factor(&join.relation, bc)?;
            let (join_type, constraint) = match &join.join_operator {
                JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
                JoinOperator::LeftOuter(c) => (JoinType::Left, Some(c)),
                JoinOperator::FullOuter(c) => (JoinType::Full, Some(c)),
                JoinOperator::CrossJoin => (JoinType::Cross, None),
                other => {
                    return Err(QuiverError::Unsupported(format!(
                        "join operator {other:?} is not supported"
                    )))
                }
            };
            let condition = match constraint {
                Some(JoinConstraint::On(e)) => {
                    let mut binder = SelectBinder::new(self.ctx, bc.generate_table_index());
                    binder.forbid_aggregates(Some("JOIN conditions"));
                    let c = binder.build_expression(e, bc)?;
                    ensure_boolean(&c, "JOIN/ON")?;
                    Some(c)
                }
                Some(JoinConstraint::None) | None => None,
                Some(_) => {
                    return Err(QuiverError::Unsupported(
                        "JOIN ... USING and NATURAL JOIN are not supported".to_string(),
                    ))
                }
            };
            let join_type = match (join_type, &condition) {
                (JoinType::Inner, None) => JoinType::Cross,
                (JoinType::Left | JoinType::Full, None) => {
                    return Err(QuiverError::Bind(
                        "outer joins require an ON condition".to_string(),
                    ))
                }
                (t, _) => t,
            };
            plan = self.node(LogicalOperator::Join {
                join_type,
                condition,
                left: Box::new(plan),
                right: Box::new(right),
            });
        }
        Ok(plan)
    }

    fn build_table_factor(&self, tf: &TableFactor, bc: &mut BindContext) -> Result<LogicalPlan> {
        match tf {
            TableFactor::Table { name, alias, .. } => {
                let table = object_table_name(name)?;
                let schema = self.ctx.table_schema(&table)?;
                let table_index = bc.generate_table_index();
                let binding = Binding::make_binding(
                    BindingType::BaseTable,
                    table.clone(),
                    table_index,
                    schema.data_types(),
                    schema.names(),
                )?
                .with_table(table.clone());
                let alias = alias
                    .as_ref()
                    .map(|a| normalize_ident(&a.name))
                    .unwrap_or_else(|| table.clone());
                bc.add_binding(&alias, binding)?;
                Ok(self.node(LogicalOperator::TableScan {
                    table,
                    table_index,
                    schema,
                    projection: None,
                    filters: Vec::new(),
                }))
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
            } => {
                if *lateral {
                    return Err(QuiverError::Unsupported(
                        "LATERAL subqueries are not supported".to_string(),
                    ));
                }
                let mut child = bc.child();
                let sub = self.build_query(subquery, &mut child)?;
                let layout = sub.output_columns();
                let table_index = bc.generate_table_index();
                let alias = alias
                    .as_ref()
                    .map(|a| normalize_ident(&a.name))
                    .unwrap_or_else(|| format!("subquery{table_index}"));
                let binding = Binding::make_binding(
                    BindingType::Subquery,
                    alias.clone(),
                    table_index,
                    layout.iter().map(|c| c.data_type.clone()).collect(),
                    layout.iter().map(|c| c.name.clone()).collect(),
                )?;
                bc.add_binding(&alias, binding)?;
                let exprs = layout
                    .into_iter()
                    .map(|c| {
                        let name = c.name.clone();
                        (Expr::Column(c), name)
                    })
                    .collect();
                Ok(self.node(LogicalOperator::Projection {
                    table_index,
                    exprs,
                    input: Box::new(sub),
                }))
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias: None,
            } => self.build_table_with_joins(table_with_joins, bc),
            other => Err(QuiverError::Unsupported(format!(
                "table reference not supported: {other}"
            ))),
        }
    }

    fn build_values(
        &self,
        rows: &[Vec<SqlExpr>],
        binder: &mut dyn ExpressionBinder,
        bc: &mut BindContext,
    ) -> Result<LogicalPlan> {
        let width = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| QuiverError::Bind("VALUES requires at least one row".to_string()))?;
        let mut bound_rows: Vec<Vec<Expr>> = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != width {
                return Err(QuiverError::Bind(
                    "VALUES lists must all be the same length".to_string(),
                ));
            }
            bound_rows.push(
                row.iter()
                    .map(|e| binder.build_expression(e, bc))
                    .collect::<Result<Vec<_>>>()?,
            );
        }
        let mut types: Vec<DataType> = vec![DataType::null(); width];
        for row in &bound_rows {
            for (t, e) in types.iter_mut().zip(row) {
                *t = common_type(t, &e.data_type())?;
            }
        }
        let rows = bound_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&types)
                    .map(|(e, t)| {
                        if e.data_type() == *t {
                            e
                        } else {
                            Expr::Cast {
                                expr: Box::new(e),
                                to_type: t.clone(),
                            }
                        }
                    })
                    .collect()
            })
            .collect();
        Ok(self.node(LogicalOperator::Values {
            table_index: bc.generate_table_index(),
            names: (1..=width).map(|i| format!("column{i}")).collect(),
            types,
            rows,
        }))
    }

    fn build_insert(&self, insert: &Insert, bc: &mut BindContext) -> Result<LogicalPlan> {
        let table = object_table_name(&insert.table_name)?;
        let schema = self.ctx.table_schema(&table)?;
        let targets: Vec<usize> = if insert.columns.is_empty() {
            (0..schema.len()).collect()
        } else {
            let mut targets = Vec::with_capacity(insert.columns.len());
            for ident in &insert.columns {
                let name = normalize_ident(ident);
                let idx = schema.index_of(&name).ok_or_else(|| {
                    QuiverError::Bind(format!(
                        "column \"{name}\" of relation \"{table}\" does not exist"
                    ))
                })?;
                if targets.contains(&idx) {
                    return Err(QuiverError::Bind(format!(
                        "column \"{name}\" specified more than once"
                    )));
                }
                targets.push(idx);
            }
            targets
        };
        let source = insert.source.as_ref().ok_or_else(|| {
            QuiverError::Unsupported("INSERT without a source is not supported".to_string())
        })?;
        let input = match source.body.as_ref() {
            SetExpr::Values(values)
                if source.order_by.is_none() && source.limit.is_none() && source.offset.is_none() =>
            {
                let mut binder = InsertBinder::new(self.ctx);
                self.build_values(&values.rows, &mut binder, bc)?
            }
            _ => {
                let mut child = bc.child();
                self.build_query(source, &mut child)?
            }
        };
        let width = input.output_columns().len();
        if width > targets.len() {
            return Err(QuiverError::Bind(
                "INSERT has more expressions than target columns".to_string(),
            ));
        }
        if width < targets.len() {
            return Err(QuiverError::Bind(
                "INSERT has more target columns than expressions".to_string(),
            ));
        }
        let mut column_map = vec![None; schema.len()];
        for (src, &target) in targets.iter().enumerate() {
            column_map[target] = Some(src);
        }
        Ok(self.node(LogicalOperator::Insert {
            table,
            table_index: bc.generate_table_index(),
            column_map,
            table_schema: schema,
            input: Box::new(input),
        }))
    }

    fn base_table_scan(
        &self,
        twj: &TableWithJoins,
        statement: &str,
        bc: &mut BindContext,
    ) -> Result<LogicalPlan> {
        if !twj.joins.is_empty() || !matches!(twj.relation, TableFactor::Table { .. }) {
            return Err(QuiverError::Unsupported(format!(
                "{statement} target must be a single base table"
            )));
        }
        self.build_table_factor(&twj.relation, bc)
    }

    fn build_update(
        &self,
        target: &TableWithJoins,
        assignments: &[sqlparser::ast::Assignment],
        selection: Option<&SqlExpr>,
        bc: &mut BindContext,
    ) -> Result<LogicalPlan> {
        let scan = self.base_table_scan(target, "UPDATE", bc)?;
        let (table, schema) = match &scan.op {
            LogicalOperator::TableScan { table, schema, .. } => (table.clone(), schema.clone()),
            _ => return Err(QuiverError::Planner("UPDATE target is not a scan".to_string())),
        };
        let mut binder = UpdateBinder::new(self.ctx);
        let predicate = match selection {
            Some(s) => {
                let p = binder.build_expression(s, bc)?;
                ensure_boolean(&p, "WHERE")?;
                Some(p)
            }
            None => None,
        };
        let mut bound = Vec::with_capacity(assignments.len());
        for a in assignments {
            let column = match &a.target {
                AssignmentTarget::ColumnName(name) => object_table_name(name)?,
                AssignmentTarget::Tuple(_) => {
                    return Err(QuiverError::Unsupported(
                        "tuple assignments are not supported".to_string(),
                    ))
                }
            };
            let idx = schema.index_of(&column).ok_or_else(|| {
                QuiverError::Bind(format!(
                    "column \"{column}\" of relation \"{table}\" does not exist"
                ))
            })?;
            if bound.iter().any(|(i, _)| *i == idx) {
                return Err(QuiverError::Bind(format!(
                    "multiple assignments to same column \"{column}\""
                )));
            }
            bound.push((idx, binder.build_expression(&a.value, bc)?));
        }
        Ok(self.node(LogicalOperator::Update {
            table,
            table_index: bc.generate_table_index(),
            table_schema: schema,
            assignments: bound,
            predicate,
            input: Box::new(scan),
        }))
    }

    fn build_delete(
        &self,
        target: &TableWithJoins,
        selection: Option<&SqlExpr>,
        bc: &mut BindContext,
    ) -> Result<LogicalPlan> {
        let scan = self.base_table_scan(target, "DELETE", bc)?;
        let table = match &scan.op {
            LogicalOperator::TableScan { table, .. } => table.clone(),
            _ => return Err(QuiverError::Planner("DELETE target is not a scan".to_string())),
        };
        let mut binder = DeleteBinder::new(self.ctx);
        let predicate = match selection {
            Some(s) => {
                let p = binder.build_expression(s, bc)?;
                ensure_boolean(&p, "WHERE")?;
                Some(p)
            }
            None => None,
        };
        Ok(self.node(LogicalOperator::Delete {
            table,
            table_index: bc.generate_table_index(),
            predicate,
            input: Box::new(scan),
        }))
    }
}

fn sort_key(expr: Expr, ob: &OrderByExpr) -> SortKey {
    let ascending = ob.asc.unwrap_or(true);
    SortKey {
        expr,
        ascending,
        nulls_first: ob.nulls_first.unwrap_or(!ascending),
    }
}

/// Last component of a possibly-qualified object name.
fn object_table_name(name: &ObjectName) -> Result<String> {
    name.0
        .last()
        .map(normalize_ident)
        .ok_or_else(|| QuiverError::Bind("empty object name".to_string()))
}

fn sql_output_name(e: &SqlExpr) -> String {
    match e {
        SqlExpr::Identifier(id) => normalize_ident(id),
        SqlExpr::CompoundIdentifier(parts) => parts.last().map(normalize_ident).unwrap_or_default(),
        SqlExpr::Function(f) => f
            .name
            .0
            .last()
            .map(normalize_ident)
            .unwrap_or_default(),
        SqlExpr::Nested(inner) | SqlExpr::Cast { expr: inner, .. } => sql_output_name(inner),
        other => other.to_string(),
    }
}

fn ordinal(e: &SqlExpr) -> Option<usize> {
    match e {
        SqlExpr::Value(SqlValue::Number(s, _)) => s.parse::<usize>().ok(),
        _ => None,
    }
}

fn checked_position(k: usize, len: usize) -> Result<usize> {
    if k == 0 || k > len {
        return Err(QuiverError::Bind(format!(
            "position {k} is not in select list"
        )));
    }
    Ok(k - 1)
}

fn literal_u64(e: &SqlExpr, clause: &str) -> Result<u64> {
    match e {
        SqlExpr::Value(SqlValue::Number(s, _)) => s.parse::<u64>().map_err(|_| {
            QuiverError::Bind(format!("{clause} must be a non-negative integer, got {s}"))
        }),
        other => Err(QuiverError::Bind(format!(
            "{clause} must be a non-negative integer literal, got {other}"
        ))),
    }
}

fn statement_kind(s: &Statement) -> String {
    s.to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}
