//! Expression binders: turn parser expressions into bound [`Expr`] trees.
//!
//! All binders share [`bind_expr`]; each statement kind overrides only the
//! productions that differ (column references for INSERT, aggregate calls for
//! SELECT).

use quiver_common::{QuiverError, Result};
use quiver_vector::{DataType, LogicalType, Value, VarcharInfo};
use sqlparser::ast::{
    self, BinaryOperator as SqlBinaryOp, DuplicateTreatment, Expr as SqlExpr, FunctionArg,
    FunctionArgExpr, FunctionArguments, UnaryOperator, Value as SqlValue,
};

use crate::bind_context::BindContext;
use crate::column_identifier::{normalize_ident, ColumnIdentifier};
use crate::context::PlannerContext;
use crate::logical_plan::{AggregateExpr, AggregateFunction, BinaryOp, ColumnBinding, Expr};

/// Base contract of the binder family.
pub trait ExpressionBinder {
    /// Statement kind used in error messages.
    fn kind(&self) -> &'static str;

    fn planner_context(&self) -> &dyn PlannerContext;

    /// Binds `expr` against `bind_context`.
    ///
    /// # Errors
    /// Bind error for unresolved names or operand/arity violations.
    fn build_expression(&mut self, expr: &SqlExpr, bind_context: &BindContext) -> Result<Expr> {
        bind_expr(self, expr, bind_context)
    }

    fn bind_column_ref(&mut self, id: &ColumnIdentifier, bind_context: &BindContext) -> Result<Expr> {
        Ok(Expr::Column(bind_context.resolve_column(id)?))
    }

    fn bind_aggregate(
        &mut self,
        func: AggregateFunction,
        _args: &[FunctionArg],
        _bind_context: &BindContext,
    ) -> Result<Expr> {
        Err(QuiverError::Bind(format!(
            "aggregate function {} is not allowed in {}",
            func.name(),
            self.kind()
        )))
    }
}

/// Binder for SELECT blocks. Collects aggregate calls and replaces each with a
/// reference into the aggregate output.
pub struct SelectBinder<'a> {
    ctx: &'a dyn PlannerContext,
    aggregate_index: usize,
    aggregates: Vec<AggregateExpr>,
    forbidden_in: Option<&'static str>,
    in_aggregate: bool,
}

impl<'a> SelectBinder<'a> {
    pub fn new(ctx: &'a dyn PlannerContext, aggregate_index: usize) -> Self {
        Self {
            ctx,
            aggregate_index,
            aggregates: Vec::new(),
            forbidden_in: None,
            in_aggregate: false,
        }
    }

    /// Rejects aggregate calls while binding the named clause; `None` allows them.
    pub fn forbid_aggregates(&mut self, clause: Option<&'static str>) {
        self.forbidden_in = clause;
    }

    pub fn aggregate_index(&self) -> usize {
        self.aggregate_index
    }

    pub fn has_aggregates(&self) -> bool {
        !self.aggregates.is_empty()
    }

    pub fn take_aggregates(&mut self) -> Vec<AggregateExpr> {
        std::mem::take(&mut self.aggregates)
    }
}

impl ExpressionBinder for SelectBinder<'_> {
    fn kind(&self) -> &'static str {
        "SELECT"
    }

    fn planner_context(&self) -> &dyn PlannerContext {
        self.ctx
    }

    fn bind_aggregate(
        &mut self,
        func: AggregateFunction,
        args: &[FunctionArg],
        bind_context: &BindContext,
    ) -> Result<Expr> {
        if let Some(clause) = self.forbidden_in {
            return Err(QuiverError::Bind(format!(
                "aggregate functions are not allowed in {clause}"
            )));
        }
        if self.in_aggregate {
            return Err(QuiverError::Bind(
                "aggregate function calls cannot be nested".to_string(),
            ));
        }
        let (func, arg) = match (func, args) {
            (
                AggregateFunction::Count,
                [FunctionArg::Unnamed(FunctionArgExpr::Wildcard)],
            ) => (AggregateFunction::CountStar, None),
            (_, [FunctionArg::Unnamed(FunctionArgExpr::Expr(e))]) => {
                self.in_aggregate = true;
                let bound = bind_expr(self, e, bind_context);
                self.in_aggregate = false;
                (func, Some(bound?))
            }
            _ => {
                return Err(QuiverError::Bind(format!(
                    "function {}() expects exactly one argument",
                    func.name()
                )))
            }
        };
        if matches!(func, AggregateFunction::Sum | AggregateFunction::Avg) {
            if let Some(t) = arg.as_ref().map(Expr::data_type) {
                if !(t.is_numeric() || t.logical_type() == LogicalType::Null) {
                    return Err(QuiverError::Bind(format!(
                        "function {}({t}) does not exist",
                        func.name()
                    )));
                }
            }
        }
        let data_type = func.return_type(arg.as_ref().map(|a| a.data_type()).as_ref());
        let agg = AggregateExpr {
            func,
            arg,
            data_type: data_type.clone(),
        };
        let pos = match self.aggregates.iter().position(|a| *a == agg) {
            Some(p) => p,
            None => {
                self.aggregates.push(agg.clone());
                self.aggregates.len() - 1
            }
        };
        Ok(Expr::Column(ColumnBinding::new(
            self.aggregate_index,
            pos,
            agg.to_string(),
            data_type,
        )))
    }
}

/// Binder for INSERT ... VALUES rows. The target table is not in scope, so
/// column references are rejected.
pub struct InsertBinder<'a> {
    ctx: &'a dyn PlannerContext,
}

impl<'a> InsertBinder<'a> {
    pub fn new(ctx: &'a dyn PlannerContext) -> Self {
        Self { ctx }
    }
}

impl ExpressionBinder for InsertBinder<'_> {
    fn kind(&self) -> &'static str {
        "INSERT"
    }

    fn planner_context(&self) -> &dyn PlannerContext {
        self.ctx
    }

    fn bind_column_ref(&mut self, id: &ColumnIdentifier, _bind_context: &BindContext) -> Result<Expr> {
        Err(QuiverError::Bind(format!(
            "cannot use column reference \"{id}\" in INSERT VALUES"
        )))
    }
}

/// Binder for UPDATE SET values and WHERE.
pub struct UpdateBinder<'a> {
    ctx: &'a dyn PlannerContext,
}

impl<'a> UpdateBinder<'a> {
    pub fn new(ctx: &'a dyn PlannerContext) -> Self {
        Self { ctx }
    }
}

impl ExpressionBinder for UpdateBinder<'_> {
    fn kind(&self) -> &'static str {
        "UPDATE"
    }

    fn planner_context(&self) -> &dyn PlannerContext {
        self.ctx
    }
}

/// Binder for DELETE WHERE.
pub struct DeleteBinder<'a> {
    ctx: &'a dyn PlannerContext,
}

impl<'a> DeleteBinder<'a> {
    pub fn new(ctx: &'a dyn PlannerContext) -> Self {
        Self { ctx }
    }
}

impl ExpressionBinder for DeleteBinder<'_> {
    fn kind(&self) -> &'static str {
        "DELETE"
    }

    fn planner_context(&self) -> &dyn PlannerContext {
        self.ctx
    }
}

/// Shared production rules.
pub fn bind_expr<B>(binder: &mut B, expr: &SqlExpr, bc: &BindContext) -> Result<Expr>
where
    B: ExpressionBinder + ?Sized,
{
    match expr {
        SqlExpr::Identifier(ident) => {
            binder.bind_column_ref(&ColumnIdentifier::from_idents(std::slice::from_ref(ident))?, bc)
        }
        SqlExpr::CompoundIdentifier(parts) => {
            binder.bind_column_ref(&ColumnIdentifier::from_idents(parts)?, bc)
        }
        SqlExpr::Value(v) => Ok(Expr::Literal(literal_value(v)?)),
        SqlExpr::Nested(inner) => bind_expr(binder, inner, bc),
        SqlExpr::BinaryOp { left, op, right } => {
            let l = bind_expr(binder, left, bc)?;
            let r = bind_expr(binder, right, bc)?;
            bind_binary(l, op, r)
        }
        SqlExpr::UnaryOp { op, expr } => {
            let inner = bind_expr(binder, expr, bc)?;
            match op {
                UnaryOperator::Not => {
                    ensure_boolean(&inner, "NOT")?;
                    Ok(Expr::Not(Box::new(inner)))
                }
                UnaryOperator::Plus => {
                    ensure_numeric(&inner, "unary +")?;
                    Ok(inner)
                }
                UnaryOperator::Minus => negate(inner),
                other => Err(QuiverError::Unsupported(format!("unary operator {other}"))),
            }
        }
        SqlExpr::IsNull(e) => Ok(Expr::IsNull(Box::new(bind_expr(binder, e, bc)?))),
        SqlExpr::IsNotNull(e) => Ok(Expr::IsNotNull(Box::new(bind_expr(binder, e, bc)?))),
        SqlExpr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let e = bind_expr(binder, expr, bc)?;
            let lo = bind_expr(binder, low, bc)?;
            let hi = bind_expr(binder, high, bc)?;
            let ge = comparison(e.clone(), BinaryOp::GtEq, lo)?;
            let le = comparison(e, BinaryOp::LtEq, hi)?;
            let between = Expr::and(ge, le);
            Ok(if *negated {
                Expr::Not(Box::new(between))
            } else {
                between
            })
        }
        SqlExpr::InList {
            expr,
            list,
            negated,
        } => {
            let e = bind_expr(binder, expr, bc)?;
            let mut disjuncts = Vec::with_capacity(list.len());
            for item in list {
                let v = bind_expr(binder, item, bc)?;
                disjuncts.push(comparison(e.clone(), BinaryOp::Eq, v)?);
            }
            let any = disjuncts
                .into_iter()
                .reduce(|a, b| Expr::Or(Box::new(a), Box::new(b)))
                .ok_or_else(|| QuiverError::Bind("IN list must not be empty".to_string()))?;
            Ok(if *negated {
                Expr::Not(Box::new(any))
            } else {
                any
            })
        }
        SqlExpr::Cast {
            expr, data_type, ..
        } => {
            let inner = bind_expr(binder, expr, bc)?;
            Ok(Expr::Cast {
                expr: Box::new(inner),
                to_type: convert_data_type(data_type)?,
            })
        }
        SqlExpr::Function(func) => bind_function(binder, func, bc),
        other => Err(QuiverError::Unsupported(format!(
            "expression not supported: {other}"
        ))),
    }
}

fn bind_function<B>(binder: &mut B, func: &ast::Function, bc: &BindContext) -> Result<Expr>
where
    B: ExpressionBinder + ?Sized,
{
    if func.over.is_some() {
        return Err(QuiverError::Unsupported(
            "window functions are not supported".to_string(),
        ));
    }
    let name = func
        .name
        .0
        .last()
        .map(normalize_ident)
        .ok_or_else(|| QuiverError::Bind("function without a name".to_string()))?;
    let (args, distinct): (&[FunctionArg], bool) = match &func.args {
        FunctionArguments::None => (&[], false),
        FunctionArguments::List(list) => (
            &list.args,
            matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct)),
        ),
        FunctionArguments::Subquery(_) => {
            return Err(QuiverError::Unsupported(
                "subquery function arguments are not supported".to_string(),
            ))
        }
    };
    if let Some(agg) = AggregateFunction::from_name(&name) {
        if distinct {
            return Err(QuiverError::Unsupported(format!(
                "{name}(DISTINCT ...) is not supported"
            )));
        }
        return binder.bind_aggregate(agg, args, bc);
    }
    let mut bound = Vec::with_capacity(args.len());
    for a in args {
        match a {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => bound.push(bind_expr(binder, e, bc)?),
            other => {
                return Err(QuiverError::Bind(format!(
                    "unsupported argument {other} to function {name}"
                )))
            }
        }
    }
    let types: Vec<DataType> = bound.iter().map(Expr::data_type).collect();
    let return_type = binder.planner_context().scalar_function_type(&name, &types)?;
    Ok(Expr::ScalarFunction {
        name,
        args: bound,
        return_type,
    })
}

fn bind_binary(l: Expr, op: &SqlBinaryOp, r: Expr) -> Result<Expr> {
    let op = match op {
        SqlBinaryOp::And => {
            ensure_boolean(&l, "AND")?;
            ensure_boolean(&r, "AND")?;
            return Ok(Expr::and(l, r));
        }
        SqlBinaryOp::Or => {
            ensure_boolean(&l, "OR")?;
            ensure_boolean(&r, "OR")?;
            return Ok(Expr::Or(Box::new(l), Box::new(r)));
        }
        SqlBinaryOp::Eq => BinaryOp::Eq,
        SqlBinaryOp::NotEq => BinaryOp::NotEq,
        SqlBinaryOp::Lt => BinaryOp::Lt,
        SqlBinaryOp::LtEq => BinaryOp::LtEq,
        SqlBinaryOp::Gt => BinaryOp::Gt,
        SqlBinaryOp::GtEq => BinaryOp::GtEq,
        SqlBinaryOp::Plus => BinaryOp::Plus,
        SqlBinaryOp::Minus => BinaryOp::Minus,
        SqlBinaryOp::Multiply => BinaryOp::Multiply,
        SqlBinaryOp::Divide => BinaryOp::Divide,
        SqlBinaryOp::Modulo => BinaryOp::Modulo,
        SqlBinaryOp::StringConcat => BinaryOp::Concat,
        other => {
            return Err(QuiverError::Unsupported(format!(
                "binary operator {other} is not supported"
            )))
        }
    };
    comparison(l, op, r)
}

/// Builds `l op r` after checking operand types.
fn comparison(l: Expr, op: BinaryOp, r: Expr) -> Result<Expr> {
    op.check_operands(&l.data_type(), &r.data_type())?;
    Ok(Expr::binary(l, op, r))
}

fn negate(e: Expr) -> Result<Expr> {
    ensure_numeric(&e, "unary -")?;
    if let Expr::Literal(v) = &e {
        let negated = match v.as_i64() {
            Some(i) if v.logical_type() == LogicalType::Integer => {
                (i as i32).checked_neg().map(Value::make_int)
            }
            Some(i) => i.checked_neg().map(Value::make_big_int),
            None => v.as_f64().map(|f| Value::make_double(-f)),
        };
        if let Some(n) = negated {
            return Ok(Expr::Literal(n));
        }
    }
    let zero = Expr::Literal(Value::make_int(0));
    comparison(zero, BinaryOp::Minus, e)
}

pub fn ensure_boolean(e: &Expr, clause: &str) -> Result<()> {
    match e.data_type().logical_type() {
        LogicalType::Boolean | LogicalType::Null => Ok(()),
        _ => Err(QuiverError::Bind(format!(
            "argument of {clause} must be type BOOLEAN, not type {}",
            e.data_type()
        ))),
    }
}

fn ensure_numeric(e: &Expr, what: &str) -> Result<()> {
    let t = e.data_type();
    if t.is_numeric() || t.logical_type() == LogicalType::Null {
        Ok(())
    } else {
        Err(QuiverError::Bind(format!("{what} cannot be applied to type {t}")))
    }
}

/// Converts a parser literal to a typed value. Integers that fit 32 bits
/// become INTEGER, larger ones BIGINT; anything with a fraction or exponent
/// becomes DOUBLE.
pub fn literal_value(v: &SqlValue) -> Result<Value> {
    match v {
        SqlValue::Number(s, _) => {
            if let Ok(i) = s.parse::<i64>() {
                Ok(match i32::try_from(i) {
                    Ok(small) => Value::make_int(small),
                    Err(_) => Value::make_big_int(i),
                })
            } else {
                s.parse::<f64>()
                    .map(Value::make_double)
                    .map_err(|_| QuiverError::Bind(format!("invalid numeric literal: {s}")))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(Value::make_varchar(s))
        }
        SqlValue::Boolean(b) => Ok(Value::make_bool(*b)),
        SqlValue::Null => Ok(Value::null_literal()),
        other => Err(QuiverError::Unsupported(format!("literal {other}"))),
    }
}

/// Maps a SQL type name to an engine type.
pub fn convert_data_type(dt: &ast::DataType) -> Result<DataType> {
    let text = dt.to_string().to_ascii_uppercase();
    let (base, args) = match text.find('(') {
        Some(p) => (text[..p].trim(), Some(text[p + 1..].trim_end_matches(')').trim())),
        None => (text.trim(), None),
    };
    let logical = match base {
        "BOOLEAN" | "BOOL" => LogicalType::Boolean,
        "TINYINT" => LogicalType::TinyInt,
        "SMALLINT" | "INT2" => LogicalType::SmallInt,
        "INT" | "INTEGER" | "INT4" => LogicalType::Integer,
        "BIGINT" | "INT8" => LogicalType::BigInt,
        "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" | "FLOAT4" | "FLOAT8" | "REAL" | "DECIMAL"
        | "NUMERIC" => LogicalType::Double,
        "VARCHAR" | "CHARACTER VARYING" | "CHAR" | "CHARACTER" | "TEXT" | "STRING" => {
            LogicalType::Varchar
        }
        "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" => LogicalType::Blob,
        _ => return Err(QuiverError::Unsupported(format!("data type {dt}"))),
    };
    if logical == LogicalType::Varchar {
        if let Some(len) = args.and_then(|a| a.parse::<u32>().ok()) {
            return Ok(DataType::varchar_with(VarcharInfo::new(len)));
        }
    }
    Ok(DataType::new(logical))
}

/// Rewrites an expression bound below an aggregate so it reads the aggregate
/// output: subtrees equal to a GROUP BY expression become group columns and
/// any remaining base column is an error.
pub fn rewrite_for_aggregate(
    expr: Expr,
    groups: &[Expr],
    group_index: usize,
    aggregate_index: usize,
) -> Result<Expr> {
    if let Some(pos) = groups.iter().position(|g| *g == expr) {
        return Ok(Expr::Column(ColumnBinding::new(
            group_index,
            pos,
            expr.output_name(),
            expr.data_type(),
        )));
    }
    match expr {
        Expr::Column(c) if c.table_index == aggregate_index => Ok(Expr::Column(c)),
        Expr::Column(c) => Err(QuiverError::Bind(format!(
            "column \"{}\" must appear in the GROUP BY clause or be used in an aggregate function",
            c.name
        ))),
        other => other.map_children(&mut |child| {
            rewrite_for_aggregate(child, groups, group_index, aggregate_index)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{convert_data_type, literal_value, rewrite_for_aggregate};
    use crate::logical_plan::{BinaryOp, ColumnBinding, Expr};
    use quiver_common::QuiverError;
    use quiver_vector::{DataType, LogicalType, Value, VarcharInfo};
    use sqlparser::ast::{DataType as SqlDataType, Value as SqlValue};

    #[test]
    fn numeric_literals_pick_narrowest_type() {
        let v = literal_value(&SqlValue::Number("42".to_string(), false)).unwrap();
        assert_eq!(v.logical_type(), LogicalType::Integer);
        let v = literal_value(&SqlValue::Number("5000000000".to_string(), false)).unwrap();
        assert_eq!(v.logical_type(), LogicalType::BigInt);
        let v = literal_value(&SqlValue::Number("1.25".to_string(), false)).unwrap();
        assert_eq!(v, Value::make_double(1.25));
    }

    #[test]
    fn sql_types_map_to_engine_types() {
        assert_eq!(convert_data_type(&SqlDataType::Int(None)).unwrap(), DataType::integer());
        assert_eq!(convert_data_type(&SqlDataType::BigInt(None)).unwrap(), DataType::bigint());
        assert_eq!(convert_data_type(&SqlDataType::Text).unwrap(), DataType::varchar());
        assert_eq!(convert_data_type(&SqlDataType::Boolean).unwrap(), DataType::boolean());
        let v = convert_data_type(&SqlDataType::Varchar(Some(
            sqlparser::ast::CharacterLength::IntegerLength {
                length: 65,
                unit: None,
            },
        )))
        .unwrap();
        assert_eq!(v, DataType::varchar_with(VarcharInfo::new(65)));
    }

    #[test]
    fn aggregate_rewrite_maps_groups_and_rejects_loose_columns() {
        let a = Expr::Column(ColumnBinding::new(0, 0, "a", DataType::integer()));
        let b = Expr::Column(ColumnBinding::new(0, 1, "b", DataType::integer()));
        let agg = Expr::Column(ColumnBinding::new(5, 0, "sum(b)", DataType::bigint()));
        let e = Expr::binary(a.clone(), BinaryOp::Plus, agg.clone());
        let out = rewrite_for_aggregate(e, &[a.clone()], 6, 5).unwrap();
        let keys: Vec<_> = out.column_bindings().iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec![(6, 0), (5, 0)]);
        assert!(matches!(
            rewrite_for_aggregate(b, &[a], 6, 5),
            Err(QuiverError::Bind(_))
        ));
    }
}
