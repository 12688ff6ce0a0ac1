//! Expression compilation and evaluation for execution operators.
//!
//! Input contract:
//! - the physical planner has resolved every column to an `Expr::ColumnRef`
//!   slot in the operator's input block;
//! - unresolved `Expr::Column` nodes are rejected with an executor error.
//!
//! Output contract:
//! - each evaluation returns a [`ColumnVector`] answering every row of the
//!   input block. Inputs that are all constant produce a constant vector.

use std::sync::Arc;

use quiver_common::{QuiverError, Result};
use quiver_planner::scalar::{and3, bool_value, or3, truth_value};
use quiver_planner::{BinaryOp, Expr};
use quiver_vector::{ColumnVector, ColumnVectorType, DataBlock, DataType, LogicalType, Value};

use crate::udf::{FunctionRegistry, ScalarFunction};

/// Executable expression for the execution engine.
///
/// - planner produces `Expr` trees over `ColumnRef` slots
/// - execution compiles `Expr` -> `PhysicalExpr`
/// - evaluation returns a vector aligned with the input block's row count
pub trait PhysicalExpr: Send + Sync {
    /// Static output data type of this expression.
    fn data_type(&self) -> DataType;
    /// Evaluate the expression for every row in `block`.
    fn evaluate(&self, block: &DataBlock) -> Result<ColumnVector>;
}

/// Compile a planner `Expr` into a runnable expression over blocks whose
/// columns have `input_types`.
pub fn compile_expr(
    expr: &Expr,
    input_types: &[DataType],
    functions: &FunctionRegistry,
) -> Result<Arc<dyn PhysicalExpr>> {
    match expr {
        Expr::ColumnRef { name, index, .. } => {
            let dt = input_types.get(*index).cloned().ok_or_else(|| {
                QuiverError::Executor(format!(
                    "column {name} refers to slot {index} of an input with {} columns",
                    input_types.len()
                ))
            })?;
            Ok(Arc::new(ColumnExpr { index: *index, dt }))
        }
        Expr::Column(c) => Err(QuiverError::Executor(format!(
            "unresolved column {} reached execution",
            c.name
        ))),
        Expr::Literal(v) => Ok(Arc::new(LiteralExpr { v: v.clone() })),
        Expr::Cast { expr, to_type } => {
            let inner = compile_expr(expr, input_types, functions)?;
            Ok(Arc::new(CastExpr {
                inner,
                to_type: to_type.clone(),
            }))
        }
        Expr::Not(e) => {
            let inner = compile_expr(e, input_types, functions)?;
            Ok(Arc::new(NotExpr { inner }))
        }
        Expr::IsNull(e) | Expr::IsNotNull(e) => {
            let inner = compile_expr(e, input_types, functions)?;
            Ok(Arc::new(IsNullExpr {
                inner,
                negated: matches!(expr, Expr::IsNotNull(_)),
            }))
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            let left = compile_expr(a, input_types, functions)?;
            let right = compile_expr(b, input_types, functions)?;
            let op = if matches!(expr, Expr::And(..)) {
                BoolOp::And
            } else {
                BoolOp::Or
            };
            Ok(Arc::new(BoolBinaryExpr { left, right, op }))
        }
        Expr::BinaryOp { left, op, right } => {
            let l = compile_expr(left, input_types, functions)?;
            let r = compile_expr(right, input_types, functions)?;
            let out = op.output_type(&l.data_type(), &r.data_type());
            Ok(Arc::new(BinaryExpr {
                left: l,
                right: r,
                op: *op,
                out,
            }))
        }
        Expr::ScalarFunction {
            name,
            args,
            return_type,
        } => {
            let compiled_args = args
                .iter()
                .map(|a| compile_expr(a, input_types, functions))
                .collect::<Result<Vec<_>>>()?;
            let function = functions.get(name).ok_or_else(|| {
                QuiverError::Executor(format!(
                    "scalar function '{name}' is not registered in this session"
                ))
            })?;
            Ok(Arc::new(ScalarFunctionExpr {
                name: name.clone(),
                function,
                args: compiled_args,
                out: return_type.clone(),
            }))
        }
    }
}

/// Evaluates `exprs` against `block` and assembles the results as a new block.
pub fn evaluate_to_block(exprs: &[Arc<dyn PhysicalExpr>], block: &DataBlock) -> Result<DataBlock> {
    let columns = exprs
        .iter()
        .map(|e| e.evaluate(block))
        .collect::<Result<Vec<_>>>()?;
    DataBlock::new(columns, block.row_count())
}

/// Row positions where `predicate` evaluates to TRUE. NULL counts as false.
pub fn selected_rows(predicate: &dyn PhysicalExpr, block: &DataBlock) -> Result<Vec<usize>> {
    let mask = predicate.evaluate(block)?;
    let mut out = Vec::with_capacity(block.row_count());
    for row in 0..block.row_count() {
        if truth_value(&mask.value_at(row)?)? == Some(true) {
            out.push(row);
        }
    }
    Ok(out)
}

/// Applies `f` to the argument values of every row.
///
/// When all `args` are constant vectors, `f` runs once and the result is a
/// constant vector. An empty block yields an empty flat vector without
/// calling `f`.
pub fn map_rows<F>(
    args: &[ColumnVector],
    rows: usize,
    out: &DataType,
    mut f: F,
) -> Result<ColumnVector>
where
    F: FnMut(&[Value]) -> Result<Value>,
{
    if rows == 0 {
        return vector_from_values(out, Vec::new());
    }
    let all_constant = !args.is_empty() && args.iter().all(|a| a.is_constant());
    if all_constant {
        let vals = args
            .iter()
            .map(|a| a.value_at(0))
            .collect::<Result<Vec<_>>>()?;
        let v = coerce(f(&vals)?, out)?;
        return ColumnVector::constant(&v);
    }
    let mut values = Vec::with_capacity(rows);
    let mut scratch = Vec::with_capacity(args.len());
    for row in 0..rows {
        scratch.clear();
        for a in args {
            scratch.push(a.value_at(row)?);
        }
        values.push(f(&scratch)?);
    }
    vector_from_values(out, values)
}

/// Flat vector of `data_type` holding `values`. Values of another logical
/// type are cast; NULLs take the column type.
pub fn vector_from_values(data_type: &DataType, values: Vec<Value>) -> Result<ColumnVector> {
    let dt = if data_type.logical_type() == LogicalType::Null {
        values
            .iter()
            .find(|v| !v.is_null())
            .map(|v| v.data_type().clone())
            .unwrap_or_else(|| data_type.clone())
    } else {
        data_type.clone()
    };
    let values = values
        .into_iter()
        .map(|v| coerce(v, &dt))
        .collect::<Result<Vec<_>>>()?;
    ColumnVector::from_values(dt, &values)
}

fn coerce(v: Value, dt: &DataType) -> Result<Value> {
    if v.is_null() {
        return Ok(Value::null(dt.clone()));
    }
    if v.logical_type() == dt.logical_type() || dt.logical_type() == LogicalType::Null {
        Ok(v)
    } else {
        v.try_cast(dt)
    }
}

struct ColumnExpr {
    index: usize,
    dt: DataType,
}

impl PhysicalExpr for ColumnExpr {
    fn data_type(&self) -> DataType {
        self.dt.clone()
    }

    fn evaluate(&self, block: &DataBlock) -> Result<ColumnVector> {
        block.column(self.index).cloned().ok_or_else(|| {
            QuiverError::Executor(format!(
                "slot {} out of range for block with {} columns",
                self.index,
                block.column_count()
            ))
        })
    }
}

struct LiteralExpr {
    v: Value,
}

impl PhysicalExpr for LiteralExpr {
    fn data_type(&self) -> DataType {
        self.v.data_type().clone()
    }

    fn evaluate(&self, _block: &DataBlock) -> Result<ColumnVector> {
        ColumnVector::constant(&self.v)
    }
}

struct CastExpr {
    inner: Arc<dyn PhysicalExpr>,
    to_type: DataType,
}

impl PhysicalExpr for CastExpr {
    fn data_type(&self) -> DataType {
        self.to_type.clone()
    }

    fn evaluate(&self, block: &DataBlock) -> Result<ColumnVector> {
        let v = self.inner.evaluate(block)?;
        map_rows(&[v], block.row_count(), &self.to_type, |vals| {
            vals[0].try_cast(&self.to_type)
        })
    }
}

struct NotExpr {
    inner: Arc<dyn PhysicalExpr>,
}

impl PhysicalExpr for NotExpr {
    fn data_type(&self) -> DataType {
        DataType::boolean()
    }

    fn evaluate(&self, block: &DataBlock) -> Result<ColumnVector> {
        let v = self.inner.evaluate(block)?;
        map_rows(&[v], block.row_count(), &DataType::boolean(), |vals| {
            Ok(bool_value(truth_value(&vals[0])?.map(|b| !b)))
        })
    }
}

struct IsNullExpr {
    inner: Arc<dyn PhysicalExpr>,
    negated: bool,
}

impl PhysicalExpr for IsNullExpr {
    fn data_type(&self) -> DataType {
        DataType::boolean()
    }

    fn evaluate(&self, block: &DataBlock) -> Result<ColumnVector> {
        let v = self.inner.evaluate(block)?;
        map_rows(&[v], block.row_count(), &DataType::boolean(), |vals| {
            Ok(Value::make_bool(vals[0].is_null() != self.negated))
        })
    }
}

#[derive(Clone, Copy)]
enum BoolOp {
    And,
    Or,
}

struct BoolBinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BoolOp,
}

impl PhysicalExpr for BoolBinaryExpr {
    fn data_type(&self) -> DataType {
        DataType::boolean()
    }

    fn evaluate(&self, block: &DataBlock) -> Result<ColumnVector> {
        let l = self.left.evaluate(block)?;
        let r = self.right.evaluate(block)?;
        map_rows(&[l, r], block.row_count(), &DataType::boolean(), |vals| {
            let (a, b) = (truth_value(&vals[0])?, truth_value(&vals[1])?);
            Ok(bool_value(match self.op {
                BoolOp::And => and3(a, b),
                BoolOp::Or => or3(a, b),
            }))
        })
    }
}

struct BinaryExpr {
    left: Arc<dyn PhysicalExpr>,
    right: Arc<dyn PhysicalExpr>,
    op: BinaryOp,
    out: DataType,
}

impl PhysicalExpr for BinaryExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, block: &DataBlock) -> Result<ColumnVector> {
        let l = self.left.evaluate(block)?;
        let r = self.right.evaluate(block)?;
        map_rows(&[l, r], block.row_count(), &self.out, |vals| {
            self.op.evaluate(&vals[0], &vals[1])
        })
    }
}

struct ScalarFunctionExpr {
    name: String,
    function: Arc<dyn ScalarFunction>,
    args: Vec<Arc<dyn PhysicalExpr>>,
    out: DataType,
}

impl PhysicalExpr for ScalarFunctionExpr {
    fn data_type(&self) -> DataType {
        self.out.clone()
    }

    fn evaluate(&self, block: &DataBlock) -> Result<ColumnVector> {
        let vectors = self
            .args
            .iter()
            .map(|arg| arg.evaluate(block))
            .collect::<Result<Vec<_>>>()?;
        let out = self
            .function
            .invoke(&vectors, block.row_count())
            .map_err(|e| match e {
                QuiverError::Executor(msg) => {
                    QuiverError::Executor(format!("scalar function '{}' failed: {msg}", self.name))
                }
                other => other,
            })?;
        let expected = match out.vector_type() {
            ColumnVectorType::Constant => 1,
            ColumnVectorType::Flat => block.row_count(),
        };
        if out.size() != expected {
            return Err(QuiverError::Executor(format!(
                "scalar function '{}' returned {} values for {} rows",
                self.name,
                out.size(),
                block.row_count()
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::{compile_expr, selected_rows};
    use crate::udf::FunctionRegistry;
    use quiver_common::QuiverError;
    use quiver_planner::{BinaryOp, Expr};
    use quiver_vector::{DataBlock, DataType, Value};

    fn col(index: usize, dt: DataType) -> Expr {
        Expr::ColumnRef {
            name: format!("c{index}"),
            index,
            data_type: dt,
        }
    }

    fn block() -> DataBlock {
        DataBlock::from_rows(
            &[DataType::integer(), DataType::varchar()],
            &[
                vec![Value::make_int(1), Value::make_varchar("a")],
                vec![Value::null(DataType::integer()), Value::make_varchar("b")],
                vec![Value::make_int(3), Value::null(DataType::varchar())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn arithmetic_and_comparison_over_columns() {
        let f = FunctionRegistry::with_builtins();
        let types = [DataType::integer(), DataType::varchar()];
        let e = Expr::binary(
            col(0, DataType::integer()),
            BinaryOp::Plus,
            Expr::Literal(Value::make_int(10)),
        );
        let out = compile_expr(&e, &types, &f).unwrap().evaluate(&block()).unwrap();
        assert_eq!(
            out.values().unwrap(),
            vec![
                Value::make_int(11),
                Value::null(DataType::integer()),
                Value::make_int(13)
            ]
        );

        let pred = Expr::binary(
            col(0, DataType::integer()),
            BinaryOp::Gt,
            Expr::Literal(Value::make_int(1)),
        );
        let p = compile_expr(&pred, &types, &f).unwrap();
        assert_eq!(selected_rows(p.as_ref(), &block()).unwrap(), vec![2]);
    }

    #[test]
    fn three_valued_boolean_logic() {
        let f = FunctionRegistry::with_builtins();
        let types = [DataType::integer(), DataType::varchar()];
        let is_null = Expr::IsNull(Box::new(col(1, DataType::varchar())));
        let gt = Expr::binary(
            col(0, DataType::integer()),
            BinaryOp::Gt,
            Expr::Literal(Value::make_int(0)),
        );
        let e = Expr::Or(Box::new(is_null), Box::new(Expr::Not(Box::new(gt))));
        let out = compile_expr(&e, &types, &f).unwrap().evaluate(&block()).unwrap();
        assert_eq!(
            out.values().unwrap(),
            vec![
                Value::make_bool(false),
                Value::null(DataType::boolean()),
                Value::make_bool(true)
            ]
        );
    }

    #[test]
    fn constant_inputs_stay_constant() {
        let f = FunctionRegistry::with_builtins();
        let e = Expr::binary(
            Expr::Literal(Value::make_int(2)),
            BinaryOp::Multiply,
            Expr::Literal(Value::make_int(21)),
        );
        let out = compile_expr(&e, &[], &f)
            .unwrap()
            .evaluate(&DataBlock::empty_with_rows(4))
            .unwrap();
        assert!(out.is_constant());
        assert_eq!(out.value_at(3).unwrap(), Value::make_int(42));
    }

    #[test]
    fn runtime_errors_and_bad_slots() {
        let f = FunctionRegistry::with_builtins();
        let types = [DataType::integer(), DataType::varchar()];
        let e = Expr::binary(
            col(0, DataType::integer()),
            BinaryOp::Divide,
            Expr::Literal(Value::make_int(0)),
        );
        let err = compile_expr(&e, &types, &f)
            .unwrap()
            .evaluate(&block())
            .unwrap_err();
        assert!(matches!(err, QuiverError::Executor(_)));
        assert!(matches!(
            compile_expr(&col(5, DataType::integer()), &types, &f),
            Err(QuiverError::Executor(_))
        ));
    }

    #[test]
    fn functions_and_casts() {
        let f = FunctionRegistry::with_builtins();
        let types = [DataType::integer(), DataType::varchar()];
        let e = Expr::ScalarFunction {
            name: "upper".to_string(),
            args: vec![col(1, DataType::varchar())],
            return_type: DataType::varchar(),
        };
        let out = compile_expr(&e, &types, &f).unwrap().evaluate(&block()).unwrap();
        assert_eq!(out.value_at(1).unwrap(), Value::make_varchar("B"));
        assert!(out.value_at(2).unwrap().is_null());

        let cast = Expr::Cast {
            expr: Box::new(col(0, DataType::integer())),
            to_type: DataType::varchar(),
        };
        let out = compile_expr(&cast, &types, &f).unwrap().evaluate(&block()).unwrap();
        assert_eq!(out.value_at(2).unwrap(), Value::make_varchar("3"));
    }
}
