//! Scalar semantics shared by constant folding and runtime evaluation.

use quiver_common::{QuiverError, Result};
use quiver_vector::{DataType, LogicalType, Value};

use crate::logical_plan::BinaryOp;

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }

    /// Validates operand types, failing with a bind error for combinations
    /// the operator does not accept.
    pub fn check_operands(self, left: &DataType, right: &DataType) -> Result<()> {
        let (l, r) = (left.logical_type(), right.logical_type());
        let ok = if l == LogicalType::Null || r == LogicalType::Null {
            true
        } else if self.is_comparison() {
            l == r || (l.is_numeric() && r.is_numeric())
        } else if self.is_arithmetic() {
            l.is_numeric() && r.is_numeric()
        } else {
            true
        };
        if ok {
            Ok(())
        } else {
            Err(QuiverError::Bind(format!(
                "operator {self} cannot be applied to {left} and {right}"
            )))
        }
    }

    /// Result type for operands of the given types. Assumes
    /// [`BinaryOp::check_operands`] accepted them.
    pub fn output_type(self, left: &DataType, right: &DataType) -> DataType {
        if self.is_comparison() {
            return DataType::boolean();
        }
        if self == BinaryOp::Concat {
            return DataType::varchar();
        }
        numeric_result_type(left, right)
    }

    /// Evaluates the operator on two scalars. NULL operands yield NULL.
    pub fn evaluate(self, left: &Value, right: &Value) -> Result<Value> {
        let out_type = self.output_type(left.data_type(), right.data_type());
        if left.is_null() || right.is_null() {
            return Ok(Value::null(out_type));
        }
        if self.is_comparison() {
            let ord = left.compare(right).ok_or_else(|| {
                QuiverError::Type(format!(
                    "cannot compare {} with {}",
                    left.data_type(),
                    right.data_type()
                ))
            })?;
            let b = match self {
                BinaryOp::Eq => ord.is_eq(),
                BinaryOp::NotEq => ord.is_ne(),
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::LtEq => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            return Ok(Value::make_bool(b));
        }
        if self == BinaryOp::Concat {
            return Ok(Value::make_varchar(&format!("{left}{right}")));
        }
        if out_type.logical_type() == LogicalType::Double {
            let (a, b) = match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(non_numeric(self, left, right)),
            };
            if matches!(self, BinaryOp::Divide | BinaryOp::Modulo) && b == 0.0 {
                return Err(QuiverError::Executor("division by zero".to_string()));
            }
            let v = match self {
                BinaryOp::Plus => a + b,
                BinaryOp::Minus => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                _ => a % b,
            };
            return Ok(Value::make_double(v));
        }
        let (a, b) = match (left.as_i64(), right.as_i64()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(non_numeric(self, left, right)),
        };
        if matches!(self, BinaryOp::Divide | BinaryOp::Modulo) && b == 0 {
            return Err(QuiverError::Executor("division by zero".to_string()));
        }
        let v = match self {
            BinaryOp::Plus => a.checked_add(b),
            BinaryOp::Minus => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide => a.checked_div(b),
            _ => a.checked_rem(b),
        }
        .ok_or_else(|| QuiverError::Executor(format!("integer overflow in {a} {self} {b}")))?;
        Value::make_big_int(v)
            .try_cast(&out_type)
            .map_err(|_| QuiverError::Executor(format!("integer out of range for {out_type}: {v}")))
    }
}

fn non_numeric(op: BinaryOp, left: &Value, right: &Value) -> QuiverError {
    QuiverError::Type(format!(
        "operator {op} cannot be applied to {} and {}",
        left.data_type(),
        right.data_type()
    ))
}

fn numeric_result_type(left: &DataType, right: &DataType) -> DataType {
    let (l, r) = (left.logical_type(), right.logical_type());
    match (l, r) {
        (LogicalType::Null, LogicalType::Null) => DataType::null(),
        (LogicalType::Null, _) => right.clone(),
        (_, LogicalType::Null) => left.clone(),
        (LogicalType::Double, _) | (_, LogicalType::Double) => DataType::double(),
        _ if l.element_width() >= r.element_width() => DataType::new(l),
        _ => DataType::new(r),
    }
}

/// Type both inputs can be converted to, used to unify VALUES columns.
pub fn common_type(a: &DataType, b: &DataType) -> Result<DataType> {
    let (l, r) = (a.logical_type(), b.logical_type());
    if a == b {
        return Ok(a.clone());
    }
    match (l, r) {
        (LogicalType::Null, _) => Ok(b.clone()),
        (_, LogicalType::Null) => Ok(a.clone()),
        _ if l == r => Ok(DataType::new(l)),
        _ if l.is_numeric() && r.is_numeric() => Ok(numeric_result_type(a, b)),
        _ => Err(QuiverError::Bind(format!(
            "types {a} and {b} cannot be matched"
        ))),
    }
}

/// Three-valued AND.
pub fn and3(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

/// Three-valued OR.
pub fn or3(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

/// Boolean view of a value: `None` for NULL, an error for non-booleans.
pub fn truth_value(v: &Value) -> Result<Option<bool>> {
    if v.is_null() {
        return Ok(None);
    }
    v.as_bool()
        .map(Some)
        .ok_or_else(|| QuiverError::Type(format!("expected BOOLEAN, got {}", v.data_type())))
}

pub fn bool_value(b: Option<bool>) -> Value {
    match b {
        Some(b) => Value::make_bool(b),
        None => Value::null(DataType::boolean()),
    }
}

#[cfg(test)]
mod tests {
    use super::{and3, common_type, or3};
    use crate::logical_plan::BinaryOp;
    use quiver_common::QuiverError;
    use quiver_vector::{DataType, LogicalType, Value};

    #[test]
    fn integer_arithmetic_keeps_width() {
        let v = BinaryOp::Plus
            .evaluate(&Value::make_int(2), &Value::make_int(3))
            .unwrap();
        assert_eq!(v.logical_type(), LogicalType::Integer);
        assert_eq!(v.as_i64(), Some(5));
        let v = BinaryOp::Divide
            .evaluate(&Value::make_int(7), &Value::make_big_int(2))
            .unwrap();
        assert_eq!(v.logical_type(), LogicalType::BigInt);
        assert_eq!(v.as_i64(), Some(3));
    }

    #[test]
    fn overflow_and_division_by_zero_fail() {
        assert!(matches!(
            BinaryOp::Plus.evaluate(&Value::make_int(i32::MAX), &Value::make_int(1)),
            Err(QuiverError::Executor(_))
        ));
        assert!(matches!(
            BinaryOp::Divide.evaluate(&Value::make_int(1), &Value::make_int(0)),
            Err(QuiverError::Executor(_))
        ));
    }

    #[test]
    fn comparisons_and_nulls() {
        let t = BinaryOp::Lt
            .evaluate(&Value::make_int(1), &Value::make_double(1.5))
            .unwrap();
        assert_eq!(t.as_bool(), Some(true));
        let n = BinaryOp::Eq
            .evaluate(&Value::make_int(1), &Value::null_literal())
            .unwrap();
        assert!(n.is_null());
        assert!(BinaryOp::Eq
            .check_operands(&DataType::integer(), &DataType::varchar())
            .is_err());
    }

    #[test]
    fn three_valued_logic() {
        assert_eq!(and3(None, Some(false)), Some(false));
        assert_eq!(and3(None, Some(true)), None);
        assert_eq!(or3(None, Some(true)), Some(true));
        assert_eq!(or3(Some(false), None), None);
    }

    #[test]
    fn common_types() {
        assert_eq!(
            common_type(&DataType::integer(), &DataType::double()).unwrap(),
            DataType::double()
        );
        assert_eq!(
            common_type(&DataType::null(), &DataType::varchar()).unwrap(),
            DataType::varchar()
        );
        assert!(common_type(&DataType::boolean(), &DataType::integer()).is_err());
    }
}
