//! Scalar function registry and runtime interface.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use quiver_common::{QuiverError, Result};
use quiver_vector::{ColumnVector, DataType, LogicalType, Value};

use crate::expressions::map_rows;

/// Runtime scalar function contract.
pub trait ScalarFunction: Send + Sync {
    /// Stable lowercase function name used in SQL (`my_add`).
    fn name(&self) -> &str;
    /// Return type inference from bound argument types.
    ///
    /// # Errors
    /// Bind error when the argument list is not accepted.
    fn return_type(&self, arg_types: &[DataType]) -> Result<DataType>;
    /// Block-wise invocation. Every argument answers `rows` logical rows.
    fn invoke(&self, args: &[ColumnVector], rows: usize) -> Result<ColumnVector>;
}

/// Per-session function registry. Names are matched case-insensitively.
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, Arc<dyn ScalarFunction>>>,
}

impl FunctionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with `abs`, `lower`, `upper` and `length`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(Abs));
        registry.register(Arc::new(CaseMap { upper: false }));
        registry.register(Arc::new(CaseMap { upper: true }));
        registry.register(Arc::new(Length));
        registry
    }

    /// Register or replace a scalar function.
    ///
    /// Returns `true` when an existing function with same name was replaced.
    pub fn register(&self, function: Arc<dyn ScalarFunction>) -> bool {
        self.functions
            .write()
            .insert(function.name().to_ascii_lowercase(), function)
            .is_some()
    }

    /// Returns `true` when an existing function was removed.
    pub fn deregister(&self, name: &str) -> bool {
        self.functions
            .write()
            .remove(&name.to_ascii_lowercase())
            .is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScalarFunction>> {
        self.functions.read().get(&name.to_ascii_lowercase()).cloned()
    }

    /// Return type of `name` over `args`; unknown names are bind errors.
    pub fn return_type(&self, name: &str, args: &[DataType]) -> Result<DataType> {
        let function = self
            .get(name)
            .ok_or_else(|| QuiverError::Bind(format!("unknown function: {name}")))?;
        function.return_type(args)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

fn single_arg<'a>(name: &str, args: &'a [DataType]) -> Result<&'a DataType> {
    match args {
        [t] => Ok(t),
        _ => Err(QuiverError::Bind(format!(
            "function {name} expects 1 argument, got {}",
            args.len()
        ))),
    }
}

struct Abs;

impl ScalarFunction for Abs {
    fn name(&self) -> &str {
        "abs"
    }

    fn return_type(&self, arg_types: &[DataType]) -> Result<DataType> {
        let t = single_arg("abs", arg_types)?;
        if t.is_numeric() || t.logical_type() == LogicalType::Null {
            Ok(t.clone())
        } else {
            Err(QuiverError::Bind(format!("abs expects a numeric argument, got {t}")))
        }
    }

    fn invoke(&self, args: &[ColumnVector], rows: usize) -> Result<ColumnVector> {
        let arg = args
            .first()
            .ok_or_else(|| QuiverError::Executor("abs called without arguments".to_string()))?;
        let out = self.return_type(&[arg.data_type().clone()])?;
        map_rows(args, rows, &out, |vals| {
            let v = &vals[0];
            if v.is_null() {
                return Ok(Value::null(out.clone()));
            }
            if v.logical_type() == LogicalType::Double {
                let d = v.as_f64().unwrap_or_default();
                return Ok(Value::make_double(d.abs()));
            }
            let i = v
                .as_i64()
                .ok_or_else(|| QuiverError::Type(format!("abs cannot be applied to {v}")))?;
            let abs = i
                .checked_abs()
                .ok_or_else(|| QuiverError::Executor(format!("integer overflow in abs({i})")))?;
            Value::make_big_int(abs).try_cast(&out)
        })
    }
}

struct CaseMap {
    upper: bool,
}

impl ScalarFunction for CaseMap {
    fn name(&self) -> &str {
        if self.upper {
            "upper"
        } else {
            "lower"
        }
    }

    fn return_type(&self, arg_types: &[DataType]) -> Result<DataType> {
        let t = single_arg(self.name(), arg_types)?;
        match t.logical_type() {
            LogicalType::Varchar | LogicalType::Null => Ok(DataType::varchar()),
            _ => Err(QuiverError::Bind(format!(
                "{} expects a VARCHAR argument, got {t}",
                self.name()
            ))),
        }
    }

    fn invoke(&self, args: &[ColumnVector], rows: usize) -> Result<ColumnVector> {
        map_rows(args, rows, &DataType::varchar(), |vals| {
            Ok(match vals[0].as_str() {
                Some(s) if self.upper => Value::make_varchar(&s.to_uppercase()),
                Some(s) => Value::make_varchar(&s.to_lowercase()),
                None => Value::null(DataType::varchar()),
            })
        })
    }
}

struct Length;

impl ScalarFunction for Length {
    fn name(&self) -> &str {
        "length"
    }

    fn return_type(&self, arg_types: &[DataType]) -> Result<DataType> {
        let t = single_arg("length", arg_types)?;
        match t.logical_type() {
            LogicalType::Varchar | LogicalType::Blob | LogicalType::Null => Ok(DataType::bigint()),
            _ => Err(QuiverError::Bind(format!(
                "length expects VARCHAR or BLOB, got {t}"
            ))),
        }
    }

    fn invoke(&self, args: &[ColumnVector], rows: usize) -> Result<ColumnVector> {
        map_rows(args, rows, &DataType::bigint(), |vals| {
            let v = &vals[0];
            Ok(match (v.as_str(), v.as_varlen()) {
                (Some(s), _) => Value::make_big_int(s.chars().count() as i64),
                (None, Some(bytes)) => Value::make_big_int(bytes.len() as i64),
                _ => Value::null(DataType::bigint()),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{FunctionRegistry, ScalarFunction};
    use quiver_common::{QuiverError, Result};
    use quiver_vector::{ColumnVector, DataType, Value};

    fn eval(registry: &FunctionRegistry, name: &str, input: Vec<Value>) -> Vec<Value> {
        let dt = input[0].data_type().clone();
        let arg = ColumnVector::from_values(dt, &input).unwrap();
        registry
            .get(name)
            .unwrap()
            .invoke(&[arg], input.len())
            .unwrap()
            .values()
            .unwrap()
    }

    #[test]
    fn builtins_evaluate_row_by_row() {
        let r = FunctionRegistry::with_builtins();
        assert_eq!(
            eval(&r, "ABS", vec![Value::make_int(-3), Value::null(DataType::integer())]),
            vec![Value::make_int(3), Value::null(DataType::integer())]
        );
        assert_eq!(
            eval(&r, "upper", vec![Value::make_varchar("a long enough string")]),
            vec![Value::make_varchar("A LONG ENOUGH STRING")]
        );
        assert_eq!(
            eval(&r, "length", vec![Value::make_varchar("héllo")]),
            vec![Value::make_big_int(5)]
        );
    }

    #[test]
    fn return_types_are_checked() {
        let r = FunctionRegistry::with_builtins();
        assert_eq!(r.return_type("lower", &[DataType::varchar()]).unwrap(), DataType::varchar());
        assert!(matches!(
            r.return_type("lower", &[DataType::integer()]),
            Err(QuiverError::Bind(_))
        ));
        assert!(matches!(
            r.return_type("nope", &[]),
            Err(QuiverError::Bind(_))
        ));
    }

    struct Twice;

    impl ScalarFunction for Twice {
        fn name(&self) -> &str {
            "twice"
        }

        fn return_type(&self, _arg_types: &[DataType]) -> Result<DataType> {
            Ok(DataType::bigint())
        }

        fn invoke(&self, args: &[ColumnVector], rows: usize) -> Result<ColumnVector> {
            crate::expressions::map_rows(args, rows, &DataType::bigint(), |v| {
                Ok(Value::make_big_int(v[0].as_i64().unwrap_or_default() * 2))
            })
        }
    }

    #[test]
    fn register_replace_and_deregister() {
        let r = FunctionRegistry::new();
        assert!(!r.register(Arc::new(Twice)));
        assert!(r.register(Arc::new(Twice)));
        assert_eq!(r.names(), vec!["twice".to_string()]);
        assert!(r.deregister("TWICE"));
        assert!(!r.deregister("twice"));
        assert!(r.get("twice").is_none());
    }
}
