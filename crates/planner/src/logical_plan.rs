use std::collections::HashSet;
use std::fmt;

use quiver_common::{NodeId, Result};
use quiver_vector::{DataType, Field, LogicalType, Schema, Value};

/// Column resolved against a binding: `(table_index, column_index)` plus the
/// name and type it had at binding time.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinding {
    pub table_index: usize,
    pub column_index: usize,
    pub name: String,
    pub data_type: DataType,
}

impl ColumnBinding {
    pub fn new(
        table_index: usize,
        column_index: usize,
        name: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            table_index,
            column_index,
            name: name.into(),
            data_type,
        }
    }

    pub fn key(&self) -> (usize, usize) {
        (self.table_index, self.column_index)
    }
}

/// Bound expression.
///
/// `Column` references a binding and is what the binder produces. The
/// physical planner rewrites every `Column` to a `ColumnRef` holding the
/// slot index in the operator's input block.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnBinding),
    ColumnRef {
        name: String,
        index: usize,
        data_type: DataType,
    },
    Literal(Value),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    Cast {
        expr: Box<Expr>,
        to_type: DataType,
    },
    ScalarFunction {
        name: String,
        args: Vec<Expr>,
        return_type: DataType,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Concat,
}

impl Expr {
    pub fn column(binding: ColumnBinding) -> Self {
        Expr::Column(binding)
    }

    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Expr::Column(c) => c.data_type.clone(),
            Expr::ColumnRef { data_type, .. } => data_type.clone(),
            Expr::Literal(v) => v.data_type().clone(),
            Expr::BinaryOp { left, op, right } => {
                op.output_type(&left.data_type(), &right.data_type())
            }
            Expr::And(..) | Expr::Or(..) | Expr::Not(_) | Expr::IsNull(_) | Expr::IsNotNull(_) => {
                DataType::boolean()
            }
            Expr::Cast { to_type, .. } => to_type.clone(),
            Expr::ScalarFunction { return_type, .. } => return_type.clone(),
        }
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::ColumnRef { .. } | Expr::Literal(_) => vec![],
            Expr::BinaryOp { left, right, .. } => vec![left, right],
            Expr::And(a, b) | Expr::Or(a, b) => vec![a, b],
            Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) | Expr::Cast { expr: e, .. } => {
                vec![e]
            }
            Expr::ScalarFunction { args, .. } => args.iter().collect(),
        }
    }

    /// Rebuilds this node with `f` applied to each direct child.
    pub fn map_children<F>(self, f: &mut F) -> Result<Expr>
    where
        F: FnMut(Expr) -> Result<Expr>,
    {
        Ok(match self {
            Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
                left: Box::new(f(*left)?),
                op,
                right: Box::new(f(*right)?),
            },
            Expr::And(a, b) => Expr::And(Box::new(f(*a)?), Box::new(f(*b)?)),
            Expr::Or(a, b) => Expr::Or(Box::new(f(*a)?), Box::new(f(*b)?)),
            Expr::Not(e) => Expr::Not(Box::new(f(*e)?)),
            Expr::IsNull(e) => Expr::IsNull(Box::new(f(*e)?)),
            Expr::IsNotNull(e) => Expr::IsNotNull(Box::new(f(*e)?)),
            Expr::Cast { expr, to_type } => Expr::Cast {
                expr: Box::new(f(*expr)?),
                to_type,
            },
            Expr::ScalarFunction {
                name,
                args,
                return_type,
            } => Expr::ScalarFunction {
                name,
                args: args.into_iter().map(&mut *f).collect::<Result<Vec<_>>>()?,
                return_type,
            },
            leaf => leaf,
        })
    }

    /// Rebuilds the tree bottom-up, applying `f` to every node after its children.
    pub fn transform_up<F>(self, f: &mut F) -> Result<Expr>
    where
        F: FnMut(Expr) -> Result<Expr>,
    {
        let rebuilt = self.map_children(&mut |c| c.transform_up(&mut *f))?;
        f(rebuilt)
    }

    /// Name an output column takes when this expression is projected.
    pub fn output_name(&self) -> String {
        match self {
            Expr::Column(c) => c.name.clone(),
            Expr::ColumnRef { name, .. } => name.clone(),
            other => other.to_string(),
        }
    }

    /// Every `Column` binding referenced by the expression.
    pub fn column_bindings(&self) -> Vec<&ColumnBinding> {
        let mut out = Vec::new();
        collect_columns(self, &mut out);
        out
    }

    /// Table indexes referenced by the expression.
    pub fn table_indices(&self) -> HashSet<usize> {
        self.column_bindings()
            .into_iter()
            .map(|c| c.table_index)
            .collect()
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(_))
    }
}

fn collect_columns<'a>(e: &'a Expr, out: &mut Vec<&'a ColumnBinding>) {
    if let Expr::Column(c) = e {
        out.push(c);
    }
    for child in e.children() {
        collect_columns(child, out);
    }
}

/// Splits a predicate into its top-level AND conjuncts.
pub fn split_conjuncts(e: Expr) -> Vec<Expr> {
    match e {
        Expr::And(a, b) => {
            let mut out = split_conjuncts(*a);
            out.extend(split_conjuncts(*b));
            out
        }
        other => vec![other],
    }
}

/// Inverse of [`split_conjuncts`]; `None` for an empty list.
pub fn combine_conjuncts(conjuncts: Vec<Expr>) -> Option<Expr> {
    conjuncts.into_iter().reduce(Expr::and)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{}#{}.{}", c.name, c.table_index, c.column_index),
            Expr::ColumnRef { name, index, .. } => write!(f, "{name}@{index}"),
            Expr::Literal(v) => match v.logical_type() {
                LogicalType::Varchar if !v.is_null() => write!(f, "'{v}'"),
                _ => write!(f, "{v}"),
            },
            Expr::BinaryOp { left, op, right } => write!(f, "({left} {op} {right})"),
            Expr::And(a, b) => write!(f, "({a} AND {b})"),
            Expr::Or(a, b) => write!(f, "({a} OR {b})"),
            Expr::Not(e) => write!(f, "NOT {e}"),
            Expr::IsNull(e) => write!(f, "{e} IS NULL"),
            Expr::IsNotNull(e) => write!(f, "{e} IS NOT NULL"),
            Expr::Cast { expr, to_type } => write!(f, "CAST({expr} AS {to_type})"),
            Expr::ScalarFunction { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Concat => "||",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            "avg" => Some(AggregateFunction::Avg),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::CountStar | AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
        }
    }

    /// Output type for an argument of type `arg`.
    pub fn return_type(self, arg: Option<&DataType>) -> DataType {
        match (self, arg) {
            (AggregateFunction::CountStar | AggregateFunction::Count, _) => DataType::bigint(),
            (AggregateFunction::Avg, _) => DataType::double(),
            (AggregateFunction::Sum, Some(t)) if t.logical_type() == LogicalType::Double => {
                DataType::double()
            }
            (AggregateFunction::Sum, _) => DataType::bigint(),
            (AggregateFunction::Min | AggregateFunction::Max, Some(t)) => t.clone(),
            (AggregateFunction::Min | AggregateFunction::Max, None) => DataType::null(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggregateFunction,
    pub arg: Option<Expr>,
    pub data_type: DataType,
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(a) => write!(f, "{}({a})", self.func.name()),
            None => write!(f, "{}(*)", self.func.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Full,
    Cross,
}

/// Tag of a logical operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalNodeType {
    TableScan,
    DummyScan,
    Values,
    Filter,
    Projection,
    Join,
    Aggregate,
    Sort,
    Limit,
    Insert,
    Update,
    Delete,
    CreateTable,
    Explain,
}

impl fmt::Display for LogicalNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Logical operator node: a stable id plus the operator itself. Children are
/// owned by the operator variants.
#[derive(Debug, Clone)]
pub struct LogicalPlan {
    pub id: NodeId,
    pub op: LogicalOperator,
}

#[derive(Debug, Clone)]
pub enum LogicalOperator {
    TableScan {
        table: String,
        table_index: usize,
        schema: Schema,
        /// Positions of the table columns to read; `None` reads all.
        projection: Option<Vec<usize>>,
        filters: Vec<Expr>,
    },
    /// Single row without columns, for FROM-less queries.
    DummyScan { table_index: usize },
    Values {
        table_index: usize,
        names: Vec<String>,
        types: Vec<DataType>,
        rows: Vec<Vec<Expr>>,
    },
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    Projection {
        table_index: usize,
        exprs: Vec<(Expr, String)>,
        input: Box<LogicalPlan>,
    },
    Join {
        join_type: JoinType,
        condition: Option<Expr>,
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
    },
    Aggregate {
        group_index: usize,
        aggregate_index: usize,
        groups: Vec<Expr>,
        aggregates: Vec<AggregateExpr>,
        input: Box<LogicalPlan>,
    },
    Sort {
        keys: Vec<SortKey>,
        input: Box<LogicalPlan>,
    },
    Limit {
        limit: Option<u64>,
        offset: u64,
        input: Box<LogicalPlan>,
    },
    Insert {
        table: String,
        table_index: usize,
        /// For every table column, the input column feeding it (`None` = NULL).
        column_map: Vec<Option<usize>>,
        table_schema: Schema,
        input: Box<LogicalPlan>,
    },
    Update {
        table: String,
        table_index: usize,
        table_schema: Schema,
        assignments: Vec<(usize, Expr)>,
        predicate: Option<Expr>,
        input: Box<LogicalPlan>,
    },
    Delete {
        table: String,
        table_index: usize,
        predicate: Option<Expr>,
        input: Box<LogicalPlan>,
    },
    CreateTable {
        table: String,
        table_index: usize,
        schema: Schema,
        if_not_exists: bool,
    },
    Explain {
        table_index: usize,
        /// Rendering of the plan before optimization.
        logical_text: String,
        input: Box<LogicalPlan>,
    },
}

/// Name and type of the single column writers report.
pub const WRITE_COUNT_COLUMN: &str = "count";
pub const EXPLAIN_COLUMN: &str = "plan";

impl LogicalPlan {
    pub fn new(id: NodeId, op: LogicalOperator) -> Self {
        Self { id, op }
    }

    pub fn node_type(&self) -> LogicalNodeType {
        match &self.op {
            LogicalOperator::TableScan { .. } => LogicalNodeType::TableScan,
            LogicalOperator::DummyScan { .. } => LogicalNodeType::DummyScan,
            LogicalOperator::Values { .. } => LogicalNodeType::Values,
            LogicalOperator::Filter { .. } => LogicalNodeType::Filter,
            LogicalOperator::Projection { .. } => LogicalNodeType::Projection,
            LogicalOperator::Join { .. } => LogicalNodeType::Join,
            LogicalOperator::Aggregate { .. } => LogicalNodeType::Aggregate,
            LogicalOperator::Sort { .. } => LogicalNodeType::Sort,
            LogicalOperator::Limit { .. } => LogicalNodeType::Limit,
            LogicalOperator::Insert { .. } => LogicalNodeType::Insert,
            LogicalOperator::Update { .. } => LogicalNodeType::Update,
            LogicalOperator::Delete { .. } => LogicalNodeType::Delete,
            LogicalOperator::CreateTable { .. } => LogicalNodeType::CreateTable,
            LogicalOperator::Explain { .. } => LogicalNodeType::Explain,
        }
    }

    pub fn children(&self) -> Vec<&LogicalPlan> {
        match &self.op {
            LogicalOperator::TableScan { .. }
            | LogicalOperator::DummyScan { .. }
            | LogicalOperator::Values { .. }
            | LogicalOperator::CreateTable { .. } => vec![],
            LogicalOperator::Filter { input, .. }
            | LogicalOperator::Projection { input, .. }
            | LogicalOperator::Aggregate { input, .. }
            | LogicalOperator::Sort { input, .. }
            | LogicalOperator::Limit { input, .. }
            | LogicalOperator::Insert { input, .. }
            | LogicalOperator::Update { input, .. }
            | LogicalOperator::Delete { input, .. }
            | LogicalOperator::Explain { input, .. } => vec![input],
            LogicalOperator::Join { left, right, .. } => vec![left, right],
        }
    }

    /// Output columns in block order.
    pub fn output_columns(&self) -> Vec<ColumnBinding> {
        match &self.op {
            LogicalOperator::TableScan {
                table_index,
                schema,
                projection,
                ..
            } => {
                let cols: Vec<usize> = match projection {
                    Some(p) => p.clone(),
                    None => (0..schema.len()).collect(),
                };
                cols.into_iter()
                    .filter_map(|i| {
                        schema.field(i).map(|f| {
                            ColumnBinding::new(*table_index, i, f.name.clone(), f.data_type.clone())
                        })
                    })
                    .collect()
            }
            LogicalOperator::DummyScan { .. } => vec![],
            LogicalOperator::Values {
                table_index,
                names,
                types,
                ..
            } => names
                .iter()
                .zip(types)
                .enumerate()
                .map(|(i, (n, t))| ColumnBinding::new(*table_index, i, n.clone(), t.clone()))
                .collect(),
            LogicalOperator::Filter { input, .. }
            | LogicalOperator::Sort { input, .. }
            | LogicalOperator::Limit { input, .. } => input.output_columns(),
            LogicalOperator::Projection {
                table_index, exprs, ..
            } => exprs
                .iter()
                .enumerate()
                .map(|(i, (e, name))| ColumnBinding::new(*table_index, i, name.clone(), e.data_type()))
                .collect(),
            LogicalOperator::Join { left, right, .. } => {
                let mut cols = left.output_columns();
                cols.extend(right.output_columns());
                cols
            }
            LogicalOperator::Aggregate {
                group_index,
                aggregate_index,
                groups,
                aggregates,
                ..
            } => {
                let mut cols: Vec<ColumnBinding> = groups
                    .iter()
                    .enumerate()
                    .map(|(i, g)| ColumnBinding::new(*group_index, i, g.output_name(), g.data_type()))
                    .collect();
                cols.extend(aggregates.iter().enumerate().map(|(i, a)| {
                    ColumnBinding::new(*aggregate_index, i, a.to_string(), a.data_type.clone())
                }));
                cols
            }
            LogicalOperator::Insert { table_index, .. }
            | LogicalOperator::Update { table_index, .. }
            | LogicalOperator::Delete { table_index, .. }
            | LogicalOperator::CreateTable { table_index, .. } => vec![ColumnBinding::new(
                *table_index,
                0,
                WRITE_COUNT_COLUMN,
                DataType::bigint(),
            )],
            LogicalOperator::Explain { table_index, .. } => vec![ColumnBinding::new(
                *table_index,
                0,
                EXPLAIN_COLUMN,
                DataType::varchar(),
            )],
        }
    }

    /// Output schema derived from [`LogicalPlan::output_columns`].
    pub fn schema(&self) -> Schema {
        Schema::new(
            self.output_columns()
                .into_iter()
                .map(|c| Field::new(c.name, c.data_type))
                .collect(),
        )
    }

    /// Table indexes produced by this subtree.
    pub fn table_indices(&self) -> HashSet<usize> {
        self.output_columns()
            .into_iter()
            .map(|c| c.table_index)
            .collect()
    }
}
