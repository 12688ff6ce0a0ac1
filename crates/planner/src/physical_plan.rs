use quiver_vector::Schema;

use crate::logical_plan::{AggregateExpr, Expr, JoinType, SortKey};

/// The physical operator graph.
///
/// Every expression below is slot-resolved: column references are
/// [`Expr::ColumnRef`] positions into the operator's input block (for joins,
/// into the concatenation of left and right blocks unless stated otherwise).
#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    /// Storage scan with pushed filters.
    TableScan(TableScanExec),
    /// One row, zero columns.
    DummyScan(DummyScanExec),
    /// Literal rows.
    Values(ValuesExec),
    /// Row filter.
    Filter(FilterExec),
    /// Projection.
    Project(ProjectExec),
    /// Equi-join; the right input is the build side.
    HashJoin(HashJoinExec),
    /// Join without equi-keys; the right input is materialized.
    NestedLoopJoin(NestedLoopJoinExec),
    /// Grouping aggregate.
    HashAggregate(HashAggregateExec),
    /// Full sort.
    Sort(SortExec),
    /// Limit/offset.
    Limit(LimitExec),
    /// Table writers.
    Insert(InsertExec),
    Update(UpdateExec),
    Delete(DeleteExec),
    CreateTable(CreateTableExec),
}

impl PhysicalPlan {
    /// Returns direct child operators.
    pub fn children(&self) -> Vec<&PhysicalPlan> {
        match self {
            PhysicalPlan::TableScan(_)
            | PhysicalPlan::DummyScan(_)
            | PhysicalPlan::Values(_)
            | PhysicalPlan::CreateTable(_) => vec![],
            PhysicalPlan::Filter(x) => vec![x.input.as_ref()],
            PhysicalPlan::Project(x) => vec![x.input.as_ref()],
            PhysicalPlan::HashJoin(x) => vec![x.left.as_ref(), x.right.as_ref()],
            PhysicalPlan::NestedLoopJoin(x) => vec![x.left.as_ref(), x.right.as_ref()],
            PhysicalPlan::HashAggregate(x) => vec![x.input.as_ref()],
            PhysicalPlan::Sort(x) => vec![x.input.as_ref()],
            PhysicalPlan::Limit(x) => vec![x.input.as_ref()],
            PhysicalPlan::Insert(x) => vec![x.input.as_ref()],
            PhysicalPlan::Update(x) => vec![x.input.as_ref()],
            PhysicalPlan::Delete(x) => vec![x.input.as_ref()],
        }
    }

    /// Output schema.
    pub fn schema(&self) -> &Schema {
        match self {
            PhysicalPlan::TableScan(x) => &x.schema,
            PhysicalPlan::DummyScan(x) => &x.schema,
            PhysicalPlan::Values(x) => &x.schema,
            PhysicalPlan::Filter(x) => &x.schema,
            PhysicalPlan::Project(x) => &x.schema,
            PhysicalPlan::HashJoin(x) => &x.schema,
            PhysicalPlan::NestedLoopJoin(x) => &x.schema,
            PhysicalPlan::HashAggregate(x) => &x.schema,
            PhysicalPlan::Sort(x) => &x.schema,
            PhysicalPlan::Limit(x) => &x.schema,
            PhysicalPlan::Insert(x) => &x.schema,
            PhysicalPlan::Update(x) => &x.schema,
            PhysicalPlan::Delete(x) => &x.schema,
            PhysicalPlan::CreateTable(x) => &x.schema,
        }
    }

    /// Operator name used in explain output and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalPlan::TableScan(_) => "TableScan",
            PhysicalPlan::DummyScan(_) => "DummyScan",
            PhysicalPlan::Values(_) => "Values",
            PhysicalPlan::Filter(_) => "Filter",
            PhysicalPlan::Project(_) => "Project",
            PhysicalPlan::HashJoin(_) => "HashJoin",
            PhysicalPlan::NestedLoopJoin(_) => "NestedLoopJoin",
            PhysicalPlan::HashAggregate(_) => "HashAggregate",
            PhysicalPlan::Sort(_) => "Sort",
            PhysicalPlan::Limit(_) => "Limit",
            PhysicalPlan::Insert(_) => "Insert",
            PhysicalPlan::Update(_) => "Update",
            PhysicalPlan::Delete(_) => "Delete",
            PhysicalPlan::CreateTable(_) => "CreateTable",
        }
    }

    /// True for writer operators, whose single output row is an affected-row count.
    pub fn is_writer(&self) -> bool {
        matches!(
            self,
            PhysicalPlan::Insert(_)
                | PhysicalPlan::Update(_)
                | PhysicalPlan::Delete(_)
                | PhysicalPlan::CreateTable(_)
        )
    }
}

/// Storage scan.
#[derive(Debug, Clone)]
pub struct TableScanExec {
    pub table: String,
    /// Full table schema as registered in the catalog.
    pub table_schema: Schema,
    /// Table column positions read, in output order.
    pub projection: Vec<usize>,
    /// Conjuncts resolved against the scan output.
    pub filters: Vec<Expr>,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct DummyScanExec {
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct ValuesExec {
    pub rows: Vec<Vec<Expr>>,
    /// Rows per emitted block.
    pub batch_rows: usize,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct FilterExec {
    pub predicate: Expr,
    pub input: Box<PhysicalPlan>,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct ProjectExec {
    /// (expr, output_name)
    pub exprs: Vec<(Expr, String)>,
    pub input: Box<PhysicalPlan>,
    pub schema: Schema,
}

/// Hash join. Probe rows stream from `left`; `right` is fully built first.
#[derive(Debug, Clone)]
pub struct HashJoinExec {
    /// `Inner` or `Left`.
    pub join_type: JoinType,
    /// Keys resolved against the left input alone.
    pub left_keys: Vec<Expr>,
    /// Keys resolved against the right input alone.
    pub right_keys: Vec<Expr>,
    /// Non-equi conjuncts, resolved against left ++ right.
    pub residual: Option<Expr>,
    pub left: Box<PhysicalPlan>,
    pub right: Box<PhysicalPlan>,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct NestedLoopJoinExec {
    /// `Inner`, `Left` or `Cross`.
    pub join_type: JoinType,
    pub condition: Option<Expr>,
    pub left: Box<PhysicalPlan>,
    pub right: Box<PhysicalPlan>,
    pub schema: Schema,
}

/// Hash aggregate: output is group keys followed by aggregate results.
#[derive(Debug, Clone)]
pub struct HashAggregateExec {
    pub groups: Vec<Expr>,
    pub aggregates: Vec<AggregateExpr>,
    pub batch_rows: usize,
    pub input: Box<PhysicalPlan>,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct SortExec {
    pub keys: Vec<SortKey>,
    pub batch_rows: usize,
    pub input: Box<PhysicalPlan>,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct LimitExec {
    pub limit: Option<u64>,
    pub offset: u64,
    pub input: Box<PhysicalPlan>,
    pub schema: Schema,
}

/// Appends input rows to `table`, reordering and casting per `column_map`.
#[derive(Debug, Clone)]
pub struct InsertExec {
    pub table: String,
    pub table_schema: Schema,
    pub column_map: Vec<Option<usize>>,
    pub input: Box<PhysicalPlan>,
    pub schema: Schema,
}

/// Rewrites `table` from a full scan, applying `assignments` where
/// `predicate` holds.
#[derive(Debug, Clone)]
pub struct UpdateExec {
    pub table: String,
    pub table_schema: Schema,
    pub assignments: Vec<(usize, Expr)>,
    pub predicate: Option<Expr>,
    pub input: Box<PhysicalPlan>,
    pub schema: Schema,
}

/// Rewrites `table` from a full scan, dropping rows where `predicate` holds.
#[derive(Debug, Clone)]
pub struct DeleteExec {
    pub table: String,
    pub table_schema: Schema,
    pub predicate: Option<Expr>,
    pub input: Box<PhysicalPlan>,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct CreateTableExec {
    pub table: String,
    pub table_schema: Schema,
    pub if_not_exists: bool,
    pub schema: Schema,
}
