//! Pipeline builder.
//!
//! A physical plan is cut at pipeline breakers (hash aggregate, sort, the
//! build side of a hash join, the inner side of a nested-loop join, and table
//! writers). Each cut yields a [`Stage`]: a source, a chain of streaming
//! operators, and a sink that materializes the stage output. A stage lists
//! the producer stages it waits on in `children` and its consumers in
//! `parents`. Stage 0 is the root; its output is the query result.

use std::fmt;
use std::sync::Arc;

use futures::channel::oneshot;
use parking_lot::Mutex;
use quiver_common::{QuiverError, Result, StageId};
use quiver_planner::{AggregateExpr, Expr, JoinType, PhysicalPlan, SortKey};
use quiver_vector::{DataBlock, DataType, ResultTable, Schema};

/// Where a stage reads its input blocks from.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    TableScan {
        table: String,
        /// Table column positions read, in output order.
        projection: Vec<usize>,
        /// Conjuncts over the scan output.
        filters: Vec<Expr>,
        types: Vec<DataType>,
    },
    /// One row without columns.
    DummyScan,
    Values {
        rows: Vec<Vec<Expr>>,
        types: Vec<DataType>,
        batch_rows: usize,
    },
    /// Blocks materialized by another stage.
    StageOutput(StageId),
}

/// Streaming operator applied to every block of a stage.
#[derive(Debug, Clone)]
pub enum OperatorSpec {
    Filter {
        predicate: Expr,
        input_types: Vec<DataType>,
    },
    Project {
        exprs: Vec<Expr>,
        input_types: Vec<DataType>,
    },
    Limit {
        limit: Option<u64>,
        offset: u64,
    },
    /// Probe side of a hash join; `build` holds the hash table.
    HashProbe {
        build: StageId,
        join_type: JoinType,
        left_keys: Vec<Expr>,
        residual: Option<Expr>,
        left_types: Vec<DataType>,
        right_types: Vec<DataType>,
    },
    /// Outer side of a nested-loop join; `inner` holds the materialized rows.
    NestedLoop {
        inner: StageId,
        join_type: JoinType,
        condition: Option<Expr>,
        left_types: Vec<DataType>,
        right_types: Vec<DataType>,
    },
}

/// Terminal operator of a stage.
#[derive(Debug, Clone)]
pub enum SinkSpec {
    /// Keeps blocks as they arrive.
    Collect,
    HashBuild {
        keys: Vec<Expr>,
        types: Vec<DataType>,
    },
    HashAggregate {
        groups: Vec<Expr>,
        aggregates: Vec<AggregateExpr>,
        input_types: Vec<DataType>,
        output_types: Vec<DataType>,
        batch_rows: usize,
    },
    Sort {
        keys: Vec<SortKey>,
        input_types: Vec<DataType>,
        batch_rows: usize,
    },
    Insert {
        table: String,
        column_map: Vec<Option<usize>>,
        table_types: Vec<DataType>,
    },
    Update {
        table: String,
        assignments: Vec<(usize, Expr)>,
        predicate: Option<Expr>,
        table_types: Vec<DataType>,
    },
    Delete {
        table: String,
        predicate: Option<Expr>,
        table_types: Vec<DataType>,
    },
    CreateTable {
        table: String,
        schema: Schema,
        if_not_exists: bool,
    },
}

impl SourceSpec {
    pub fn name(&self) -> &'static str {
        match self {
            SourceSpec::TableScan { .. } => "TableScan",
            SourceSpec::DummyScan => "DummyScan",
            SourceSpec::Values { .. } => "Values",
            SourceSpec::StageOutput(_) => "StageOutput",
        }
    }
}

impl OperatorSpec {
    pub fn name(&self) -> &'static str {
        match self {
            OperatorSpec::Filter { .. } => "Filter",
            OperatorSpec::Project { .. } => "Project",
            OperatorSpec::Limit { .. } => "Limit",
            OperatorSpec::HashProbe { .. } => "HashJoinProbe",
            OperatorSpec::NestedLoop { .. } => "NestedLoopJoin",
        }
    }
}

impl SinkSpec {
    pub fn name(&self) -> &'static str {
        match self {
            SinkSpec::Collect => "Collect",
            SinkSpec::HashBuild { .. } => "HashJoinBuild",
            SinkSpec::HashAggregate { .. } => "HashAggregate",
            SinkSpec::Sort { .. } => "Sort",
            SinkSpec::Insert { .. } => "Insert",
            SinkSpec::Update { .. } => "Update",
            SinkSpec::Delete { .. } => "Delete",
            SinkSpec::CreateTable { .. } => "CreateTable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub id: StageId,
    pub source: SourceSpec,
    pub operators: Vec<OperatorSpec>,
    pub sink: SinkSpec,
    /// Stages consuming this stage's output.
    pub parents: Vec<StageId>,
    /// Stages that must complete before this one starts.
    pub children: Vec<StageId>,
}

impl Stage {
    /// Operator names from source to sink.
    pub fn operator_names(&self) -> Vec<&'static str> {
        let mut names = vec![self.source.name()];
        names.extend(self.operators.iter().map(|o| o.name()));
        names.push(self.sink.name());
        names
    }
}

type ResultSender = oneshot::Sender<Result<Vec<DataBlock>>>;
type ResultReceiver = oneshot::Receiver<Result<Vec<DataBlock>>>;

/// Stage graph for one physical plan plus the handle its result arrives on.
pub struct Pipeline {
    stages: Arc<Vec<Stage>>,
    schema: Schema,
    result_tx: Mutex<Option<ResultSender>>,
    result_rx: Mutex<Option<ResultReceiver>>,
}

impl Pipeline {
    /// Partitions `plan` into stages at pipeline breakers.
    pub fn create(plan: &PhysicalPlan) -> Result<Self> {
        let mut stages = Vec::new();
        let root = plan_stage(plan, &mut stages)?;
        debug_assert_eq!(root, StageId(0));
        let (tx, rx) = oneshot::channel();
        Ok(Self {
            stages: Arc::new(stages),
            schema: plan.schema().clone(),
            result_tx: Mutex::new(Some(tx)),
            result_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn root_id(&self) -> StageId {
        StageId(0)
    }

    /// Output schema of the root stage.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn shared_stages(&self) -> Arc<Vec<Stage>> {
        Arc::clone(&self.stages)
    }

    pub(crate) fn take_result_sender(&self) -> Result<ResultSender> {
        self.result_tx
            .lock()
            .take()
            .ok_or_else(|| QuiverError::Executor("pipeline was already scheduled".to_string()))
    }

    /// Blocks until the scheduler has delivered the root stage output or the
    /// query has failed. The result can be taken once.
    pub fn get_result(&self) -> Result<ResultTable> {
        if self.result_tx.lock().is_some() {
            return Err(QuiverError::Executor(
                "pipeline has not been scheduled".to_string(),
            ));
        }
        let rx = self
            .result_rx
            .lock()
            .take()
            .ok_or_else(|| QuiverError::Executor("pipeline result already taken".to_string()))?;
        let blocks = futures::executor::block_on(rx).map_err(|_| {
            QuiverError::Executor("pipeline was dropped before completing".to_string())
        })??;
        Ok(ResultTable::new(self.schema.clone(), blocks))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .field("schema", &self.schema)
            .finish()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stage in self.stages.iter() {
            write!(f, "stage {}: {}", stage.id, stage.operator_names().join(" -> "))?;
            if !stage.children.is_empty() {
                let deps: Vec<String> = stage.children.iter().map(|c| c.to_string()).collect();
                write!(f, " (after {})", deps.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn new_stage(stages: &mut Vec<Stage>, sink: SinkSpec) -> StageId {
    let id = StageId(stages.len());
    stages.push(Stage {
        id,
        source: SourceSpec::DummyScan,
        operators: Vec::new(),
        sink,
        parents: Vec::new(),
        children: Vec::new(),
    });
    id
}

fn add_operator(stages: &mut [Stage], stage: StageId, op: OperatorSpec) {
    stages[stage.0].operators.push(op);
}

fn add_edge(stages: &mut [Stage], parent: StageId, child: StageId) {
    if !stages[parent.0].children.contains(&child) {
        stages[parent.0].children.push(child);
    }
    if !stages[child.0].parents.contains(&parent) {
        stages[child.0].parents.push(parent);
    }
}

fn types_of(plan: &PhysicalPlan) -> Vec<DataType> {
    plan.schema().data_types()
}

/// Opens a stage rooted at `plan`: breakers become the stage sink, anything
/// else is collected as-is.
fn plan_stage(plan: &PhysicalPlan, stages: &mut Vec<Stage>) -> Result<StageId> {
    let (sink, input): (SinkSpec, Option<&PhysicalPlan>) = match plan {
        PhysicalPlan::HashAggregate(x) => (
            SinkSpec::HashAggregate {
                groups: x.groups.clone(),
                aggregates: x.aggregates.clone(),
                input_types: types_of(&x.input),
                output_types: x.schema.data_types(),
                batch_rows: x.batch_rows,
            },
            Some(x.input.as_ref()),
        ),
        PhysicalPlan::Sort(x) => (
            SinkSpec::Sort {
                keys: x.keys.clone(),
                input_types: types_of(&x.input),
                batch_rows: x.batch_rows,
            },
            Some(x.input.as_ref()),
        ),
        PhysicalPlan::Insert(x) => (
            SinkSpec::Insert {
                table: x.table.clone(),
                column_map: x.column_map.clone(),
                table_types: x.table_schema.data_types(),
            },
            Some(x.input.as_ref()),
        ),
        PhysicalPlan::Update(x) => (
            SinkSpec::Update {
                table: x.table.clone(),
                assignments: x.assignments.clone(),
                predicate: x.predicate.clone(),
                table_types: x.table_schema.data_types(),
            },
            Some(x.input.as_ref()),
        ),
        PhysicalPlan::Delete(x) => (
            SinkSpec::Delete {
                table: x.table.clone(),
                predicate: x.predicate.clone(),
                table_types: x.table_schema.data_types(),
            },
            Some(x.input.as_ref()),
        ),
        PhysicalPlan::CreateTable(x) => (
            SinkSpec::CreateTable {
                table: x.table.clone(),
                schema: x.table_schema.clone(),
                if_not_exists: x.if_not_exists,
            },
            None,
        ),
        other => (SinkSpec::Collect, Some(other)),
    };
    let id = new_stage(stages, sink);
    let source = match input {
        Some(input) => visit_chain(input, id, stages)?,
        None => SourceSpec::DummyScan,
    };
    stages[id.0].source = source;
    Ok(id)
}

/// Adds the streaming part of `plan` to `stage`, bottom-up, and returns the
/// stage source. Breakers below open their own stages.
fn visit_chain(plan: &PhysicalPlan, stage: StageId, stages: &mut Vec<Stage>) -> Result<SourceSpec> {
    match plan {
        PhysicalPlan::TableScan(x) => Ok(SourceSpec::TableScan {
            table: x.table.clone(),
            projection: x.projection.clone(),
            filters: x.filters.clone(),
            types: x.schema.data_types(),
        }),
        PhysicalPlan::DummyScan(_) => Ok(SourceSpec::DummyScan),
        PhysicalPlan::Values(x) => Ok(SourceSpec::Values {
            rows: x.rows.clone(),
            types: x.schema.data_types(),
            batch_rows: x.batch_rows,
        }),
        PhysicalPlan::Filter(x) => {
            let source = visit_chain(&x.input, stage, stages)?;
            add_operator(
                stages,
                stage,
                OperatorSpec::Filter {
                    predicate: x.predicate.clone(),
                    input_types: types_of(&x.input),
                },
            );
            Ok(source)
        }
        PhysicalPlan::Project(x) => {
            let source = visit_chain(&x.input, stage, stages)?;
            add_operator(
                stages,
                stage,
                OperatorSpec::Project {
                    exprs: x.exprs.iter().map(|(e, _)| e.clone()).collect(),
                    input_types: types_of(&x.input),
                },
            );
            Ok(source)
        }
        PhysicalPlan::Limit(x) => {
            let source = visit_chain(&x.input, stage, stages)?;
            add_operator(
                stages,
                stage,
                OperatorSpec::Limit {
                    limit: x.limit,
                    offset: x.offset,
                },
            );
            Ok(source)
        }
        PhysicalPlan::HashJoin(x) => {
            let build = new_stage(
                stages,
                SinkSpec::HashBuild {
                    keys: x.right_keys.clone(),
                    types: types_of(&x.right),
                },
            );
            add_edge(stages, stage, build);
            let build_source = visit_chain(&x.right, build, stages)?;
            stages[build.0].source = build_source;
            let source = visit_chain(&x.left, stage, stages)?;
            add_operator(
                stages,
                stage,
                OperatorSpec::HashProbe {
                    build,
                    join_type: x.join_type,
                    left_keys: x.left_keys.clone(),
                    residual: x.residual.clone(),
                    left_types: types_of(&x.left),
                    right_types: types_of(&x.right),
                },
            );
            Ok(source)
        }
        PhysicalPlan::NestedLoopJoin(x) => {
            let inner = new_stage(stages, SinkSpec::Collect);
            add_edge(stages, stage, inner);
            let inner_source = visit_chain(&x.right, inner, stages)?;
            stages[inner.0].source = inner_source;
            let source = visit_chain(&x.left, stage, stages)?;
            add_operator(
                stages,
                stage,
                OperatorSpec::NestedLoop {
                    inner,
                    join_type: x.join_type,
                    condition: x.condition.clone(),
                    left_types: types_of(&x.left),
                    right_types: types_of(&x.right),
                },
            );
            Ok(source)
        }
        PhysicalPlan::HashAggregate(_)
        | PhysicalPlan::Sort(_)
        | PhysicalPlan::Insert(_)
        | PhysicalPlan::Update(_)
        | PhysicalPlan::Delete(_)
        | PhysicalPlan::CreateTable(_) => {
            let child = plan_stage(plan, stages)?;
            add_edge(stages, stage, child);
            Ok(SourceSpec::StageOutput(child))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Pipeline, SinkSpec, SourceSpec};
    use quiver_common::{QuiverError, StageId};
    use quiver_planner::{
        AggregateExpr, AggregateFunction, DummyScanExec, Expr, FilterExec, HashAggregateExec,
        HashJoinExec, JoinType, PhysicalPlan, ProjectExec, SortExec, SortKey, TableScanExec,
    };
    use quiver_vector::{DataType, Field, Schema, Value};

    fn scan(table: &str) -> PhysicalPlan {
        let schema = Schema::new(vec![Field::new("a", DataType::integer())]);
        PhysicalPlan::TableScan(TableScanExec {
            table: table.to_string(),
            table_schema: schema.clone(),
            projection: vec![0],
            filters: vec![],
            schema,
        })
    }

    fn a() -> Expr {
        Expr::ColumnRef {
            name: "a".to_string(),
            index: 0,
            data_type: DataType::integer(),
        }
    }

    #[test]
    fn streaming_plan_is_one_stage() {
        let filter = PhysicalPlan::Filter(FilterExec {
            predicate: Expr::binary(a(), quiver_planner::BinaryOp::Gt, Expr::Literal(Value::make_int(1))),
            schema: scan("t").schema().clone(),
            input: Box::new(scan("t")),
        });
        let project = PhysicalPlan::Project(ProjectExec {
            exprs: vec![(a(), "a".to_string())],
            schema: filter.schema().clone(),
            input: Box::new(filter),
        });
        let p = Pipeline::create(&project).unwrap();
        assert_eq!(p.stages().len(), 1);
        assert_eq!(
            p.stages()[0].operator_names(),
            vec!["TableScan", "Filter", "Project", "Collect"]
        );
    }

    #[test]
    fn breakers_cut_stages() {
        let join = PhysicalPlan::HashJoin(HashJoinExec {
            join_type: JoinType::Inner,
            left_keys: vec![a()],
            right_keys: vec![a()],
            residual: None,
            schema: Schema::new(vec![
                Field::new("a", DataType::integer()),
                Field::new("a", DataType::integer()),
            ]),
            left: Box::new(scan("t")),
            right: Box::new(scan("u")),
        });
        let agg = PhysicalPlan::HashAggregate(HashAggregateExec {
            groups: vec![a()],
            aggregates: vec![AggregateExpr {
                func: AggregateFunction::CountStar,
                arg: None,
                data_type: DataType::bigint(),
            }],
            batch_rows: 1024,
            schema: Schema::new(vec![
                Field::new("a", DataType::integer()),
                Field::new("count(*)", DataType::bigint()),
            ]),
            input: Box::new(join),
        });
        let sort = PhysicalPlan::Sort(SortExec {
            keys: vec![SortKey {
                expr: a(),
                ascending: true,
                nulls_first: false,
            }],
            batch_rows: 1024,
            schema: agg.schema().clone(),
            input: Box::new(agg),
        });
        let p = Pipeline::create(&sort).unwrap();
        // sort <- aggregate over probe <- hash build
        assert_eq!(p.stages().len(), 3);
        let root = &p.stages()[0];
        assert_eq!(root.sink.name(), "Sort");
        assert!(matches!(root.source, SourceSpec::StageOutput(StageId(1))));
        assert_eq!(root.children, vec![StageId(1)]);
        let agg_stage = &p.stages()[1];
        assert!(matches!(agg_stage.sink, SinkSpec::HashAggregate { .. }));
        assert_eq!(
            agg_stage.operator_names(),
            vec!["TableScan", "HashJoinProbe", "HashAggregate"]
        );
        assert_eq!(agg_stage.children, vec![StageId(2)]);
        assert_eq!(p.stages()[2].parents, vec![StageId(1)]);
        assert_eq!(
            p.stages()[2].operator_names(),
            vec!["TableScan", "HashJoinBuild"]
        );
    }

    #[test]
    fn result_requires_scheduling() {
        let p = Pipeline::create(&PhysicalPlan::DummyScan(DummyScanExec {
            schema: Schema::empty(),
        }))
        .unwrap();
        assert!(matches!(p.get_result(), Err(QuiverError::Executor(_))));
    }
}
