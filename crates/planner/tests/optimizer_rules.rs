use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quiver_common::{NodeId, QuiverError, Result};
use quiver_planner::{
    create_physical_plan, JoinType, LogicalOperator, LogicalPlan, LogicalPlanner, Optimizer,
    OptimizerConfig, OptimizerContext, OptimizerRule, PhysicalPlan, PhysicalPlannerConfig,
    PlannerContext, SchemaProvider,
};
use quiver_sql::parse_sql;
use quiver_vector::{DataType, Field, Schema};

struct TestCtx {
    tables: HashMap<String, (Schema, Option<u64>)>,
    next_id: AtomicU64,
}

impl TestCtx {
    fn new() -> Self {
        let mut tables = HashMap::new();
        tables.insert(
            "t".to_string(),
            (
                Schema::new(vec![
                    Field::new("a", DataType::integer()),
                    Field::new("b", DataType::varchar()),
                    Field::new("e", DataType::double()),
                ]),
                Some(10),
            ),
        );
        tables.insert(
            "u".to_string(),
            (
                Schema::new(vec![
                    Field::new("c", DataType::integer()),
                    Field::new("d", DataType::double()),
                ]),
                Some(1000),
            ),
        );
        Self {
            tables,
            next_id: AtomicU64::new(0),
        }
    }
}

impl SchemaProvider for TestCtx {
    fn table_schema(&self, table: &str) -> Result<Schema> {
        self.tables
            .get(table)
            .map(|(s, _)| s.clone())
            .ok_or_else(|| QuiverError::Bind(format!("unknown table: {table}")))
    }
}

impl PlannerContext for TestCtx {
    fn next_node_id(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn scalar_function_type(&self, name: &str, _args: &[DataType]) -> Result<DataType> {
        Err(QuiverError::Bind(format!("unknown function {name}")))
    }
}

impl OptimizerContext for TestCtx {
    fn table_stats(&self, table: &str) -> Result<(Option<u64>, Option<u64>)> {
        Ok((None, self.tables.get(table).and_then(|(_, rows)| *rows)))
    }
}

fn logical(ctx: &TestCtx, sql: &str) -> LogicalPlan {
    let stmts = parse_sql(sql).unwrap();
    let mut planner = LogicalPlanner::new(ctx);
    planner.plan_statements(&stmts).unwrap();
    planner.into_logical_plan().unwrap()
}

fn optimized(sql: &str, cfg: OptimizerConfig) -> LogicalPlan {
    let ctx = TestCtx::new();
    let plan = logical(&ctx, sql);
    Optimizer::new().optimize(plan, &ctx, cfg).unwrap()
}

fn collect<'a>(plan: &'a LogicalPlan, out: &mut Vec<&'a LogicalPlan>) {
    out.push(plan);
    for c in plan.children() {
        collect(c, out);
    }
}

fn scans(plan: &LogicalPlan) -> Vec<(String, Option<Vec<usize>>, usize)> {
    let mut nodes = vec![];
    collect(plan, &mut nodes);
    nodes
        .into_iter()
        .filter_map(|n| match &n.op {
            LogicalOperator::TableScan {
                table,
                projection,
                filters,
                ..
            } => Some((table.clone(), projection.clone(), filters.len())),
            _ => None,
        })
        .collect()
}

fn joins(plan: &LogicalPlan) -> Vec<(JoinType, bool)> {
    let mut nodes = vec![];
    collect(plan, &mut nodes);
    nodes
        .into_iter()
        .filter_map(|n| match &n.op {
            LogicalOperator::Join {
                join_type,
                condition,
                ..
            } => Some((*join_type, condition.is_some())),
            _ => None,
        })
        .collect()
}

fn filter_count(plan: &LogicalPlan) -> usize {
    let mut nodes = vec![];
    collect(plan, &mut nodes);
    nodes
        .iter()
        .filter(|n| matches!(n.op, LogicalOperator::Filter { .. }))
        .count()
}

fn no_side_selection() -> OptimizerConfig {
    OptimizerConfig {
        join_side_selection: false,
        ..OptimizerConfig::default()
    }
}

#[test]
fn where_over_cross_product_becomes_join_condition_and_scan_filter() {
    let p = optimized(
        "SELECT t.a, u.d FROM t, u WHERE t.a = u.c AND t.b = 'x'",
        no_side_selection(),
    );
    assert_eq!(joins(&p), vec![(JoinType::Inner, true)]);
    assert_eq!(filter_count(&p), 0);
    let s = scans(&p);
    assert_eq!(s[0].0, "t");
    assert_eq!(s[0].2, 1);
    assert_eq!(s[1].0, "u");
    assert_eq!(s[1].2, 0);
}

#[test]
fn left_join_keeps_right_side_where_above_join() {
    let p = optimized(
        "SELECT t.a FROM t LEFT JOIN u ON t.a = u.c WHERE u.d > 1.0 AND t.a > 0",
        no_side_selection(),
    );
    assert_eq!(joins(&p), vec![(JoinType::Left, true)]);
    assert_eq!(filter_count(&p), 1);
    let s = scans(&p);
    assert_eq!(s[0].2, 1);
    assert_eq!(s[1].2, 0);
}

#[test]
fn left_join_on_conjunct_over_inner_side_moves_into_inner_scan() {
    let p = optimized(
        "SELECT t.a FROM t LEFT JOIN u ON t.a = u.c AND u.d > 1.0",
        no_side_selection(),
    );
    let s = scans(&p);
    assert_eq!(s[1].0, "u");
    assert_eq!(s[1].2, 1);
}

#[test]
fn projection_pruning_narrows_scans() {
    let p = optimized("SELECT a FROM t", OptimizerConfig::default());
    assert_eq!(scans(&p)[0].1, Some(vec![0]));
    let p = optimized("SELECT a FROM t WHERE e > 1.0", OptimizerConfig::default());
    assert_eq!(scans(&p)[0].1, Some(vec![0, 2]));
    let p = optimized("SELECT count(*) FROM t", OptimizerConfig::default());
    assert_eq!(scans(&p)[0].1, Some(vec![0]));
    let p = optimized("SELECT * FROM t", OptimizerConfig::default());
    assert_eq!(scans(&p)[0].1, None);
}

#[test]
fn constant_predicates_fold_away() {
    let p = optimized("SELECT a FROM t WHERE 1 < 2", OptimizerConfig::default());
    assert_eq!(filter_count(&p), 0);
    assert_eq!(scans(&p)[0].2, 0);
}

#[test]
fn output_columns_survive_optimization() {
    let ctx = TestCtx::new();
    let sql = "SELECT u.d, t.a FROM t JOIN u ON t.a = u.c WHERE t.e > 2.0 ORDER BY 2";
    let before = logical(&ctx, sql).schema();
    let after = Optimizer::new()
        .optimize(logical(&ctx, sql), &ctx, OptimizerConfig::default())
        .unwrap()
        .schema();
    assert_eq!(before, after);
}

#[test]
fn smaller_input_becomes_build_side() {
    let ctx = TestCtx::new();
    let plan = logical(&ctx, "SELECT t.a FROM t JOIN u ON t.a = u.c");
    let p = Optimizer::new()
        .optimize(plan, &ctx, OptimizerConfig::default())
        .unwrap();
    let s = scans(&p);
    assert_eq!(s[0].0, "u");
    assert_eq!(s[1].0, "t");
}

struct LimitOneRule;

impl OptimizerRule for LimitOneRule {
    fn name(&self) -> &str {
        "limit_one"
    }

    fn rewrite(
        &self,
        plan: LogicalPlan,
        _ctx: &dyn OptimizerContext,
        _cfg: OptimizerConfig,
    ) -> Result<LogicalPlan> {
        Ok(match plan.op {
            LogicalOperator::Limit { offset, input, .. } => LogicalPlan::new(
                plan.id,
                LogicalOperator::Limit {
                    limit: Some(1),
                    offset,
                    input,
                },
            ),
            op => LogicalPlan::new(plan.id, op),
        })
    }
}

#[test]
fn custom_rules_register_apply_and_deregister() {
    let ctx = TestCtx::new();
    let optimizer = Optimizer::new();
    assert!(!optimizer.register_rule(Arc::new(LimitOneRule)));
    assert!(optimizer.register_rule(Arc::new(LimitOneRule)));

    let p = optimizer
        .optimize(
            logical(&ctx, "SELECT a FROM t LIMIT 10"),
            &ctx,
            OptimizerConfig::default(),
        )
        .unwrap();
    assert!(matches!(p.op, LogicalOperator::Limit { limit: Some(1), .. }));

    assert!(optimizer.deregister_rule("limit_one"));
    assert!(!optimizer.deregister_rule("limit_one"));
    let p = optimizer
        .optimize(
            logical(&ctx, "SELECT a FROM t LIMIT 10"),
            &ctx,
            OptimizerConfig::default(),
        )
        .unwrap();
    assert!(matches!(p.op, LogicalOperator::Limit { limit: Some(10), .. }));
}

#[test]
fn equi_join_lowers_to_hash_join_and_theta_join_to_nested_loop() {
    let ctx = TestCtx::new();
    let cfg = PhysicalPlannerConfig::default();
    let p = optimized("SELECT t.a FROM t JOIN u ON t.a = u.c AND t.e < u.d", no_side_selection());
    let phys = create_physical_plan(&p, &cfg).unwrap();
    let join = phys.children()[0];
    match join {
        PhysicalPlan::HashJoin(j) => {
            assert_eq!(j.left_keys.len(), 1);
            assert!(j.residual.is_some());
        }
        other => panic!("expected hash join, got {}", other.name()),
    }
    let p = logical(&ctx, "SELECT t.a FROM t JOIN u ON t.a < u.c");
    let phys = create_physical_plan(&p, &cfg).unwrap();
    assert_eq!(phys.children()[0].name(), "NestedLoopJoin");
}

#[test]
fn full_outer_join_has_no_physical_lowering() {
    let ctx = TestCtx::new();
    let p = logical(&ctx, "SELECT t.a FROM t FULL OUTER JOIN u ON t.a = u.c");
    let err = create_physical_plan(&p, &PhysicalPlannerConfig::default()).unwrap_err();
    assert!(matches!(err, QuiverError::Executor(_)));
}

#[test]
fn physical_schema_matches_logical_schema() {
    let ctx = TestCtx::new();
    for sql in [
        "SELECT a, count(*) FROM t GROUP BY a ORDER BY a",
        "SELECT t.b, u.d FROM t JOIN u ON t.a = u.c",
        "INSERT INTO u VALUES (1, 2.0)",
        "EXPLAIN SELECT a FROM t",
    ] {
        let plan = logical(&ctx, sql);
        let phys = create_physical_plan(&plan, &PhysicalPlannerConfig::default()).unwrap();
        assert_eq!(phys.schema(), &plan.schema(), "{sql}");
    }
}
