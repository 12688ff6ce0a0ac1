use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;
use quiver_common::{EngineConfig, QueryId, QuiverError, Result, SessionId};
use quiver_execution::expressions::map_rows;
use quiver_execution::{Pipeline, QueryContext, RuntimeEnv, ScalarFunction};
use quiver_planner::{
    create_physical_plan, LogicalPlanner, Optimizer, OptimizerConfig, PhysicalPlan,
    PhysicalPlannerConfig,
};
use quiver_sql::parse_sql;
use quiver_storage::TableDef;
use quiver_vector::{ColumnVector, DataBlock, DataType, Field, ResultTable, Schema, Value};

fn env() -> RuntimeEnv {
    let env = RuntimeEnv::new(EngineConfig {
        vector_size: 2,
        ..EngineConfig::default()
    })
    .unwrap();
    add_table(
        &env,
        "users",
        vec![("id", DataType::integer()), ("name", DataType::varchar())],
        vec![
            vec![Value::make_int(1), Value::make_varchar("ann")],
            vec![Value::make_int(2), Value::make_varchar("bob")],
            vec![Value::make_int(3), Value::make_varchar("cat")],
        ],
    );
    add_table(
        &env,
        "orders",
        vec![("user_id", DataType::integer()), ("amount", DataType::bigint())],
        vec![
            vec![Value::make_int(1), Value::make_big_int(10)],
            vec![Value::make_int(1), Value::make_big_int(5)],
            vec![Value::make_int(3), Value::make_big_int(7)],
            vec![Value::make_int(9), Value::make_big_int(1)],
        ],
    );
    env
}

fn add_table(env: &RuntimeEnv, name: &str, columns: Vec<(&str, DataType)>, rows: Vec<Vec<Value>>) {
    let schema = Schema::new(
        columns
            .into_iter()
            .map(|(n, t)| Field::new(n, t))
            .collect(),
    );
    let def = TableDef::new(name, schema.clone());
    env.catalog.write().register_table(def.clone());
    env.storage.create_table(&def).unwrap();
    let block = DataBlock::from_rows(&schema.data_types(), &rows).unwrap();
    env.storage.append(&def, block).unwrap();
}

fn physical(ctx: &Arc<QueryContext>, sql: &str, optimize: bool) -> Result<PhysicalPlan> {
    let statements = parse_sql(sql)?;
    let mut planner = LogicalPlanner::new(ctx.as_ref());
    planner.plan_statements(&statements)?;
    let mut plan = planner.into_logical_plan()?;
    if optimize {
        plan = Optimizer::new().optimize(plan, ctx.as_ref(), OptimizerConfig::default())?;
    }
    create_physical_plan(&plan, &PhysicalPlannerConfig::default())
}

fn run_with(env: &RuntimeEnv, sql: &str, optimize: bool) -> Result<ResultTable> {
    let ctx = QueryContext::new(QueryId(1), SessionId(1), env.clone());
    let pipeline = Pipeline::create(&physical(&ctx, sql, optimize)?)?;
    ctx.scheduler().schedule(&ctx, &pipeline)?;
    let result = pipeline.get_result();
    assert!(!ctx.is_in_flight());
    result
}

fn run(env: &RuntimeEnv, sql: &str) -> String {
    render(&run_with(env, sql, true).unwrap())
}

fn render(table: &ResultTable) -> String {
    table.blocks().iter().map(|b| b.to_string()).collect()
}

#[test]
fn optimized_and_unoptimized_plans_agree() {
    let env = env();
    let queries = [
        "SELECT name FROM users WHERE id > 1 ORDER BY id",
        "SELECT u.name, o.amount FROM users u JOIN orders o ON u.id = o.user_id ORDER BY o.amount",
        "SELECT user_id, SUM(amount) FROM orders GROUP BY user_id ORDER BY user_id",
        "SELECT id FROM users ORDER BY id DESC LIMIT 2",
    ];
    for sql in queries {
        let optimized = render(&run_with(&env, sql, true).unwrap());
        let plain = render(&run_with(&env, sql, false).unwrap());
        assert_eq!(optimized, plain, "{sql}");
    }
}

#[test]
fn joins_aggregates_and_sorts_run_across_stages() {
    let env = env();
    assert_eq!(
        run(
            &env,
            "SELECT u.name, SUM(o.amount) FROM users u JOIN orders o ON u.id = o.user_id \
             GROUP BY u.name ORDER BY u.name"
        ),
        "ann 15\ncat 7\n"
    );
    assert_eq!(
        run(
            &env,
            "SELECT u.name, o.amount FROM users u LEFT JOIN orders o ON u.id = o.user_id \
             WHERE u.id = 2"
        ),
        "bob NULL\n"
    );
    assert_eq!(run(&env, "SELECT COUNT(*) FROM orders WHERE amount > 100"), "0\n");
    assert_eq!(run(&env, "SELECT id FROM users ORDER BY id LIMIT 1 OFFSET 1"), "2\n");
}

#[test]
fn root_blocks_respect_vector_size() {
    let env = env();
    let table = run_with(&env, "SELECT amount FROM orders ORDER BY amount", true).unwrap();
    assert_eq!(table.row_count(), 4);
    assert!(table.blocks().iter().all(|b| b.row_count() <= 2));
}

#[test]
fn writers_report_affected_rows() {
    let env = env();
    assert_eq!(run(&env, "CREATE TABLE t (a INTEGER, b VARCHAR)"), "0\n");
    assert_eq!(run(&env, "INSERT INTO t VALUES (1, 'x'), (2, 'y'), (3, 'z')"), "3\n");
    assert_eq!(run(&env, "INSERT INTO t (b) VALUES ('w')"), "1\n");
    assert_eq!(run(&env, "UPDATE t SET b = 'q' WHERE a >= 2"), "2\n");
    assert_eq!(run(&env, "DELETE FROM t WHERE a = 1"), "1\n");
    assert_eq!(run(&env, "SELECT a, b FROM t ORDER BY a"), "2 q\n3 q\nNULL w\n");
}

#[test]
fn a_pipeline_is_scheduled_once() {
    let env = env();
    let ctx = QueryContext::new(QueryId(7), SessionId(1), env.clone());
    let pipeline = Pipeline::create(&physical(&ctx, "SELECT 1", true).unwrap()).unwrap();
    ctx.scheduler().schedule(&ctx, &pipeline).unwrap();
    assert_eq!(render(&pipeline.get_result().unwrap()), "1\n");
    assert!(matches!(
        ctx.scheduler().schedule(&ctx, &pipeline),
        Err(QuiverError::Executor(_))
    ));
    assert!(!ctx.is_in_flight());
    assert!(matches!(pipeline.get_result(), Err(QuiverError::Executor(_))));
}

/// Blocks each invocation until the test releases it.
struct Gate {
    release: Mutex<mpsc::Receiver<()>>,
}

impl ScalarFunction for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    fn return_type(&self, arg_types: &[DataType]) -> Result<DataType> {
        Ok(arg_types.first().cloned().unwrap_or_else(DataType::integer))
    }

    fn invoke(&self, args: &[ColumnVector], rows: usize) -> Result<ColumnVector> {
        self.release
            .lock()
            .recv()
            .map_err(|_| QuiverError::Executor("gate closed".to_string()))?;
        let out = args[0].data_type().clone();
        map_rows(args, rows, &out, |v| Ok(v[0].clone()))
    }
}

#[test]
fn one_pipeline_in_flight_per_query() {
    let env = env();
    let (open, release) = mpsc::channel();
    env.functions.register(Arc::new(Gate {
        release: Mutex::new(release),
    }));
    let ctx = QueryContext::new(QueryId(3), SessionId(1), env.clone());
    let plan = physical(&ctx, "SELECT gate(id) FROM users WHERE id = 1", true).unwrap();

    let first = Pipeline::create(&plan).unwrap();
    ctx.scheduler().schedule(&ctx, &first).unwrap();
    assert!(ctx.is_in_flight());

    let second = Pipeline::create(&plan).unwrap();
    assert!(matches!(
        ctx.scheduler().schedule(&ctx, &second),
        Err(QuiverError::Executor(_))
    ));

    open.send(()).unwrap();
    assert_eq!(render(&first.get_result().unwrap()), "1\n");
    assert!(!ctx.is_in_flight());

    open.send(()).unwrap();
    ctx.scheduler().schedule(&ctx, &second).unwrap();
    assert_eq!(render(&second.get_result().unwrap()), "1\n");
}

struct Boom;

impl ScalarFunction for Boom {
    fn name(&self) -> &str {
        "boom"
    }

    fn return_type(&self, _arg_types: &[DataType]) -> Result<DataType> {
        Ok(DataType::integer())
    }

    fn invoke(&self, _args: &[ColumnVector], _rows: usize) -> Result<ColumnVector> {
        Err(QuiverError::Executor("boom".to_string()))
    }
}

#[test]
fn stage_failure_fails_the_query() {
    let env = env();
    env.functions.register(Arc::new(Boom));
    let err = run_with(
        &env,
        "SELECT u.name FROM users u JOIN orders o ON u.id = o.user_id WHERE boom(o.amount) = 1",
        true,
    )
    .unwrap_err();
    assert!(matches!(err, QuiverError::Executor(ref m) if m.contains("boom")));
    assert!(env.metrics.render_prometheus().contains("quiver_scheduler_stages_failed_total"));

    let full = run_with(
        &env,
        "SELECT u.name FROM users u FULL JOIN orders o ON u.id = o.user_id",
        true,
    );
    assert!(matches!(full, Err(QuiverError::Executor(_))));
}

#[test]
fn failed_writes_leave_tables_unchanged() {
    let env = env();
    let schema = Schema::new(vec![Field::new("a", DataType::integer())]);
    for name in ["s", "t"] {
        let def = TableDef::new(name, schema.clone());
        env.catalog.write().register_table(def.clone());
        env.storage.create_table(&def).unwrap();
    }
    let s = env.catalog.read().get("s").unwrap().clone();
    for rows in [
        vec![vec![Value::make_int(1)], vec![Value::make_int(2)]],
        vec![vec![Value::make_int(0)]],
    ] {
        let block = DataBlock::from_rows(&schema.data_types(), &rows).unwrap();
        env.storage.append(&s, block).unwrap();
    }

    let failing = [
        "INSERT INTO t SELECT 10 / a FROM s",
        "UPDATE s SET a = 10 / a",
        "DELETE FROM s WHERE 10 / a = 5",
    ];
    for sql in failing {
        let err = run_with(&env, sql, true).unwrap_err();
        assert!(
            matches!(err, QuiverError::Executor(ref m) if m.contains("division by zero")),
            "{sql}"
        );
        assert_eq!(run(&env, "SELECT COUNT(*) FROM t"), "0\n", "{sql}");
        assert_eq!(run(&env, "SELECT a FROM s ORDER BY a"), "0\n1\n2\n", "{sql}");
    }
}
