use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use quiver_common::{EngineConfig, QueryId, QuiverError, Result, SessionId};
use quiver_execution::{Pipeline, QueryContext, RuntimeEnv};
use quiver_planner::{
    create_physical_plan, explain_logical, explain_physical, LogicalPlan,
    LogicalPlanner, Optimizer, OptimizerConfig, PhysicalPlan, PhysicalPlannerConfig,
};
use quiver_sql::parse_sql;
use tracing::{debug, info, warn};

use crate::query_result::QueryResult;

pub type SharedSession = Arc<Session>;

/// One client session: runtime services, the optimizer with its custom
/// rules, and the query id sequence.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub env: RuntimeEnv,
    pub optimizer: Optimizer,
    pub optimizer_config: OptimizerConfig,
    pub physical_config: PhysicalPlannerConfig,
    next_query_id: AtomicU64,
}

/// Plans produced for one statement.
struct CompiledQuery {
    ctx: Arc<QueryContext>,
    logical: LogicalPlan,
    optimized: LogicalPlan,
    physical: PhysicalPlan,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Ok(Self::with_env(RuntimeEnv::new(config)?))
    }

    /// A session over existing runtime services; its id comes from `env`.
    pub fn with_env(env: RuntimeEnv) -> Self {
        let physical_config = PhysicalPlannerConfig {
            target_batch_rows: env.config.vector_size,
        };
        Self {
            id: env.next_session_id(),
            env,
            optimizer: Optimizer::new(),
            optimizer_config: OptimizerConfig::default(),
            physical_config,
            next_query_id: AtomicU64::new(1),
        }
    }

    fn compile(&self, sql: &str) -> Result<CompiledQuery> {
        let query_id = QueryId(self.next_query_id.fetch_add(1, Ordering::Relaxed));
        let ctx = QueryContext::new(query_id, self.id, self.env.clone());
        let statements = parse_sql(sql)?;
        let mut planner = LogicalPlanner::new(ctx.as_ref());
        planner.plan_statements(&statements)?;
        let logical = planner.into_logical_plan()?;
        let optimized = if self.env.config.enable_optimizer {
            self.optimizer
                .optimize(logical.clone(), ctx.as_ref(), self.optimizer_config)?
        } else {
            logical.clone()
        };
        debug!(query_id = %query_id, plan = %explain_logical(&optimized), "optimized plan");
        let physical = create_physical_plan(&optimized, &self.physical_config)?;
        Ok(CompiledQuery {
            ctx,
            logical,
            optimized,
            physical,
        })
    }

    /// Compiles and runs one statement, blocking until its result arrives.
    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        let started = Instant::now();
        let result = self.compile(sql).and_then(|q| {
            let kind = q.logical.node_type();
            info!(query_id = %q.ctx.query_id(), session_id = %self.id, kind = %kind, "query started");
            let pipeline = Pipeline::create(&q.physical)?;
            q.ctx.scheduler().schedule(&q.ctx, &pipeline)?;
            let table = pipeline.get_result()?;
            Ok(QueryResult::new(kind, table))
        });
        let metrics = &self.env.metrics;
        match &result {
            Ok(r) => {
                metrics.inc_query(&r.kind().to_string(), "ok");
                info!(
                    session_id = %self.id,
                    rows = r.table().row_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "query finished"
                );
            }
            Err(e) => {
                metrics.inc_query(error_kind(e), "error");
                warn!(session_id = %self.id, error = %e, "query failed");
            }
        }
        result
    }

    /// Logical, optimized and physical plan text for one statement.
    pub fn explain(&self, sql: &str) -> Result<String> {
        let q = self.compile(sql)?;
        let mut out = String::new();
        out.push_str("== logical plan ==\n");
        out.push_str(&explain_logical(&q.logical));
        out.push_str("== optimized plan ==\n");
        out.push_str(&explain_logical(&q.optimized));
        out.push_str("== physical plan ==\n");
        out.push_str(&explain_physical(&q.physical));
        Ok(out)
    }
}

/// Metrics label for queries that failed before a plan existed.
fn error_kind(e: &QuiverError) -> &'static str {
    match e {
        QuiverError::Parse(_) => "parse",
        QuiverError::Bind(_) | QuiverError::Planner(_) | QuiverError::Unsupported(_) => "plan",
        _ => "execute",
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use quiver_common::{EngineConfig, SessionId};
    use quiver_execution::RuntimeEnv;

    #[test]
    fn session_ids_come_from_the_runtime_env() {
        let env = RuntimeEnv::new(EngineConfig::default()).unwrap();
        let a = Session::with_env(env.clone());
        let b = Session::with_env(env);
        assert_eq!(a.id, SessionId(1));
        assert_eq!(b.id, SessionId(2));

        let other = Session::new(EngineConfig::default()).unwrap();
        assert_eq!(other.id, SessionId(1));
    }
}
