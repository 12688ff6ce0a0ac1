use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use quiver_common::{
    EngineConfig, MetricsRegistry, NodeId, QueryId, QuiverError, Result, SessionId,
};
use quiver_planner::{OptimizerContext, PlannerContext, SchemaProvider};
use quiver_storage::{Catalog, MemoryStorage, StorageProvider, TableDef};
use quiver_vector::{DataType, Schema};

use crate::scheduler::Scheduler;
use crate::udf::FunctionRegistry;

/// Services shared by every query of one engine.
#[derive(Clone)]
pub struct RuntimeEnv {
    pub config: EngineConfig,
    pub catalog: Arc<RwLock<Catalog>>,
    pub storage: Arc<dyn StorageProvider>,
    pub functions: Arc<FunctionRegistry>,
    pub metrics: MetricsRegistry,
    pub scheduler: Arc<Scheduler>,
    session_ids: Arc<AtomicU64>,
}

impl RuntimeEnv {
    /// In-memory storage, built-in functions and a scheduler sized from `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = Arc::new(Scheduler::new(&config)?);
        Ok(Self {
            config,
            catalog: Arc::new(RwLock::new(Catalog::new())),
            storage: Arc::new(MemoryStorage::new()),
            functions: Arc::new(FunctionRegistry::with_builtins()),
            metrics: MetricsRegistry::new(),
            scheduler,
            session_ids: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Hands out session ids, unique among sessions sharing this environment.
    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.session_ids.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Debug for RuntimeEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeEnv")
            .field("config", &self.config)
            .field("tables", &self.catalog.read().list_tables())
            .field("functions", &self.functions)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Cross-cutting handle for one query: session identity, catalog and
/// storage access, the active scheduler, and the in-flight guard that keeps
/// at most one pipeline running per query.
pub struct QueryContext {
    query_id: QueryId,
    session_id: SessionId,
    env: RuntimeEnv,
    next_node_id: AtomicU64,
    in_flight: AtomicBool,
}

impl QueryContext {
    pub fn new(query_id: QueryId, session_id: SessionId, env: RuntimeEnv) -> Arc<Self> {
        Arc::new(Self {
            query_id,
            session_id,
            env,
            next_node_id: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        })
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.env.config
    }

    pub fn catalog(&self) -> &Arc<RwLock<Catalog>> {
        &self.env.catalog
    }

    pub fn storage(&self) -> &Arc<dyn StorageProvider> {
        &self.env.storage
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.env.functions
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.env.metrics
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.env.scheduler
    }

    /// Snapshot of a table definition.
    pub fn table_def(&self, table: &str) -> Result<TableDef> {
        self.env.catalog.read().get(table).cloned()
    }

    /// True while a scheduled pipeline has not delivered its result.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn begin_pipeline(&self) -> Result<()> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(QuiverError::Executor(format!(
                "query {} already has a pipeline in flight",
                self.query_id
            )));
        }
        Ok(())
    }

    pub(crate) fn finish_pipeline(&self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("query_id", &self.query_id)
            .field("session_id", &self.session_id)
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

impl SchemaProvider for QueryContext {
    fn table_schema(&self, table: &str) -> Result<Schema> {
        Ok(self.table_def(table)?.schema)
    }
}

impl PlannerContext for QueryContext {
    fn next_node_id(&self) -> NodeId {
        NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed))
    }

    fn scalar_function_type(&self, name: &str, args: &[DataType]) -> Result<DataType> {
        self.env.functions.return_type(name, args)
    }
}

impl OptimizerContext for QueryContext {
    fn table_stats(&self, table: &str) -> Result<(Option<u64>, Option<u64>)> {
        let def = self.table_def(table)?;
        let stats = self.env.storage.estimate_stats(&def);
        Ok((stats.bytes, stats.rows))
    }
}
