use std::sync::Arc;

use quiver_common::{EngineConfig, Result};
use quiver_execution::ScalarFunction;
use quiver_planner::OptimizerRule;
use quiver_storage::{Catalog, TableDef};
use quiver_vector::{DataBlock, Schema};

use crate::query_result::QueryResult;
use crate::session::{Session, SharedSession};

/// Embedded query engine. Clones share one session.
#[derive(Debug, Clone)]
pub struct Engine {
    session: SharedSession,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let session = Arc::new(Session::new(config)?);
        Ok(Self { session })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.session.env.config
    }

    /// Register a table under a given name and prepare its storage.
    /// We override `table.name` to avoid ambiguity.
    pub fn register_table(&self, name: impl Into<String>, mut table: TableDef) -> Result<()> {
        table.name = name.into();
        self.session.env.storage.create_table(&table)?;
        self.session.env.catalog.write().register_table(table);
        Ok(())
    }

    /// Registers every table of a catalog, e.g. one loaded from JSON.
    pub fn register_catalog(&self, catalog: &Catalog) -> Result<()> {
        for name in catalog.list_tables() {
            let table = catalog.get(&name)?.clone();
            self.register_table(name, table)?;
        }
        Ok(())
    }

    /// Appends rows to a registered table, returning the rows written.
    pub fn append(&self, table: &str, block: DataBlock) -> Result<u64> {
        let def = self.session.env.catalog.read().get(table)?.clone();
        self.session.env.storage.append(&def, block)
    }

    /// Runs one SQL statement to completion.
    pub fn query(&self, sql: &str) -> Result<QueryResult> {
        self.session.execute(sql)
    }

    /// Logical, optimized and physical plan text without running the statement.
    pub fn explain(&self, sql: &str) -> Result<String> {
        self.session.explain(sql)
    }

    /// Returns `true` when a function with the same name was replaced.
    pub fn register_scalar_function(&self, function: Arc<dyn ScalarFunction>) -> bool {
        self.session.env.functions.register(function)
    }

    pub fn deregister_scalar_function(&self, name: &str) -> bool {
        self.session.env.functions.deregister(name)
    }

    /// Returns `true` when a rule with the same name was replaced.
    pub fn register_optimizer_rule(&self, rule: Arc<dyn OptimizerRule>) -> bool {
        self.session.optimizer.register_rule(rule)
    }

    pub fn deregister_optimizer_rule(&self, name: &str) -> bool {
        self.session.optimizer.deregister_rule(name)
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.session.env.catalog.read().list_tables()
    }

    pub fn table_schema(&self, name: &str) -> Result<Schema> {
        Ok(self.session.env.catalog.read().get(name)?.schema.clone())
    }

    pub fn prometheus_metrics(&self) -> String {
        self.session.env.metrics.render_prometheus()
    }
}
