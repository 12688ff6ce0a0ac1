use quiver_common::{NodeId, Result};
use quiver_vector::{DataType, Schema};

/// The planner needs schemas to resolve table references.
/// The client (Engine) provides this from its catalog.
pub trait SchemaProvider {
    /// Return schema for a table by name.
    fn table_schema(&self, table: &str) -> Result<Schema>;
}

/// Per-query services consulted while building a logical plan.
pub trait PlannerContext: SchemaProvider {
    /// Allocate a fresh plan node id.
    fn next_node_id(&self) -> NodeId;

    /// Return type of scalar function `name` applied to `args`.
    ///
    /// # Errors
    /// Bind error for unknown functions or unacceptable argument types.
    fn scalar_function_type(&self, name: &str, args: &[DataType]) -> Result<DataType>;
}

/// Provide table stats for cost-based rewrites.
pub trait OptimizerContext: PlannerContext {
    /// Return `(bytes, rows)` estimates for a table.
    fn table_stats(&self, table: &str) -> Result<(Option<u64>, Option<u64>)>;
}
