//! Query compilation: binding, logical planning, optimization and physical
//! planning.
//!
//! Architecture role:
//! - resolves names through [`BindContext`] and the binder family
//! - translates one statement into a [`LogicalPlan`]
//! - rewrites logical plans with the rule-based [`Optimizer`]
//! - lowers optimized plans to [`PhysicalPlan`] operators
//!
//! Key modules:
//! - [`binder`]
//! - [`logical_planner`]
//! - [`optimizer`]
//! - [`physical_planner`]

pub mod bind_context;
pub mod binder;
pub mod binding;
pub mod column_identifier;
pub mod context;
pub mod explain;
pub mod logical_plan;
pub mod logical_planner;
pub mod optimizer;
pub mod physical_plan;
pub mod physical_planner;
pub mod scalar;

pub use bind_context::BindContext;
pub use binder::{DeleteBinder, ExpressionBinder, InsertBinder, SelectBinder, UpdateBinder};
pub use binding::{Binding, BindingType};
pub use column_identifier::ColumnIdentifier;
pub use context::{OptimizerContext, PlannerContext, SchemaProvider};
pub use explain::{explain_logical, explain_physical};
pub use logical_plan::*;
pub use logical_planner::LogicalPlanner;
pub use optimizer::{Optimizer, OptimizerConfig, OptimizerRule};
pub use physical_plan::*;
pub use physical_planner::{create_physical_plan, PhysicalPlannerConfig};
