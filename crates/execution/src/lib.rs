//! Query execution: runtime services, expression evaluation, pipelines and
//! the stage scheduler.
//!
//! Architecture role:
//! - holds per-engine services in [`RuntimeEnv`] and per-query state in [`QueryContext`]
//! - compiles planner expressions into block-wise [`PhysicalExpr`]s
//! - cuts physical plans into [`Stage`]s at pipeline breakers
//! - runs stages in dependency order on the [`Scheduler`]
//!
//! Key modules:
//! - [`context`]
//! - [`expressions`]
//! - [`operators`]
//! - [`pipeline`]
//! - [`scheduler`]
//! - [`udf`]

pub mod context;
pub mod expressions;
pub mod operators;
pub mod pipeline;
pub mod scheduler;
pub mod udf;

// Re-export only what you want at the crate root (no globs).
pub use context::{QueryContext, RuntimeEnv};
pub use expressions::{compile_expr, PhysicalExpr};
pub use pipeline::{OperatorSpec, Pipeline, SinkSpec, SourceSpec, Stage};
pub use scheduler::Scheduler;
pub use udf::{FunctionRegistry, ScalarFunction};
