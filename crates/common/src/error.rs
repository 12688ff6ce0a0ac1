use thiserror::Error;

/// Canonical quiver error taxonomy used across crates.
///
/// Classification guidance:
/// - [`QuiverError::Parse`]: malformed SQL, surfaced verbatim from the parser
/// - [`QuiverError::Bind`]: names that do not resolve in the current bind context
/// - [`QuiverError::Planner`]: plan-construction violations
/// - [`QuiverError::Type`]: illegal type/vector-type mutation, out-of-range access, type mismatch
/// - [`QuiverError::Storage`]: capacity/arity violations in the columnar model or storage layer
/// - [`QuiverError::Executor`]: lowering, scheduling and runtime operator failures
/// - [`QuiverError::Network`]: paths that should be unreachable from the single-node core
#[derive(Debug, Error)]
pub enum QuiverError {
    /// SQL text the parser rejected.
    #[error("parse error: {0}")]
    Parse(String),

    /// Name resolution or expression arity/type failures while binding.
    ///
    /// Examples:
    /// - unknown table/column
    /// - ambiguous unqualified column
    /// - aggregate used where it is not allowed
    #[error("bind error: {0}")]
    Bind(String),

    /// Plan-construction failures.
    ///
    /// Examples:
    /// - column-name/column-type count mismatch when making a binding
    /// - more than one statement per request
    #[error("planner error: {0}")]
    Planner(String),

    /// Type-level violations in the value model.
    #[error("type error: {0}")]
    Type(String),

    /// Capacity or arity violations in vectors and storage.
    #[error("storage error: {0}")]
    Storage(String),

    /// Physical lowering or runtime execution failures.
    #[error("executor error: {0}")]
    Executor(String),

    /// Reserved for defensive "can't reach here" paths.
    #[error("network error: {0}")]
    Network(String),

    /// Invalid or inconsistent configuration/catalog state.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Valid request for a feature or shape that is not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard quiver result alias.
pub type Result<T> = std::result::Result<T, QuiverError>;
