//! Embedded client for quiver: the [`Engine`] facade over one session, and
//! [`QueryResult`] rendering used by the `quiver` binary.

mod session;

pub mod engine;
pub mod query_result;
pub mod repl;

pub use engine::Engine;
pub use query_result::QueryResult;
pub use repl::{run_repl, ReplOptions};
