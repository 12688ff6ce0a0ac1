//! Shared configuration, error types, IDs, and observability primitives for quiver crates.
//!
//! Architecture role:
//! - defines engine configuration passed across layers
//! - provides the common [`QuiverError`] / [`Result`] contracts
//! - hosts the prometheus metrics registry and injectable resource counters
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]
//! - [`resource`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod resource;

pub use config::EngineConfig;
pub use error::{QuiverError, Result};
pub use ids::*;
pub use metrics::MetricsRegistry;
pub use resource::ResourceUsage;
