//! Storage boundary: catalog of table definitions and the provider trait
//! physical operators use to read and write table data.

pub mod catalog;
pub mod memory;
pub mod provider;
pub mod stats;

pub use catalog::*;
pub use memory::MemoryStorage;
pub use provider::*;
pub use stats::TableStats;
