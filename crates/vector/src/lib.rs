//! Columnar value model shared by every physical operator.
//!
//! Architecture role:
//! - logical/physical type descriptions ([`types`])
//! - scalar values with inline vs heap-backed variable-length encoding ([`value`])
//! - fixed-width vectors with null bitmaps and attached heaps ([`column_vector`])
//! - batches of equal-length vectors ([`data_block`]) and result sets ([`table`])

mod buffer;
pub mod column_vector;
pub mod data_block;
pub mod table;
pub mod types;
pub mod value;

pub use buffer::VectorBufferType;
pub use column_vector::{ColumnVector, ColumnVectorType};
pub use data_block::DataBlock;
pub use table::ResultTable;
pub use types::{DataType, Field, LogicalType, Schema, VarcharInfo};
pub use value::{ScalarValue, Value, Varlen, VARLEN_INLINE_LENGTH, VARLEN_PREFIX_LENGTH};

pub use quiver_common::config::DEFAULT_VECTOR_SIZE;
