use quiver_common::Result;
use quiver_vector::DataBlock;

use crate::catalog::TableDef;
use crate::stats::TableStats;

/// Storage abstraction for reading and writing table data.
///
/// Physical operators call these as opaque primitives; implementations own
/// persistence and layout.
pub trait StorageProvider: Send + Sync {
    /// Prepares storage for a newly created table.
    fn create_table(&self, table: &TableDef) -> Result<()>;

    /// Reads every block of `table`.
    ///
    /// `projection` lists the column positions to return, in order. `None`
    /// returns all columns.
    ///
    /// # Errors
    /// Returns an error when the table has no storage or a position is out of range.
    fn scan(&self, table: &TableDef, projection: Option<&[usize]>) -> Result<Vec<DataBlock>>;

    /// Appends one block and returns the number of rows written.
    fn append(&self, table: &TableDef, block: DataBlock) -> Result<u64>;

    /// Replaces the full contents of `table`.
    fn replace(&self, table: &TableDef, blocks: Vec<DataBlock>) -> Result<()>;

    /// Estimates table-level stats for optimizer decisions.
    fn estimate_stats(&self, table: &TableDef) -> TableStats;
}
