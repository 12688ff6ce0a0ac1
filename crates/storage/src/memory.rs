use std::collections::HashMap;

use parking_lot::RwLock;
use quiver_common::{QuiverError, Result};
use quiver_vector::DataBlock;
use tracing::debug;

use crate::catalog::TableDef;
use crate::provider::StorageProvider;
use crate::stats::TableStats;

/// Process-local storage keeping every table as a list of blocks.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<String, Vec<DataBlock>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(table: &TableDef) -> String {
    table.name.to_ascii_lowercase()
}

fn check_arity(table: &TableDef, block: &DataBlock) -> Result<()> {
    if block.column_count() != table.schema.len() {
        return Err(QuiverError::Storage(format!(
            "table '{}' has {} columns, block has {}",
            table.name,
            table.schema.len(),
            block.column_count()
        )));
    }
    Ok(())
}

impl StorageProvider for MemoryStorage {
    fn create_table(&self, table: &TableDef) -> Result<()> {
        self.tables.write().entry(key(table)).or_default();
        Ok(())
    }

    fn scan(&self, table: &TableDef, projection: Option<&[usize]>) -> Result<Vec<DataBlock>> {
        let tables = self.tables.read();
        let Some(blocks) = tables.get(&key(table)) else {
            // Registered in the catalog but never written.
            return Ok(Vec::new());
        };
        let Some(projection) = projection else {
            return Ok(blocks.clone());
        };
        blocks
            .iter()
            .map(|b| {
                let columns = projection
                    .iter()
                    .map(|&i| {
                        b.column(i).cloned().ok_or_else(|| {
                            QuiverError::Storage(format!(
                                "projection index {i} out of range for table '{}'",
                                table.name
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                DataBlock::new(columns, b.row_count())
            })
            .collect()
    }

    fn append(&self, table: &TableDef, block: DataBlock) -> Result<u64> {
        check_arity(table, &block)?;
        let rows = block.row_count() as u64;
        debug!(table = %table.name, rows, "append block");
        self.tables.write().entry(key(table)).or_default().push(block);
        Ok(rows)
    }

    fn replace(&self, table: &TableDef, blocks: Vec<DataBlock>) -> Result<()> {
        for b in &blocks {
            check_arity(table, b)?;
        }
        debug!(table = %table.name, blocks = blocks.len(), "replace contents");
        self.tables.write().insert(key(table), blocks);
        Ok(())
    }

    fn estimate_stats(&self, table: &TableDef) -> TableStats {
        let tables = self.tables.read();
        match tables.get(&key(table)) {
            Some(blocks) => TableStats {
                rows: Some(blocks.iter().map(|b| b.row_count() as u64).sum()),
                bytes: table.stats.bytes,
            },
            None => table.stats,
        }
    }
}
