use std::sync::Arc;

use quiver_common::Result;
use quiver_vector::DataBlock;

use super::{take_rows, Operator};
use crate::expressions::{evaluate_to_block, selected_rows, PhysicalExpr};

/// Keeps rows whose predicate is TRUE.
pub struct FilterOperator {
    predicate: Arc<dyn PhysicalExpr>,
}

impl FilterOperator {
    pub fn new(predicate: Arc<dyn PhysicalExpr>) -> Self {
        Self { predicate }
    }
}

impl Operator for FilterOperator {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn execute(&mut self, block: DataBlock) -> Result<Vec<DataBlock>> {
        let rows = selected_rows(self.predicate.as_ref(), &block)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![take_rows(&block, &rows)?])
    }
}

pub struct ProjectOperator {
    exprs: Vec<Arc<dyn PhysicalExpr>>,
}

impl ProjectOperator {
    pub fn new(exprs: Vec<Arc<dyn PhysicalExpr>>) -> Self {
        Self { exprs }
    }
}

impl Operator for ProjectOperator {
    fn name(&self) -> &'static str {
        "Project"
    }

    fn execute(&mut self, block: DataBlock) -> Result<Vec<DataBlock>> {
        Ok(vec![evaluate_to_block(&self.exprs, &block)?])
    }
}

/// Skips `offset` rows, then passes at most `limit` rows.
pub struct LimitOperator {
    limit: Option<u64>,
    offset: u64,
    skipped: u64,
    emitted: u64,
}

impl LimitOperator {
    pub fn new(limit: Option<u64>, offset: u64) -> Self {
        Self {
            limit,
            offset,
            skipped: 0,
            emitted: 0,
        }
    }
}

impl Operator for LimitOperator {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn execute(&mut self, block: DataBlock) -> Result<Vec<DataBlock>> {
        let n = block.row_count() as u64;
        let skip = (self.offset - self.skipped).min(n);
        self.skipped += skip;
        let available = n - skip;
        let take = match self.limit {
            Some(limit) => limit.saturating_sub(self.emitted).min(available),
            None => available,
        };
        self.emitted += take;
        if take == 0 {
            return Ok(Vec::new());
        }
        if take == n {
            return Ok(vec![block]);
        }
        let rows: Vec<usize> = (skip as usize..(skip + take) as usize).collect();
        Ok(vec![take_rows(&block, &rows)?])
    }

    fn is_finished(&self) -> bool {
        self.limit.is_some_and(|limit| self.emitted >= limit)
    }
}
