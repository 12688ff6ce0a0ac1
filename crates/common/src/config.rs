use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};

/// Default number of logical values held by one column vector.
pub const DEFAULT_VECTOR_SIZE: usize = 8192;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Column vector capacity and maximum rows per data block.
    pub vector_size: usize,
    /// Worker threads used by the pipeline scheduler.
    pub worker_threads: usize,
    /// When false, the unoptimized logical plan is lowered as-is.
    pub enable_optimizer: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vector_size: DEFAULT_VECTOR_SIZE,
            worker_threads: 4,
            enable_optimizer: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.vector_size == 0 {
            return Err(QuiverError::InvalidConfig(
                "vector_size must be greater than zero".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(QuiverError::InvalidConfig(
                "worker_threads must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
