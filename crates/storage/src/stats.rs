use serde::{Deserialize, Serialize};

/// Table-level statistics used by the optimizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub rows: Option<u64>,
    pub bytes: Option<u64>,
}
