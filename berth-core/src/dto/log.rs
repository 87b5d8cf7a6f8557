//! Log DTOs for inter-service communication

use serde::{Deserialize, Serialize};

use crate::domain::log::NewLogEntry;

/// Batch of log entries shipped by the worker. Order within the batch is
/// preserved; the orchestrator assigns the per-deployment `order` sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogs {
    pub entries: Vec<NewLogEntry>,
}

/// Highest order assigned to an appended batch; the worker feeds it back as
/// its read cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendLogsResponse {
    pub last_order: i64,
}

/// Pagination for log reads: rows with `order` greater than `after_order`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub after_order: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    /// Include hidden (secret-bearing) entries. Off for UI reads.
    #[serde(default)]
    pub include_hidden: bool,
}
