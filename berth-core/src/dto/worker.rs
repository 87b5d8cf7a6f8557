//! Worker registration DTOs

use serde::{Deserialize, Serialize};

/// Worker registration with the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorker {
    pub worker_id: String,
    /// Max deployments the worker runs in parallel.
    pub capacity: i32,
}

/// Periodic liveness signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: String,
}
