//! Deployment log domain types
//!
//! Logs are append-only rows keyed by `(deployment_id, order)`. `order` is
//! assigned server-side and strictly increases per deployment, so readers can
//! page with "rows after order N" and never observe gaps or reordering.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One persisted line of deployment output. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentLogEntry {
    pub deployment_id: Uuid,
    /// Monotonic append sequence within the deployment.
    pub order: i64,
    /// Command that produced the output, when one was run.
    pub command: Option<String>,
    pub output: String,
    pub stream: LogStream,
    /// Stage the entry was emitted from.
    pub stage: String,
    /// Hidden entries carry secrets-bearing commands; excluded from UI reads.
    pub hidden: bool,
    /// Send batch the worker shipped this entry in.
    pub batch: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A log entry as produced by the worker, before the orchestrator assigns
/// its `order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub command: Option<String>,
    pub output: String,
    pub stream: LogStream,
    pub stage: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub batch: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}
