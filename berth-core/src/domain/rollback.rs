//! Rollback event domain types
//!
//! Audit trail linking a failed (or unhealthy-but-finished) deployment to the
//! compensating deployment it spawned. Immutable once completed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One automatic-or-manual rollback occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackEvent {
    pub id: Uuid,
    pub application_id: Uuid,
    /// Deployment whose regression triggered the rollback.
    pub failed_deployment_id: Uuid,
    /// Compensating deployment, None until it has been enqueued.
    pub rollback_deployment_id: Option<Uuid>,
    /// None means the rollback was automatic.
    pub triggered_by: Option<Uuid>,
    pub reason: RollbackReason,
    /// Sampled values at trigger time.
    pub metrics: MetricsSnapshot,
    pub status: RollbackEventStatus,
    pub from_commit: Option<String>,
    pub to_commit: Option<String>,
    pub error_message: Option<String>,
    pub triggered_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReason {
    HealthCheckFail,
    CrashLoop,
    ErrorRate,
    Manual,
}

impl std::fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::HealthCheckFail => "health_check_fail",
            Self::CrashLoop => "crash_loop",
            Self::ErrorRate => "error_rate",
            Self::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackEventStatus {
    /// Rollback deployment enqueued, not yet finished.
    Triggered,
    /// Compensating deployment reached `finished`.
    Completed,
    /// Rollback could not proceed (typically no known-good image). Terminal,
    /// human-escalated; never silently retried.
    Failed,
}

impl std::fmt::Display for RollbackEventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Triggered => "triggered",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Health metrics captured when a rollback fires.
///
/// Every field defaults so snapshots written by older (or newer) versions
/// still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub health_status: Option<String>,
    #[serde(default)]
    pub restart_count: i32,
    #[serde(default)]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub consecutive_failures: i32,
    /// Seconds into the validation window when the trigger fired.
    #[serde(default)]
    pub window_elapsed_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_deserializes_from_partial_blob() {
        let s: MetricsSnapshot = serde_json::from_str(r#"{"restart_count": 4}"#).unwrap();
        assert_eq!(s.restart_count, 4);
        assert_eq!(s.error_rate, None);
        assert_eq!(s.consecutive_failures, 0);
    }

    #[test]
    fn test_snapshot_ignores_unknown_fields() {
        let s: MetricsSnapshot =
            serde_json::from_str(r#"{"restart_count": 1, "p99_latency_ms": 250}"#).unwrap();
        assert_eq!(s.restart_count, 1);
    }

    #[test]
    fn test_reason_wire_format() {
        let json = serde_json::to_string(&RollbackReason::CrashLoop).unwrap();
        assert_eq!(json, "\"crash_loop\"");
    }
}
