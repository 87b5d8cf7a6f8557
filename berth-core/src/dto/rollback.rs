//! Rollback DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::rollback::{MetricsSnapshot, RollbackEvent, RollbackReason};

/// Request to trigger a rollback for an application, issued by the health
/// monitor (automatic) or an operator (manual).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRollback {
    pub failed_deployment_id: Uuid,
    pub reason: RollbackReason,
    #[serde(default)]
    pub metrics: MetricsSnapshot,
    /// None marks the rollback as automatic.
    #[serde(default)]
    pub triggered_by: Option<Uuid>,
}

/// Outcome of a rollback trigger. When no known-good image exists the event
/// comes back `failed` and `rollback_deployment_id` is None.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub event: RollbackEvent,
    pub rollback_deployment_id: Option<Uuid>,
}
