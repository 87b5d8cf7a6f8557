//! Deployment domain types
//!
//! A `Deployment` is one attempt to deploy one application. Rows are
//! append-only history: they are created at enqueue time, mutated only by the
//! execution worker and the approval gate, and never deleted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::canary::CanaryState;

/// One deployment attempt for one application.
///
/// Structure shared between orchestrator (persists) and worker (executes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub application_id: Uuid,
    pub status: DeploymentStatus,
    pub trigger: TriggerSource,
    /// Absent for automated triggers (webhook, scheduled, auto-rollback).
    pub triggered_by: Option<Uuid>,
    pub requires_approval: bool,
    pub approval: Option<ApprovalRecord>,
    /// True when this deployment compensates for a failed/unhealthy one.
    pub rollback: bool,
    /// The deployment this rollback compensates for.
    pub rollback_of: Option<Uuid>,
    pub is_promotion: bool,
    /// Image ref deployed verbatim instead of building (rollbacks, promotions).
    pub promoted_from_image: Option<String>,
    /// Image ref produced by the build stage, recorded for rollback lookup.
    pub image: Option<String>,
    pub canary_state: Option<CanaryState>,
    /// Set while a canary holds at 100% waiting for a manual promote.
    pub canary_promotion_requested: bool,
    /// Preview builds carry the pull request they were generated for.
    pub pull_request_id: Option<i64>,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    /// Worker that claimed this deployment.
    pub worker_id: Option<String>,
    /// Cooperative cancellation intent, observed at stage boundaries.
    pub cancel_requested: bool,
    pub failed_stage: Option<DeploymentStage>,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Deployment {
    /// Whether the state machine can still advance.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Deployment state machine status.
///
/// `queued -> (pending_approval -> queued|rejected) -> in_progress ->
/// {finished | failed | cancelled}`. Terminal states never transition again;
/// a rollback is a new `Deployment`, not a transition of the failed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Queued,
    PendingApproval,
    Rejected,
    InProgress,
    Finished,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Cancelled | Self::Rejected
        )
    }

    /// Validates a single state-machine transition.
    pub fn can_transition_to(self, next: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        match (self, next) {
            // The gate exits only via its own decision, never cancellation.
            (PendingApproval, Queued) | (PendingApproval, Rejected) => true,
            (Queued, InProgress) | (Queued, Cancelled) => true,
            (InProgress, Finished) | (InProgress, Failed) | (InProgress, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::PendingApproval => "pending_approval",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// What caused a deployment to be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Webhook,
    Api,
    Scheduled,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::Webhook => "webhook",
            Self::Api => "api",
            Self::Scheduled => "scheduled",
        };
        write!(f, "{}", s)
    }
}

/// Approval gate decision attached to a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub decision: ApprovalDecision,
    pub decided_by: Option<Uuid>,
    pub note: Option<String>,
    pub decided_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// Stages executed, in order, by the worker for one deployment.
///
/// A stage failure records the failing stage on the deployment; no later
/// stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStage {
    Prepare,
    CloneSource,
    BuildImage,
    PushImage,
    Deploy,
    HealthCheck,
    SmokeTest,
    Finish,
}

impl DeploymentStage {
    /// Full stage sequence for a regular build-and-deploy run.
    pub const ALL: [DeploymentStage; 8] = [
        Self::Prepare,
        Self::CloneSource,
        Self::BuildImage,
        Self::PushImage,
        Self::Deploy,
        Self::HealthCheck,
        Self::SmokeTest,
        Self::Finish,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::CloneSource => "clone_source",
            Self::BuildImage => "build_image",
            Self::PushImage => "push_image",
            Self::Deploy => "deploy",
            Self::HealthCheck => "health_check",
            Self::SmokeTest => "smoke_test",
            Self::Finish => "finish",
        }
    }
}

impl std::fmt::Display for DeploymentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(DeploymentStatus::Finished.is_terminal());
        assert!(DeploymentStatus::Failed.is_terminal());
        assert!(DeploymentStatus::Cancelled.is_terminal());
        assert!(DeploymentStatus::Rejected.is_terminal());
        assert!(!DeploymentStatus::Queued.is_terminal());
        assert!(!DeploymentStatus::PendingApproval.is_terminal());
        assert!(!DeploymentStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_valid_transitions() {
        use DeploymentStatus::*;
        assert!(PendingApproval.can_transition_to(Queued));
        assert!(PendingApproval.can_transition_to(Rejected));
        assert!(Queued.can_transition_to(InProgress));
        assert!(Queued.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Finished));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(Cancelled));
    }

    #[test]
    fn test_rejected_is_a_dead_end() {
        use DeploymentStatus::*;
        for next in [
            Queued,
            PendingApproval,
            InProgress,
            Finished,
            Failed,
            Cancelled,
            Rejected,
        ] {
            assert!(!Rejected.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_skipping_approval() {
        use DeploymentStatus::*;
        assert!(!PendingApproval.can_transition_to(InProgress));
        assert!(!PendingApproval.can_transition_to(Finished));
    }

    #[test]
    fn test_gate_exits_only_via_decision() {
        use DeploymentStatus::*;
        assert!(!PendingApproval.can_transition_to(Cancelled));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&DeploymentStatus::PendingApproval).unwrap();
        assert_eq!(json, "\"pending_approval\"");
    }
}
