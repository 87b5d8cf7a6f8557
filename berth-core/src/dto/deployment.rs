//! Deployment DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::application::Application;
use crate::domain::canary::CanaryState;
use crate::domain::deployment::{Deployment, DeploymentStage, DeploymentStatus, TriggerSource};
use crate::domain::settings::ApplicationSettings;

/// Request to enqueue a new deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueDeployment {
    pub application_id: Uuid,
    pub trigger: TriggerSource,
    #[serde(default)]
    pub triggered_by: Option<Uuid>,
    /// Bypass the one-active-deployment guard. Explicit opt-in only.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub rollback: bool,
    #[serde(default)]
    pub rollback_of: Option<Uuid>,
    #[serde(default)]
    pub is_promotion: bool,
    #[serde(default)]
    pub promoted_from_image: Option<String>,
    #[serde(default)]
    pub pull_request_id: Option<i64>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
}

/// Worker request to claim the next queued deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimDeployment {
    pub worker_id: String,
}

/// Everything a worker needs to run one claimed deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimedDeployment {
    pub deployment: Deployment,
    pub application: Application,
    pub settings: ApplicationSettings,
}

/// Terminal report from the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteDeployment {
    pub status: DeploymentStatus,
    #[serde(default)]
    pub failed_stage: Option<DeploymentStage>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Image produced by the build, recorded for future rollbacks.
    #[serde(default)]
    pub image: Option<String>,
}

/// Approve/reject body for the approval gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub decided_by: Option<Uuid>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Canary state checkpoint pushed by the worker at each transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryStateUpdate {
    pub state: CanaryState,
}

/// Fire-and-forget event emitted on terminal deployment states. The core
/// emits these; delivery belongs to the notification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub application_id: Uuid,
    pub deployment_id: Uuid,
    pub status: DeploymentStatus,
    pub message: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}
