//! Shared error taxonomy for the deployment lifecycle
//!
//! Orchestrator, worker, and client classify failures with this enum so
//! retry behavior is decided once: transient infrastructure errors are
//! retried with bounded backoff inside a stage, everything else terminates
//! the state machine and lands in the record's `error_message`.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::deployment::DeploymentStage;
use crate::domain::resource::ResourceRef;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// An active (non-terminal) deployment already exists for the application.
    #[error("application {0} already has an active deployment")]
    ConcurrentDeployment(Uuid),

    /// Execution was attempted on a deployment still waiting on its gate.
    #[error("deployment {0} requires approval before execution")]
    ApprovalRequired(Uuid),

    /// A remote command or build failed at the application level; never
    /// retried, reported for triage with the failing stage and exit info.
    #[error("stage {stage} failed (exit {exit_code}): {message}")]
    StageExecution {
        stage: DeploymentStage,
        exit_code: i32,
        message: String,
    },

    /// Connection-level failure; retried with bounded backoff in the stage.
    #[error("transient infrastructure error: {0}")]
    TransientInfra(String),

    /// No prior successful deployment exists to roll back to.
    #[error("no successful deployment to roll back to for application {0}")]
    RollbackUnavailable(Uuid),

    /// The resource already has a pending/approved/in-progress migration.
    #[error("resource {0} already has an active migration")]
    MigrationConflict(ResourceRef),

    /// Canary error-rate threshold breached mid-rollout.
    #[error("canary aborted: {0}")]
    CanaryAborted(String),
}

impl LifecycleError {
    /// Whether the failure is retryable at the stage level.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientInfra(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_infra_errors_are_transient() {
        assert!(LifecycleError::TransientInfra("ssh reset".into()).is_transient());
        assert!(
            !LifecycleError::StageExecution {
                stage: DeploymentStage::BuildImage,
                exit_code: 1,
                message: "image not found".into(),
            }
            .is_transient()
        );
        assert!(!LifecycleError::ConcurrentDeployment(Uuid::nil()).is_transient());
    }

    #[test]
    fn test_stage_error_message_carries_stage_and_exit() {
        let err = LifecycleError::StageExecution {
            stage: DeploymentStage::PushImage,
            exit_code: 125,
            message: "denied".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("push_image"));
        assert!(msg.contains("125"));
    }
}
