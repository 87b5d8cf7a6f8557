//! Deployment Service
//!
//! Business logic for the deployment queue and its state machine: enqueue
//! with the single-active guard, the approval gate, the worker claim, and
//! terminal completion.

use berth_core::domain::deployment::{ApprovalDecision, Deployment, DeploymentStatus};
use berth_core::domain::log::DeploymentLogEntry;
use berth_core::domain::rollback::RollbackEventStatus;
use berth_core::dto::deployment::{
    CanaryStateUpdate, ClaimedDeployment, CompleteDeployment, EnqueueDeployment,
    NotificationEvent,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{
    application_repository, deployment_repository, log_repository, rollback_repository,
};

/// Service error type
#[derive(Debug)]
pub enum DeploymentError {
    NotFound(Uuid),
    ApplicationNotFound(Uuid),
    /// An active entry already exists for the application and `force` is off.
    ConcurrentDeployment(Uuid),
    InvalidState(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for DeploymentError {
    fn from(err: sqlx::Error) -> Self {
        DeploymentError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, DeploymentError>;

/// Enqueue a deployment attempt.
///
/// The entry starts in `pending_approval` when the application's environment
/// gates deployments and the attempt is neither a rollback nor a promotion;
/// automated safety actions are never blocked on human approval.
pub async fn enqueue(pool: &PgPool, req: EnqueueDeployment) -> Result<Deployment> {
    let application = application_repository::find_by_id(pool, req.application_id)
        .await?
        .ok_or(DeploymentError::ApplicationNotFound(req.application_id))?;

    if req.rollback && req.promoted_from_image.is_none() && req.rollback_of.is_none() {
        return Err(DeploymentError::ValidationError(
            "rollback deployments must reference the deployment they compensate".to_string(),
        ));
    }

    let settings = application_repository::find_settings(pool, req.application_id).await?;
    let gated = settings.requires_approval && !req.rollback && !req.is_promotion;
    let initial_status = if gated {
        DeploymentStatus::PendingApproval
    } else {
        DeploymentStatus::Queued
    };

    let deployment = deployment_repository::create(pool, &req, initial_status)
        .await?
        .ok_or(DeploymentError::ConcurrentDeployment(req.application_id))?;

    tracing::info!(
        "Deployment {} enqueued for application {} ({}, trigger: {})",
        deployment.id,
        application.name,
        deployment.status,
        deployment.trigger
    );

    Ok(deployment)
}

/// Get a deployment by ID.
pub async fn get_deployment(pool: &PgPool, id: Uuid) -> Result<Deployment> {
    deployment_repository::find_by_id(pool, id)
        .await?
        .ok_or(DeploymentError::NotFound(id))
}

/// List deployments for an application, newest first.
pub async fn list_for_application(pool: &PgPool, application_id: Uuid) -> Result<Vec<Deployment>> {
    application_repository::find_by_id(pool, application_id)
        .await?
        .ok_or(DeploymentError::ApplicationNotFound(application_id))?;

    Ok(deployment_repository::find_by_application(pool, application_id).await?)
}

/// Most recent deployment for an application.
pub async fn latest_for_application(
    pool: &PgPool,
    application_id: Uuid,
) -> Result<Option<Deployment>> {
    Ok(deployment_repository::find_latest_for_application(pool, application_id).await?)
}

/// Claim the next queued deployment for a worker, bundling the application
/// and settings the worker needs to execute it.
pub async fn claim_next(pool: &PgPool, worker_id: &str) -> Result<Option<ClaimedDeployment>> {
    let Some(deployment) = deployment_repository::claim_next(pool, worker_id).await? else {
        return Ok(None);
    };

    let application = application_repository::find_by_id(pool, deployment.application_id)
        .await?
        .ok_or(DeploymentError::ApplicationNotFound(deployment.application_id))?;
    let settings = application_repository::find_settings(pool, deployment.application_id).await?;

    tracing::info!(
        "Deployment {} claimed by worker {}",
        deployment.id,
        worker_id
    );

    Ok(Some(ClaimedDeployment {
        deployment,
        application,
        settings,
    }))
}

/// Record a terminal status reported by the worker.
///
/// On `finished`, the application's last-known-good pointer moves to this
/// deployment; on any terminal state of a rollback deployment, the linked
/// rollback event is closed out.
pub async fn complete(pool: &PgPool, id: Uuid, req: CompleteDeployment) -> Result<Deployment> {
    let deployment = get_deployment(pool, id).await?;

    if !req.status.is_terminal() || req.status == DeploymentStatus::Rejected {
        return Err(DeploymentError::ValidationError(format!(
            "invalid completion status: {}",
            req.status
        )));
    }

    if !deployment.status.can_transition_to(req.status) {
        return Err(DeploymentError::InvalidState(format!(
            "deployment {} cannot move from {} to {}",
            id, deployment.status, req.status
        )));
    }

    let updated = deployment_repository::complete(
        pool,
        id,
        req.status,
        req.failed_stage,
        req.error_message.as_deref(),
        req.image.as_deref(),
    )
    .await?;

    if !updated {
        return Err(DeploymentError::InvalidState(format!(
            "deployment {} was not in progress",
            id
        )));
    }

    if req.status == DeploymentStatus::Finished {
        application_repository::set_last_successful_deployment(
            pool,
            deployment.application_id,
            id,
        )
        .await?;
    }

    if deployment.rollback {
        let event_status = match req.status {
            DeploymentStatus::Finished => RollbackEventStatus::Completed,
            _ => RollbackEventStatus::Failed,
        };
        rollback_repository::complete_by_rollback_deployment(pool, id, event_status).await?;
    }

    tracing::info!(
        "Deployment {} completed with status {} (stage: {:?})",
        id,
        req.status,
        req.failed_stage
    );

    emit_notification(&deployment, req.status, req.error_message.as_deref());

    get_deployment(pool, id).await
}

/// Fire-and-forget terminal-state event. Delivery (webhooks, chat) belongs
/// to an external consumer subscribed to the `berth::notifications` target.
fn emit_notification(deployment: &Deployment, status: DeploymentStatus, error: Option<&str>) {
    let event = NotificationEvent {
        application_id: deployment.application_id,
        deployment_id: deployment.id,
        status,
        message: error
            .map(str::to_string)
            .unwrap_or_else(|| format!("deployment reached {}", status)),
        occurred_at: chrono::Utc::now(),
    };

    match serde_json::to_string(&event) {
        Ok(payload) => {
            tracing::info!(target: "berth::notifications", %payload, "deployment terminal state")
        }
        Err(e) => tracing::warn!("Could not serialize notification event: {}", e),
    }
}

/// Cancel a deployment.
///
/// Queued entries cancel immediately; in-progress entries only record the
/// intent, which the worker observes at its next stage boundary. Remote side
/// effects already issued are not unwound.
pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<Deployment> {
    let deployment = get_deployment(pool, id).await?;

    match deployment.status {
        // A gated deployment exits only through approve/reject.
        DeploymentStatus::Queued => {
            let moved = deployment_repository::transition_status(
                pool,
                id,
                deployment.status,
                DeploymentStatus::Cancelled,
            )
            .await?;
            if !moved {
                return Err(DeploymentError::InvalidState(format!(
                    "deployment {} changed state during cancellation",
                    id
                )));
            }
            tracing::info!("Deployment {} cancelled before execution", id);
            emit_notification(&deployment, DeploymentStatus::Cancelled, None);
        }
        DeploymentStatus::InProgress => {
            deployment_repository::request_cancel(pool, id).await?;
            tracing::info!("Cancellation requested for running deployment {}", id);
        }
        other => {
            return Err(DeploymentError::InvalidState(format!(
                "cannot cancel deployment {} in state {}",
                id, other
            )));
        }
    }

    get_deployment(pool, id).await
}

/// Approve a gated deployment, moving it into the regular queue.
pub async fn approve(
    pool: &PgPool,
    id: Uuid,
    decided_by: Option<Uuid>,
    note: Option<String>,
) -> Result<Deployment> {
    decide(pool, id, ApprovalDecision::Approved, decided_by, note).await
}

/// Reject a gated deployment. Terminal; it never executes.
pub async fn reject(
    pool: &PgPool,
    id: Uuid,
    decided_by: Option<Uuid>,
    note: Option<String>,
) -> Result<Deployment> {
    decide(pool, id, ApprovalDecision::Rejected, decided_by, note).await
}

async fn decide(
    pool: &PgPool,
    id: Uuid,
    decision: ApprovalDecision,
    decided_by: Option<Uuid>,
    note: Option<String>,
) -> Result<Deployment> {
    let deployment = get_deployment(pool, id).await?;

    if deployment.status != DeploymentStatus::PendingApproval {
        return Err(DeploymentError::InvalidState(format!(
            "deployment {} is not awaiting approval (current: {})",
            id, deployment.status
        )));
    }

    let updated =
        deployment_repository::record_decision(pool, id, decision, decided_by, note.as_deref())
            .await?;
    if !updated {
        return Err(DeploymentError::InvalidState(format!(
            "deployment {} was decided concurrently",
            id
        )));
    }

    tracing::info!("Deployment {} decision recorded: {:?}", id, decision);

    get_deployment(pool, id).await
}

/// Persist a canary checkpoint from the worker.
pub async fn update_canary_state(pool: &PgPool, id: Uuid, req: CanaryStateUpdate) -> Result<()> {
    let deployment = get_deployment(pool, id).await?;

    if deployment.status != DeploymentStatus::InProgress {
        return Err(DeploymentError::InvalidState(format!(
            "deployment {} is not in progress",
            id
        )));
    }

    deployment_repository::update_canary_state(pool, id, &req.state).await?;
    Ok(())
}

/// Request explicit promotion of a canary holding at 100%.
pub async fn request_canary_promotion(pool: &PgPool, id: Uuid) -> Result<()> {
    let flagged = deployment_repository::request_canary_promotion(pool, id).await?;
    if !flagged {
        return Err(DeploymentError::InvalidState(format!(
            "deployment {} is not running a canary",
            id
        )));
    }

    tracing::info!("Canary promotion requested for deployment {}", id);
    Ok(())
}

/// Ordered log page for a deployment.
pub async fn get_logs(
    pool: &PgPool,
    id: Uuid,
    after_order: i64,
    limit: i64,
    include_hidden: bool,
) -> Result<Vec<DeploymentLogEntry>> {
    get_deployment(pool, id).await?;

    Ok(log_repository::find_after(pool, id, after_order, limit, include_hidden).await?)
}
