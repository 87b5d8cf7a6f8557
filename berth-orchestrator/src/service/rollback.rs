//! Rollback Service
//!
//! Turns a rollback trigger (from the health monitor or an operator) into a
//! ledger event plus a compensating deployment built from the last
//! known-good image. A missing known-good image is a terminal, escalated
//! failure, never an unbounded retry.

use berth_core::domain::deployment::{Deployment, TriggerSource};
use berth_core::domain::rollback::{RollbackEvent, RollbackEventStatus};
use berth_core::dto::deployment::EnqueueDeployment;
use berth_core::dto::rollback::{RollbackOutcome, TriggerRollback};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{application_repository, deployment_repository, rollback_repository};

/// Service error type
#[derive(Debug)]
pub enum RollbackError {
    ApplicationNotFound(Uuid),
    DeploymentNotFound(Uuid),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RollbackError {
    fn from(err: sqlx::Error) -> Self {
        RollbackError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, RollbackError>;

/// Trigger a rollback for an application.
///
/// Always records a `RollbackEvent`. When a known-good image exists, a new
/// `rollback=true` deployment is enqueued (bypassing the approval gate and
/// the single-active guard does not apply to it being the compensation) and
/// linked to the event; otherwise the event is recorded as `failed` with an
/// explanatory message and no deployment is created.
pub async fn trigger(
    pool: &PgPool,
    application_id: Uuid,
    req: TriggerRollback,
) -> Result<RollbackOutcome> {
    let application = application_repository::find_by_id(pool, application_id)
        .await?
        .ok_or(RollbackError::ApplicationNotFound(application_id))?;

    let failed_deployment = deployment_repository::find_by_id(pool, req.failed_deployment_id)
        .await?
        .ok_or(RollbackError::DeploymentNotFound(req.failed_deployment_id))?;

    let pointer = match application.last_successful_deployment_id {
        Some(id) => deployment_repository::find_by_id(pool, id).await?,
        None => None,
    };
    let earlier = deployment_repository::find_last_good_excluding(
        pool,
        application_id,
        req.failed_deployment_id,
    )
    .await?;
    let last_good = restore_source(pointer, earlier, req.failed_deployment_id);

    let mut event = RollbackEvent {
        id: Uuid::new_v4(),
        application_id,
        failed_deployment_id: req.failed_deployment_id,
        rollback_deployment_id: None,
        triggered_by: req.triggered_by,
        reason: req.reason,
        metrics: req.metrics.clone(),
        status: RollbackEventStatus::Triggered,
        from_commit: failed_deployment.commit_sha.clone(),
        to_commit: last_good.as_ref().and_then(|d| d.commit_sha.clone()),
        error_message: None,
        triggered_at: chrono::Utc::now(),
        completed_at: None,
    };

    let Some(last_good) = last_good else {
        event.status = RollbackEventStatus::Failed;
        event.error_message = Some(format!(
            "no successful deployment to roll back to for application {}",
            application_id
        ));
        event.completed_at = Some(chrono::Utc::now());
        rollback_repository::create(pool, &event).await?;

        tracing::error!(
            "Rollback for application {} cannot proceed: no known-good image (reason: {})",
            application_id,
            req.reason
        );

        return Ok(RollbackOutcome {
            event,
            rollback_deployment_id: None,
        });
    };

    let image = last_good
        .image
        .clone()
        .or(last_good.promoted_from_image.clone());

    rollback_repository::create(pool, &event).await?;

    // force: the regressed deployment may still count as active while its
    // monitor winds down, and the compensation must not be blocked by it.
    let enqueue = EnqueueDeployment {
        application_id,
        trigger: TriggerSource::Api,
        triggered_by: req.triggered_by,
        force: true,
        rollback: true,
        rollback_of: Some(req.failed_deployment_id),
        is_promotion: false,
        promoted_from_image: image,
        pull_request_id: None,
        commit_sha: last_good.commit_sha.clone(),
        commit_message: last_good.commit_message.clone(),
    };

    let rollback_deployment = deployment_repository::create(
        pool,
        &enqueue,
        berth_core::domain::deployment::DeploymentStatus::Queued,
    )
    .await?
    // Forced inserts are never rejected by the active-deployment guard.
    .ok_or(RollbackError::DatabaseError(sqlx::Error::RowNotFound))?;

    rollback_repository::link_rollback_deployment(pool, event.id, rollback_deployment.id).await?;
    event.rollback_deployment_id = Some(rollback_deployment.id);

    tracing::warn!(
        "Rollback triggered for application {} (reason: {}, failed: {}, compensating: {})",
        application_id,
        req.reason,
        req.failed_deployment_id,
        rollback_deployment.id
    );

    Ok(RollbackOutcome {
        event,
        rollback_deployment_id: Some(rollback_deployment.id),
    })
}

/// Picks the deployment to restore from.
///
/// `complete()` advances the last-successful pointer to a deployment the
/// moment it finishes, so by the time its validation window fires the
/// pointer usually names the regressed deployment itself. Fall back to the
/// newest earlier success in that case.
fn restore_source(
    pointer: Option<Deployment>,
    earlier: Option<Deployment>,
    failed_id: Uuid,
) -> Option<Deployment> {
    pointer
        .filter(|d| d.id != failed_id)
        .or_else(|| earlier.filter(|d| d.id != failed_id))
}

/// Rollback history for an application, newest first.
pub async fn history(pool: &PgPool, application_id: Uuid) -> Result<Vec<RollbackEvent>> {
    application_repository::find_by_id(pool, application_id)
        .await?
        .ok_or(RollbackError::ApplicationNotFound(application_id))?;

    Ok(rollback_repository::find_by_application(pool, application_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::domain::deployment::DeploymentStatus;

    fn finished(image: &str) -> Deployment {
        Deployment {
            id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            status: DeploymentStatus::Finished,
            trigger: TriggerSource::Api,
            triggered_by: None,
            requires_approval: false,
            approval: None,
            rollback: false,
            rollback_of: None,
            is_promotion: false,
            promoted_from_image: None,
            image: Some(image.to_string()),
            canary_state: None,
            canary_promotion_requested: false,
            pull_request_id: None,
            commit_sha: None,
            commit_message: None,
            worker_id: None,
            cancel_requested: false,
            failed_stage: None,
            error_message: None,
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            finished_at: Some(chrono::Utc::now()),
        }
    }

    #[test]
    fn test_pointer_naming_the_regressed_deployment_falls_back() {
        // The regressed deployment finished last, so the pointer names it;
        // the older success must still be found.
        let older = finished("registry.example.com/web:v1");
        let regressed = finished("registry.example.com/web:v2");

        let source = restore_source(
            Some(regressed.clone()),
            Some(older.clone()),
            regressed.id,
        );
        assert_eq!(source.map(|d| d.id), Some(older.id));
    }

    #[test]
    fn test_valid_pointer_wins_over_fallback() {
        let pointer = finished("registry.example.com/web:v1");
        let earlier = finished("registry.example.com/web:v0");
        let failed = Uuid::new_v4();

        let source = restore_source(Some(pointer.clone()), Some(earlier), failed);
        assert_eq!(source.map(|d| d.id), Some(pointer.id));
    }

    #[test]
    fn test_no_prior_success_yields_nothing() {
        let regressed = finished("registry.example.com/web:v1");
        assert!(restore_source(Some(regressed.clone()), None, regressed.id).is_none());
        assert!(restore_source(None, None, regressed.id).is_none());
    }
}
