//! Deployment Repository
//!
//! Handles all database operations for the deployment queue. Status moves
//! are compare-and-swap UPDATEs guarded on the current status, never
//! read-then-write, because workers may be distributed across machines.

use berth_core::domain::canary::CanaryState;
use berth_core::domain::deployment::{
    ApprovalDecision, ApprovalRecord, Deployment, DeploymentStage, DeploymentStatus, TriggerSource,
};
use berth_core::dto::deployment::EnqueueDeployment;
use sqlx::PgPool;
use uuid::Uuid;

const ALL_COLUMNS: &str = r#"
    id, application_id, status, trigger, triggered_by, requires_approval,
    approval_decision, approval_decided_by, approval_note, approval_decided_at,
    rollback, rollback_of, is_promotion, promoted_from_image, image,
    canary_state, canary_promotion_requested, pull_request_id, commit_sha,
    commit_message, worker_id, cancel_requested, failed_stage, error_message,
    created_at, started_at, finished_at
"#;

/// Create a deployment entry in the given initial status.
///
/// The insert carries the single-active-per-application guard in one
/// statement: unless `force`, nothing is written while another non-terminal
/// entry exists for the application. Returns None when the guard rejected
/// the insert.
pub async fn create(
    pool: &PgPool,
    req: &EnqueueDeployment,
    initial_status: DeploymentStatus,
) -> Result<Option<Deployment>, sqlx::Error> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();

    let mut tx = pool.begin().await?;

    // Two concurrent enqueues can both pass the NOT EXISTS check under
    // READ COMMITTED; the advisory lock serializes the guarded insert per
    // application for the duration of this transaction.
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(application_lock_key(req.application_id))
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO deployments
            (id, application_id, status, trigger, triggered_by, requires_approval,
             rollback, rollback_of, is_promotion, promoted_from_image,
             pull_request_id, commit_sha, commit_message, created_at)
        SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
        WHERE $15 OR NOT EXISTS (
            SELECT 1 FROM deployments
            WHERE application_id = $2
              AND status IN ('queued', 'pending_approval', 'in_progress')
        )
        "#,
    )
    .bind(id)
    .bind(req.application_id)
    .bind(status_to_string(initial_status))
    .bind(trigger_to_string(req.trigger))
    .bind(req.triggered_by)
    .bind(initial_status == DeploymentStatus::PendingApproval)
    .bind(req.rollback)
    .bind(req.rollback_of)
    .bind(req.is_promotion)
    .bind(&req.promoted_from_image)
    .bind(req.pull_request_id)
    .bind(&req.commit_sha)
    .bind(&req.commit_message)
    .bind(now)
    .bind(req.force)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    find_by_id(pool, id).await
}

/// Stable 64-bit advisory lock key for an application's enqueue path.
fn application_lock_key(application_id: Uuid) -> i64 {
    let b = application_id.as_bytes();
    i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Find a deployment by ID.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Deployment>, sqlx::Error> {
    let row = sqlx::query_as::<_, DeploymentRow>(&format!(
        "SELECT {ALL_COLUMNS} FROM deployments WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List deployments for an application, newest first.
pub async fn find_by_application(
    pool: &PgPool,
    application_id: Uuid,
) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
        "SELECT {ALL_COLUMNS} FROM deployments WHERE application_id = $1 ORDER BY created_at DESC"
    ))
    .bind(application_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Most recently created deployment for an application, if any.
pub async fn find_latest_for_application(
    pool: &PgPool,
    application_id: Uuid,
) -> Result<Option<Deployment>, sqlx::Error> {
    let row = sqlx::query_as::<_, DeploymentRow>(&format!(
        "SELECT {ALL_COLUMNS} FROM deployments
         WHERE application_id = $1 ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(application_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Newest finished forward deployment with a runnable image, excluding the
/// given deployment. Rollback target lookup for when the last-successful
/// pointer names the regressed deployment itself.
pub async fn find_last_good_excluding(
    pool: &PgPool,
    application_id: Uuid,
    exclude: Uuid,
) -> Result<Option<Deployment>, sqlx::Error> {
    let row = sqlx::query_as::<_, DeploymentRow>(&format!(
        r#"
        SELECT {ALL_COLUMNS} FROM deployments
        WHERE application_id = $1
          AND status = 'finished'
          AND rollback = FALSE
          AND id != $2
          AND (image IS NOT NULL OR promoted_from_image IS NOT NULL)
        ORDER BY finished_at DESC NULLS LAST
        LIMIT 1
        "#
    ))
    .bind(application_id)
    .bind(exclude)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Atomically claim the oldest queued deployment for a worker.
///
/// `FOR UPDATE SKIP LOCKED` makes concurrent claimers pick distinct rows;
/// the status guard in the UPDATE makes the transition a compare-and-swap,
/// so exactly one worker wins a given entry.
pub async fn claim_next(
    pool: &PgPool,
    worker_id: &str,
) -> Result<Option<Deployment>, sqlx::Error> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, DeploymentRow>(&format!(
        r#"
        UPDATE deployments
        SET status = 'in_progress', started_at = $1, worker_id = $2
        WHERE id = (
            SELECT id FROM deployments
            WHERE status = 'queued'
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        AND status = 'queued'
        RETURNING {ALL_COLUMNS}
        "#
    ))
    .bind(now)
    .bind(worker_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Compare-and-swap a status transition. Returns true when this caller won.
pub async fn transition_status(
    pool: &PgPool,
    id: Uuid,
    from: DeploymentStatus,
    to: DeploymentStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE deployments
        SET status = $1
        WHERE id = $2 AND status = $3
        "#,
    )
    .bind(status_to_string(to))
    .bind(id)
    .bind(status_to_string(from))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record the approval gate decision and move the deployment out of
/// `pending_approval`. CAS on the current status.
pub async fn record_decision(
    pool: &PgPool,
    id: Uuid,
    decision: ApprovalDecision,
    decided_by: Option<Uuid>,
    note: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let next = match decision {
        ApprovalDecision::Approved => DeploymentStatus::Queued,
        ApprovalDecision::Rejected => DeploymentStatus::Rejected,
    };
    let decision_str = match decision {
        ApprovalDecision::Approved => "approved",
        ApprovalDecision::Rejected => "rejected",
    };

    let result = sqlx::query(
        r#"
        UPDATE deployments
        SET status = $1, approval_decision = $2, approval_decided_by = $3,
            approval_note = $4, approval_decided_at = $5
        WHERE id = $6 AND status = 'pending_approval'
        "#,
    )
    .bind(status_to_string(next))
    .bind(decision_str)
    .bind(decided_by)
    .bind(note)
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark terminal status with failure details and finish time. CAS from
/// `in_progress`.
pub async fn complete(
    pool: &PgPool,
    id: Uuid,
    status: DeploymentStatus,
    failed_stage: Option<DeploymentStage>,
    error_message: Option<&str>,
    image: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE deployments
        SET status = $1, failed_stage = $2, error_message = $3,
            image = COALESCE($4, image), finished_at = $5
        WHERE id = $6 AND status = 'in_progress'
        "#,
    )
    .bind(status_to_string(status))
    .bind(failed_stage.map(|s| s.as_str()))
    .bind(error_message)
    .bind(image)
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record cancellation intent on a running deployment; the worker observes
/// the flag at its next stage boundary.
pub async fn request_cancel(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE deployments
        SET cancel_requested = TRUE
        WHERE id = $1 AND status = 'in_progress'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Persist the canary sub-state-machine checkpoint.
pub async fn update_canary_state(
    pool: &PgPool,
    id: Uuid,
    state: &CanaryState,
) -> Result<(), sqlx::Error> {
    let value = serde_json::to_value(state).unwrap_or_default();

    sqlx::query("UPDATE deployments SET canary_state = $1 WHERE id = $2")
        .bind(value)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Flag a canary held at 100% for explicit promotion.
pub async fn request_canary_promotion(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE deployments
        SET canary_promotion_requested = TRUE
        WHERE id = $1 AND status = 'in_progress'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Queued => "queued",
        DeploymentStatus::PendingApproval => "pending_approval",
        DeploymentStatus::Rejected => "rejected",
        DeploymentStatus::InProgress => "in_progress",
        DeploymentStatus::Finished => "finished",
        DeploymentStatus::Failed => "failed",
        DeploymentStatus::Cancelled => "cancelled",
    }
}

fn string_to_status(s: &str) -> DeploymentStatus {
    match s {
        "queued" => DeploymentStatus::Queued,
        "pending_approval" => DeploymentStatus::PendingApproval,
        "rejected" => DeploymentStatus::Rejected,
        "in_progress" => DeploymentStatus::InProgress,
        "finished" => DeploymentStatus::Finished,
        "failed" => DeploymentStatus::Failed,
        "cancelled" => DeploymentStatus::Cancelled,
        _ => DeploymentStatus::Queued,
    }
}

fn trigger_to_string(trigger: TriggerSource) -> &'static str {
    match trigger {
        TriggerSource::Manual => "manual",
        TriggerSource::Webhook => "webhook",
        TriggerSource::Api => "api",
        TriggerSource::Scheduled => "scheduled",
    }
}

fn string_to_trigger(s: &str) -> TriggerSource {
    match s {
        "manual" => TriggerSource::Manual,
        "webhook" => TriggerSource::Webhook,
        "api" => TriggerSource::Api,
        "scheduled" => TriggerSource::Scheduled,
        _ => TriggerSource::Manual,
    }
}

fn string_to_stage(s: &str) -> Option<DeploymentStage> {
    DeploymentStage::ALL
        .into_iter()
        .find(|stage| stage.as_str() == s)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    application_id: Uuid,
    status: String,
    trigger: String,
    triggered_by: Option<Uuid>,
    requires_approval: bool,
    approval_decision: Option<String>,
    approval_decided_by: Option<Uuid>,
    approval_note: Option<String>,
    approval_decided_at: Option<chrono::DateTime<chrono::Utc>>,
    rollback: bool,
    rollback_of: Option<Uuid>,
    is_promotion: bool,
    promoted_from_image: Option<String>,
    image: Option<String>,
    canary_state: Option<serde_json::Value>,
    canary_promotion_requested: bool,
    pull_request_id: Option<i64>,
    commit_sha: Option<String>,
    commit_message: Option<String>,
    worker_id: Option<String>,
    cancel_requested: bool,
    failed_stage: Option<String>,
    error_message: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<DeploymentRow> for Deployment {
    fn from(row: DeploymentRow) -> Self {
        let approval = match (row.approval_decision.as_deref(), row.approval_decided_at) {
            (Some("approved"), Some(decided_at)) => Some(ApprovalRecord {
                decision: ApprovalDecision::Approved,
                decided_by: row.approval_decided_by,
                note: row.approval_note.clone(),
                decided_at,
            }),
            (Some("rejected"), Some(decided_at)) => Some(ApprovalRecord {
                decision: ApprovalDecision::Rejected,
                decided_by: row.approval_decided_by,
                note: row.approval_note.clone(),
                decided_at,
            }),
            _ => None,
        };

        let canary_state = row
            .canary_state
            .and_then(|value| serde_json::from_value(value).ok());

        Deployment {
            id: row.id,
            application_id: row.application_id,
            status: string_to_status(&row.status),
            trigger: string_to_trigger(&row.trigger),
            triggered_by: row.triggered_by,
            requires_approval: row.requires_approval,
            approval,
            rollback: row.rollback,
            rollback_of: row.rollback_of,
            is_promotion: row.is_promotion,
            promoted_from_image: row.promoted_from_image,
            image: row.image,
            canary_state,
            canary_promotion_requested: row.canary_promotion_requested,
            pull_request_id: row.pull_request_id,
            commit_sha: row.commit_sha,
            commit_message: row.commit_message,
            worker_id: row.worker_id,
            cancel_requested: row.cancel_requested,
            failed_stage: row.failed_stage.as_deref().and_then(string_to_stage),
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_is_stable_per_application() {
        let id = Uuid::new_v4();
        assert_eq!(application_lock_key(id), application_lock_key(id));
    }

    #[test]
    fn test_lock_key_differs_across_applications() {
        let a = Uuid::from_bytes([1; 16]);
        let b = Uuid::from_bytes([2; 16]);
        assert_ne!(application_lock_key(a), application_lock_key(b));
    }
}
