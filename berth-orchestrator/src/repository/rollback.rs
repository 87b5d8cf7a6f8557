//! Rollback Event Repository
//!
//! Audit ledger for automatic and manual rollbacks.

use berth_core::domain::rollback::{
    MetricsSnapshot, RollbackEvent, RollbackEventStatus, RollbackReason,
};
use sqlx::PgPool;
use uuid::Uuid;

/// Persist a new rollback event.
pub async fn create(pool: &PgPool, event: &RollbackEvent) -> Result<(), sqlx::Error> {
    let metrics = serde_json::to_value(&event.metrics).unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO rollback_events
            (id, application_id, failed_deployment_id, rollback_deployment_id,
             triggered_by, reason, metrics, status, from_commit, to_commit,
             error_message, triggered_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(event.id)
    .bind(event.application_id)
    .bind(event.failed_deployment_id)
    .bind(event.rollback_deployment_id)
    .bind(event.triggered_by)
    .bind(reason_to_string(event.reason))
    .bind(metrics)
    .bind(status_to_string(event.status))
    .bind(&event.from_commit)
    .bind(&event.to_commit)
    .bind(&event.error_message)
    .bind(event.triggered_at)
    .bind(event.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Link the compensating deployment once it has been enqueued.
pub async fn link_rollback_deployment(
    pool: &PgPool,
    event_id: Uuid,
    rollback_deployment_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE rollback_events SET rollback_deployment_id = $1 WHERE id = $2")
        .bind(rollback_deployment_id)
        .bind(event_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Close out the event once its compensating deployment terminates.
pub async fn complete_by_rollback_deployment(
    pool: &PgPool,
    rollback_deployment_id: Uuid,
    status: RollbackEventStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE rollback_events
        SET status = $1, completed_at = $2
        WHERE rollback_deployment_id = $3 AND status = 'triggered'
        "#,
    )
    .bind(status_to_string(status))
    .bind(chrono::Utc::now())
    .bind(rollback_deployment_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find an event by ID.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<RollbackEvent>, sqlx::Error> {
    let row = sqlx::query_as::<_, RollbackEventRow>(
        r#"
        SELECT id, application_id, failed_deployment_id, rollback_deployment_id,
               triggered_by, reason, metrics, status, from_commit, to_commit,
               error_message, triggered_at, completed_at
        FROM rollback_events
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Rollback history for an application, newest first.
pub async fn find_by_application(
    pool: &PgPool,
    application_id: Uuid,
) -> Result<Vec<RollbackEvent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RollbackEventRow>(
        r#"
        SELECT id, application_id, failed_deployment_id, rollback_deployment_id,
               triggered_by, reason, metrics, status, from_commit, to_commit,
               error_message, triggered_at, completed_at
        FROM rollback_events
        WHERE application_id = $1
        ORDER BY triggered_at DESC
        "#,
    )
    .bind(application_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn reason_to_string(reason: RollbackReason) -> &'static str {
    match reason {
        RollbackReason::HealthCheckFail => "health_check_fail",
        RollbackReason::CrashLoop => "crash_loop",
        RollbackReason::ErrorRate => "error_rate",
        RollbackReason::Manual => "manual",
    }
}

fn string_to_reason(s: &str) -> RollbackReason {
    match s {
        "health_check_fail" => RollbackReason::HealthCheckFail,
        "crash_loop" => RollbackReason::CrashLoop,
        "error_rate" => RollbackReason::ErrorRate,
        _ => RollbackReason::Manual,
    }
}

fn status_to_string(status: RollbackEventStatus) -> &'static str {
    match status {
        RollbackEventStatus::Triggered => "triggered",
        RollbackEventStatus::Completed => "completed",
        RollbackEventStatus::Failed => "failed",
    }
}

fn string_to_status(s: &str) -> RollbackEventStatus {
    match s {
        "completed" => RollbackEventStatus::Completed,
        "failed" => RollbackEventStatus::Failed,
        _ => RollbackEventStatus::Triggered,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RollbackEventRow {
    id: Uuid,
    application_id: Uuid,
    failed_deployment_id: Uuid,
    rollback_deployment_id: Option<Uuid>,
    triggered_by: Option<Uuid>,
    reason: String,
    metrics: serde_json::Value,
    status: String,
    from_commit: Option<String>,
    to_commit: Option<String>,
    error_message: Option<String>,
    triggered_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<RollbackEventRow> for RollbackEvent {
    fn from(row: RollbackEventRow) -> Self {
        let metrics: MetricsSnapshot = serde_json::from_value(row.metrics).unwrap_or_default();

        RollbackEvent {
            id: row.id,
            application_id: row.application_id,
            failed_deployment_id: row.failed_deployment_id,
            rollback_deployment_id: row.rollback_deployment_id,
            triggered_by: row.triggered_by,
            reason: string_to_reason(&row.reason),
            metrics,
            status: string_to_status(&row.status),
            from_commit: row.from_commit,
            to_commit: row.to_commit,
            error_message: row.error_message,
            triggered_at: row.triggered_at,
            completed_at: row.completed_at,
        }
    }
}
