//! Environment Migration Repository
//!
//! The one-active-migration-per-resource invariant lives in the partial
//! unique index `ux_migrations_one_active`; this module maps the resulting
//! unique violation so the service layer can surface `MigrationConflict`.

use berth_core::domain::migration::{
    EnvironmentMigration, MigrationHistory, MigrationOptions, MigrationStatus, RollbackSnapshot,
};
use berth_core::domain::resource::{ResourceKind, ResourceRef};
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres SQLSTATE for unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

const ALL_COLUMNS: &str = r#"
    id, source_kind, source_id, source_environment_id, target_environment_id,
    target_server_ref, options, status, requires_approval, requested_by,
    approved_by, decided_at, rejection_reason, rollback_snapshot,
    linked_resources, progress, current_step, error_message, worker_id,
    created_at, started_at, completed_at
"#;

/// Outcome of a create attempt: the active-migration guard is enforced by
/// the database, not by a read.
pub enum CreateOutcome {
    Created(EnvironmentMigration),
    Conflict,
}

/// Insert a new migration. A unique-index violation means the resource
/// already has an active migration.
pub async fn create(
    pool: &PgPool,
    migration: &EnvironmentMigration,
) -> Result<CreateOutcome, sqlx::Error> {
    let options = serde_json::to_value(&migration.options).unwrap_or_default();
    let snapshot = migration
        .rollback_snapshot
        .as_ref()
        .map(|s| serde_json::to_value(s).unwrap_or_default());
    let linked = serde_json::to_value(&migration.linked_resources).unwrap_or_default();

    let result = sqlx::query(
        r#"
        INSERT INTO environment_migrations
            (id, source_kind, source_id, source_environment_id, target_environment_id,
             target_server_ref, options, status, requires_approval, requested_by,
             rollback_snapshot, linked_resources, progress, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0, $13)
        "#,
    )
    .bind(migration.id)
    .bind(migration.source.kind.as_str())
    .bind(migration.source.id)
    .bind(migration.source_environment_id)
    .bind(migration.target_environment_id)
    .bind(&migration.target_server_ref)
    .bind(options)
    .bind(status_to_string(migration.status))
    .bind(migration.requires_approval)
    .bind(migration.requested_by)
    .bind(snapshot)
    .bind(linked)
    .bind(migration.created_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(CreateOutcome::Created(migration.clone())),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Ok(CreateOutcome::Conflict)
        }
        Err(e) => Err(e),
    }
}

/// Find a migration by ID.
pub async fn find_by_id(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<EnvironmentMigration>, sqlx::Error> {
    let row = sqlx::query_as::<_, MigrationRow>(&format!(
        "SELECT {ALL_COLUMNS} FROM environment_migrations WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List migrations, newest first.
pub async fn list_all(pool: &PgPool) -> Result<Vec<EnvironmentMigration>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MigrationRow>(&format!(
        "SELECT {ALL_COLUMNS} FROM environment_migrations ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Compare-and-swap a status transition. Returns true when this caller won.
pub async fn transition_status(
    pool: &PgPool,
    id: Uuid,
    from: MigrationStatus,
    to: MigrationStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE environment_migrations
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

/// Record the gate decision. CAS from `pending`.
pub async fn record_decision(
    pool: &PgPool,
    id: Uuid,
    approved: bool,
    decided_by: Option<Uuid>,
    rejection_reason: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let next = if approved {
        MigrationStatus::Approved
    } else {
        MigrationStatus::Rejected
    };

    let result = sqlx::query(
        r#"
        UPDATE environment_migrations
        SET status = $1, approved_by = $2, decided_at = $3, rejection_reason = $4
        WHERE id = $5 AND status = 'pending'
        "#,
    )
    .bind(status_to_string(next))
    .bind(decided_by)
    .bind(chrono::Utc::now())
    .bind(rejection_reason)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Atomically claim the oldest approved migration for a worker.
pub async fn claim_next(
    pool: &PgPool,
    worker_id: &str,
) -> Result<Option<EnvironmentMigration>, sqlx::Error> {
    let row = sqlx::query_as::<_, MigrationRow>(&format!(
        r#"
        UPDATE environment_migrations
        SET status = 'in_progress', started_at = $1, worker_id = $2
        WHERE id = (
            SELECT id FROM environment_migrations
            WHERE status = 'approved'
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        AND status = 'approved'
        RETURNING {ALL_COLUMNS}
        "#
    ))
    .bind(chrono::Utc::now())
    .bind(worker_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Progress checkpoint from the executing worker.
pub async fn update_progress(
    pool: &PgPool,
    id: Uuid,
    progress: i32,
    current_step: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE environment_migrations
        SET progress = $1, current_step = $2
        WHERE id = $3 AND status = 'in_progress'
        "#,
    )
    .bind(progress.clamp(0, 100))
    .bind(current_step)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a terminal status with completion time. CAS on the expected
/// predecessor.
pub async fn complete(
    pool: &PgPool,
    id: Uuid,
    from: MigrationStatus,
    to: MigrationStatus,
    error_message: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE environment_migrations
        SET status = $1, error_message = $2, completed_at = $3,
            progress = CASE WHEN $1 = 'completed' THEN 100 ELSE progress END
        WHERE id = $4 AND status = $5
        "#,
    )
    .bind(status_to_string(to))
    .bind(error_message)
    .bind(chrono::Utc::now())
    .bind(id)
    .bind(status_to_string(from))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Insert a versioned configuration snapshot.
pub async fn insert_history(pool: &PgPool, history: &MigrationHistory) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO migration_history
            (id, resource_kind, resource_id, version, config, migration_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (resource_kind, resource_id, version) DO NOTHING
        "#,
    )
    .bind(history.id)
    .bind(history.resource.kind.as_str())
    .bind(history.resource.id)
    .bind(&history.version)
    .bind(&history.config)
    .bind(history.migration_id)
    .bind(history.created_at)
    .execute(pool)
    .await?;

    // An unchanged configuration hashes to an existing version; that is fine.
    let _ = result.rows_affected();
    Ok(())
}

/// History snapshots for one resource, newest first.
pub async fn find_history(
    pool: &PgPool,
    resource: ResourceRef,
) -> Result<Vec<MigrationHistory>, sqlx::Error> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT id, resource_kind, resource_id, version, config, migration_id, created_at
        FROM migration_history
        WHERE resource_kind = $1 AND resource_id = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(resource.kind.as_str())
    .bind(resource.id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: MigrationStatus) -> &'static str {
    match status {
        MigrationStatus::Pending => "pending",
        MigrationStatus::Approved => "approved",
        MigrationStatus::Rejected => "rejected",
        MigrationStatus::InProgress => "in_progress",
        MigrationStatus::Completed => "completed",
        MigrationStatus::Failed => "failed",
        MigrationStatus::RolledBack => "rolled_back",
        MigrationStatus::Cancelled => "cancelled",
    }
}

fn string_to_status(s: &str) -> MigrationStatus {
    match s {
        "pending" => MigrationStatus::Pending,
        "approved" => MigrationStatus::Approved,
        "rejected" => MigrationStatus::Rejected,
        "in_progress" => MigrationStatus::InProgress,
        "completed" => MigrationStatus::Completed,
        "failed" => MigrationStatus::Failed,
        "rolled_back" => MigrationStatus::RolledBack,
        "cancelled" => MigrationStatus::Cancelled,
        _ => MigrationStatus::Pending,
    }
}

fn string_to_kind(s: &str) -> ResourceKind {
    match s {
        "service" => ResourceKind::Service,
        "database" => ResourceKind::Database,
        _ => ResourceKind::Application,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct MigrationRow {
    id: Uuid,
    source_kind: String,
    source_id: Uuid,
    source_environment_id: Uuid,
    target_environment_id: Uuid,
    target_server_ref: String,
    options: serde_json::Value,
    status: String,
    requires_approval: bool,
    requested_by: Option<Uuid>,
    approved_by: Option<Uuid>,
    decided_at: Option<chrono::DateTime<chrono::Utc>>,
    rejection_reason: Option<String>,
    rollback_snapshot: Option<serde_json::Value>,
    linked_resources: serde_json::Value,
    progress: i32,
    current_step: Option<String>,
    error_message: Option<String>,
    worker_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<MigrationRow> for EnvironmentMigration {
    fn from(row: MigrationRow) -> Self {
        let options: MigrationOptions =
            serde_json::from_value(row.options).unwrap_or_default();
        let rollback_snapshot: Option<RollbackSnapshot> = row
            .rollback_snapshot
            .and_then(|v| serde_json::from_value(v).ok());
        let linked_resources: Vec<ResourceRef> =
            serde_json::from_value(row.linked_resources).unwrap_or_default();

        EnvironmentMigration {
            id: row.id,
            source: ResourceRef::new(string_to_kind(&row.source_kind), row.source_id),
            source_environment_id: row.source_environment_id,
            target_environment_id: row.target_environment_id,
            target_server_ref: row.target_server_ref,
            options,
            status: string_to_status(&row.status),
            requires_approval: row.requires_approval,
            requested_by: row.requested_by,
            approved_by: row.approved_by,
            decided_at: row.decided_at,
            rejection_reason: row.rejection_reason,
            rollback_snapshot,
            linked_resources,
            progress: row.progress,
            current_step: row.current_step,
            error_message: row.error_message,
            worker_id: row.worker_id,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    resource_kind: String,
    resource_id: Uuid,
    version: String,
    config: serde_json::Value,
    migration_id: Uuid,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<HistoryRow> for MigrationHistory {
    fn from(row: HistoryRow) -> Self {
        MigrationHistory {
            id: row.id,
            resource: ResourceRef::new(string_to_kind(&row.resource_kind), row.resource_id),
            version: row.version,
            config: row.config,
            migration_id: row.migration_id,
            created_at: row.created_at,
        }
    }
}
