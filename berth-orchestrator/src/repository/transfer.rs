//! Resource Transfer Repository
//!
//! Same guard pattern as migrations: the partial unique index
//! `ux_transfers_one_active` enforces one active transfer per resource.

use berth_core::domain::migration::RollbackSnapshot;
use berth_core::domain::resource::{ResourceKind, ResourceRef};
use berth_core::domain::transfer::{ResourceTransfer, TransferMode, TransferStatus};
use sqlx::PgPool;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

const ALL_COLUMNS: &str = r#"
    id, source_kind, source_id, target_server_ref, mode, tables, status,
    requires_approval, requested_by, approved_by, decided_at, rejection_reason,
    rollback_snapshot, bytes_total, bytes_copied, progress, current_step,
    error_message, worker_id, created_at, started_at, completed_at
"#;

pub enum CreateOutcome {
    Created(ResourceTransfer),
    Conflict,
}

/// Insert a new transfer; unique-index violation means the resource already
/// has an active transfer.
pub async fn create(
    pool: &PgPool,
    transfer: &ResourceTransfer,
) -> Result<CreateOutcome, sqlx::Error> {
    let tables = serde_json::to_value(&transfer.tables).unwrap_or_default();
    let snapshot = transfer
        .rollback_snapshot
        .as_ref()
        .map(|s| serde_json::to_value(s).unwrap_or_default());

    let result = sqlx::query(
        r#"
        INSERT INTO resource_transfers
            (id, source_kind, source_id, target_server_ref, mode, tables, status,
             requires_approval, requested_by, rollback_snapshot, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(transfer.id)
    .bind(transfer.source.kind.as_str())
    .bind(transfer.source.id)
    .bind(&transfer.target_server_ref)
    .bind(mode_to_string(transfer.mode))
    .bind(tables)
    .bind(status_to_string(transfer.status))
    .bind(transfer.requires_approval)
    .bind(transfer.requested_by)
    .bind(snapshot)
    .bind(transfer.created_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(CreateOutcome::Created(transfer.clone())),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Ok(CreateOutcome::Conflict)
        }
        Err(e) => Err(e),
    }
}

/// Find a transfer by ID.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ResourceTransfer>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransferRow>(&format!(
        "SELECT {ALL_COLUMNS} FROM resource_transfers WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Compare-and-swap a status transition.
pub async fn transition_status(
    pool: &PgPool,
    id: Uuid,
    from: TransferStatus,
    to: TransferStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE resource_transfers SET status = $1 WHERE id = $2 AND status = $3",
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
        TransferStatus::Approved
    } else {
        TransferStatus::Rejected
    };

    let result = sqlx::query(
        r#"
        UPDATE resource_transfers
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

/// Atomically claim the oldest approved transfer for a worker.
pub async fn claim_next(
    pool: &PgPool,
    worker_id: &str,
) -> Result<Option<ResourceTransfer>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransferRow>(&format!(
        r#"
        UPDATE resource_transfers
        SET status = 'in_progress', started_at = $1, worker_id = $2
        WHERE id = (
            SELECT id FROM resource_transfers
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

/// Byte-level progress checkpoint.
pub async fn update_progress(
    pool: &PgPool,
    id: Uuid,
    bytes_copied: i64,
    bytes_total: i64,
    progress: i32,
    current_step: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE resource_transfers
        SET bytes_copied = $1, bytes_total = $2, progress = $3, current_step = $4
        WHERE id = $5 AND status = 'in_progress'
        "#,
    )
    .bind(bytes_copied)
    .bind(bytes_total)
    .bind(progress.clamp(0, 100))
    .bind(current_step)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a terminal status. CAS from `in_progress`.
pub async fn complete(
    pool: &PgPool,
    id: Uuid,
    to: TransferStatus,
    error_message: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE resource_transfers
        SET status = $1, error_message = $2, completed_at = $3,
            progress = CASE WHEN $1 = 'completed' THEN 100 ELSE progress END
        WHERE id = $4 AND status = 'in_progress'
        "#,
    )
    .bind(status_to_string(to))
    .bind(error_message)
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn mode_to_string(mode: TransferMode) -> &'static str {
    match mode {
        TransferMode::Clone => "clone",
        TransferMode::DataOnly => "data_only",
        TransferMode::PartialTables => "partial_tables",
    }
}

fn string_to_mode(s: &str) -> TransferMode {
    match s {
        "data_only" => TransferMode::DataOnly,
        "partial_tables" => TransferMode::PartialTables,
        _ => TransferMode::Clone,
    }
}

fn status_to_string(status: TransferStatus) -> &'static str {
    match status {
        TransferStatus::Pending => "pending",
        TransferStatus::Approved => "approved",
        TransferStatus::Rejected => "rejected",
        TransferStatus::InProgress => "in_progress",
        TransferStatus::Completed => "completed",
        TransferStatus::Failed => "failed",
        TransferStatus::Cancelled => "cancelled",
    }
}

fn string_to_status(s: &str) -> TransferStatus {
    match s {
        "pending" => TransferStatus::Pending,
        "approved" => TransferStatus::Approved,
        "rejected" => TransferStatus::Rejected,
        "in_progress" => TransferStatus::InProgress,
        "completed" => TransferStatus::Completed,
        "failed" => TransferStatus::Failed,
        "cancelled" => TransferStatus::Cancelled,
        _ => TransferStatus::Pending,
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
struct TransferRow {
    id: Uuid,
    source_kind: String,
    source_id: Uuid,
    target_server_ref: String,
    mode: String,
    tables: serde_json::Value,
    status: String,
    requires_approval: bool,
    requested_by: Option<Uuid>,
    approved_by: Option<Uuid>,
    decided_at: Option<chrono::DateTime<chrono::Utc>>,
    rejection_reason: Option<String>,
    rollback_snapshot: Option<serde_json::Value>,
    bytes_total: i64,
    bytes_copied: i64,
    progress: i32,
    current_step: Option<String>,
    error_message: Option<String>,
    worker_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<TransferRow> for ResourceTransfer {
    fn from(row: TransferRow) -> Self {
        let rollback_snapshot: Option<RollbackSnapshot> = row
            .rollback_snapshot
            .and_then(|v| serde_json::from_value(v).ok());
        let tables: Vec<String> = serde_json::from_value(row.tables).unwrap_or_default();

        ResourceTransfer {
            id: row.id,
            source: ResourceRef::new(string_to_kind(&row.source_kind), row.source_id),
            target_server_ref: row.target_server_ref,
            mode: string_to_mode(&row.mode),
            tables,
            status: string_to_status(&row.status),
            requires_approval: row.requires_approval,
            requested_by: row.requested_by,
            approved_by: row.approved_by,
            decided_at: row.decided_at,
            rejection_reason: row.rejection_reason,
            rollback_snapshot,
            bytes_total: row.bytes_total,
            bytes_copied: row.bytes_copied,
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
