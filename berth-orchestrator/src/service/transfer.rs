//! Transfer Service
//!
//! Same-tier duplication pipeline. Mirrors the migration service's gate and
//! claim flow with byte-level progress instead of step percentages.

use berth_core::domain::migration::RollbackSnapshot;
use berth_core::domain::resource::ResourceRef;
use berth_core::domain::transfer::{ResourceTransfer, TransferMode, TransferStatus};
use berth_core::dto::transfer::{CreateTransfer, TransferProgress};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::transfer_repository;
use crate::repository::transfer_repository::CreateOutcome;

/// Service error type
#[derive(Debug)]
pub enum TransferError {
    NotFound(Uuid),
    Conflict(ResourceRef),
    InvalidState(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for TransferError {
    fn from(err: sqlx::Error) -> Self {
        TransferError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;

/// Create a transfer with its pre-execution snapshot.
pub async fn create(pool: &PgPool, req: CreateTransfer) -> Result<ResourceTransfer> {
    if req.mode == TransferMode::PartialTables && req.tables.is_empty() {
        return Err(TransferError::ValidationError(
            "partial transfers must name at least one table".to_string(),
        ));
    }

    let now = chrono::Utc::now();
    let status = if req.requires_approval {
        TransferStatus::Pending
    } else {
        TransferStatus::Approved
    };

    let transfer = ResourceTransfer {
        id: Uuid::new_v4(),
        source: req.source,
        target_server_ref: req.target_server_ref.clone(),
        mode: req.mode,
        tables: req.tables.clone(),
        status,
        requires_approval: req.requires_approval,
        requested_by: req.requested_by,
        approved_by: None,
        decided_at: None,
        rejection_reason: None,
        rollback_snapshot: Some(RollbackSnapshot {
            source_config: req.source_config,
            target_config: None,
            captured_at: now,
        }),
        bytes_total: 0,
        bytes_copied: 0,
        progress: 0,
        current_step: None,
        error_message: None,
        worker_id: None,
        created_at: now,
        started_at: None,
        completed_at: None,
    };

    let transfer = match transfer_repository::create(pool, &transfer).await? {
        CreateOutcome::Created(t) => t,
        CreateOutcome::Conflict => return Err(TransferError::Conflict(req.source)),
    };

    tracing::info!(
        "Transfer {} created for {} ({} onto {})",
        transfer.id,
        transfer.source,
        transfer.mode,
        transfer.target_server_ref
    );

    Ok(transfer)
}

/// Get a transfer by ID.
pub async fn get_transfer(pool: &PgPool, id: Uuid) -> Result<ResourceTransfer> {
    transfer_repository::find_by_id(pool, id)
        .await?
        .ok_or(TransferError::NotFound(id))
}

/// Approve a pending transfer.
pub async fn approve(pool: &PgPool, id: Uuid, decided_by: Option<Uuid>) -> Result<ResourceTransfer> {
    decide(pool, id, true, decided_by, None).await
}

/// Reject a pending transfer. Terminal.
pub async fn reject(
    pool: &PgPool,
    id: Uuid,
    decided_by: Option<Uuid>,
    reason: Option<String>,
) -> Result<ResourceTransfer> {
    decide(pool, id, false, decided_by, reason).await
}

async fn decide(
    pool: &PgPool,
    id: Uuid,
    approved: bool,
    decided_by: Option<Uuid>,
    reason: Option<String>,
) -> Result<ResourceTransfer> {
    let transfer = get_transfer(pool, id).await?;

    if transfer.status != TransferStatus::Pending {
        return Err(TransferError::InvalidState(format!(
            "transfer {} is not awaiting approval (current: {})",
            id, transfer.status
        )));
    }

    let updated =
        transfer_repository::record_decision(pool, id, approved, decided_by, reason.as_deref())
            .await?;
    if !updated {
        return Err(TransferError::InvalidState(format!(
            "transfer {} was decided concurrently",
            id
        )));
    }

    get_transfer(pool, id).await
}

/// Cancel a transfer before execution begins.
pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<ResourceTransfer> {
    let transfer = get_transfer(pool, id).await?;

    match transfer.status {
        TransferStatus::Pending | TransferStatus::Approved => {
            let moved = transfer_repository::transition_status(
                pool,
                id,
                transfer.status,
                TransferStatus::Cancelled,
            )
            .await?;
            if !moved {
                return Err(TransferError::InvalidState(format!(
                    "transfer {} changed state during cancellation",
                    id
                )));
            }
        }
        other => {
            return Err(TransferError::InvalidState(format!(
                "cannot cancel transfer {} in state {}",
                id, other
            )));
        }
    }

    get_transfer(pool, id).await
}

/// Claim the next approved transfer for a worker.
pub async fn claim_next(pool: &PgPool, worker_id: &str) -> Result<Option<ResourceTransfer>> {
    Ok(transfer_repository::claim_next(pool, worker_id).await?)
}

/// Byte-level progress checkpoint.
pub async fn update_progress(pool: &PgPool, id: Uuid, req: TransferProgress) -> Result<()> {
    if req.bytes_copied < 0 || req.bytes_total < 0 {
        return Err(TransferError::ValidationError(
            "byte counters cannot be negative".to_string(),
        ));
    }

    transfer_repository::update_progress(
        pool,
        id,
        req.bytes_copied,
        req.bytes_total,
        req.percent(),
        &req.current_step,
    )
    .await?;
    Ok(())
}

/// Terminal report from the worker.
pub async fn complete(
    pool: &PgPool,
    id: Uuid,
    success: bool,
    error_message: Option<String>,
) -> Result<ResourceTransfer> {
    let to = if success {
        TransferStatus::Completed
    } else {
        TransferStatus::Failed
    };

    let updated = transfer_repository::complete(pool, id, to, error_message.as_deref()).await?;
    if !updated {
        return Err(TransferError::InvalidState(format!(
            "transfer {} was not in progress",
            id
        )));
    }

    tracing::info!("Transfer {} completed with status {}", id, to);
    get_transfer(pool, id).await
}
