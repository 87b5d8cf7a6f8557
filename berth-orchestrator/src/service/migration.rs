//! Migration Service
//!
//! Business logic for the cross-environment promotion pipeline: snapshot
//! capture, the approval gate, worker claim, progress reporting, and the
//! compensating rollback from the stored snapshot.

use berth_core::domain::migration::{
    EnvironmentMigration, MigrationHistory, MigrationStatus, RollbackSnapshot,
};
use berth_core::domain::resource::ResourceRef;
use berth_core::dto::migration::{CompleteMigration, CreateMigration, MigrationProgress};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::migration_repository;
use crate::repository::migration_repository::CreateOutcome;

/// Service error type
#[derive(Debug)]
pub enum MigrationError {
    NotFound(Uuid),
    /// The resource already has a pending/approved/in-progress migration.
    Conflict(ResourceRef),
    InvalidState(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

/// Create a migration with its pre-execution snapshots.
///
/// Migrations that do not require approval are created `approved` and become
/// claimable immediately; gated ones wait in `pending`.
pub async fn create(pool: &PgPool, req: CreateMigration) -> Result<EnvironmentMigration> {
    if req.source_environment_id == req.target_environment_id {
        return Err(MigrationError::ValidationError(
            "source and target environments must differ".to_string(),
        ));
    }

    let now = chrono::Utc::now();
    let status = if req.requires_approval {
        MigrationStatus::Pending
    } else {
        MigrationStatus::Approved
    };

    let snapshot = RollbackSnapshot {
        source_config: req.source_config.clone(),
        target_config: req.target_config.clone(),
        captured_at: now,
    };

    let migration = EnvironmentMigration {
        id: Uuid::new_v4(),
        source: req.source,
        source_environment_id: req.source_environment_id,
        target_environment_id: req.target_environment_id,
        target_server_ref: req.target_server_ref.clone(),
        options: req.options.clone(),
        status,
        requires_approval: req.requires_approval,
        requested_by: req.requested_by,
        approved_by: None,
        decided_at: None,
        rejection_reason: None,
        rollback_snapshot: Some(snapshot),
        linked_resources: req.linked_resources.clone(),
        progress: 0,
        current_step: None,
        error_message: None,
        worker_id: None,
        created_at: now,
        started_at: None,
        completed_at: None,
    };

    let migration = match migration_repository::create(pool, &migration).await? {
        CreateOutcome::Created(m) => m,
        CreateOutcome::Conflict => return Err(MigrationError::Conflict(req.source)),
    };

    let history = MigrationHistory {
        id: Uuid::new_v4(),
        resource: req.source,
        version: config_version(&req.source_config),
        config: req.source_config,
        migration_id: migration.id,
        created_at: now,
    };
    migration_repository::insert_history(pool, &history).await?;

    tracing::info!(
        "Migration {} created for {} ({} -> {}, {})",
        migration.id,
        migration.source,
        migration.source_environment_id,
        migration.target_environment_id,
        migration.status
    );

    Ok(migration)
}

/// Get a migration by ID.
pub async fn get_migration(pool: &PgPool, id: Uuid) -> Result<EnvironmentMigration> {
    migration_repository::find_by_id(pool, id)
        .await?
        .ok_or(MigrationError::NotFound(id))
}

/// List all migrations, newest first.
pub async fn list_migrations(pool: &PgPool) -> Result<Vec<EnvironmentMigration>> {
    Ok(migration_repository::list_all(pool).await?)
}

/// Approve a pending migration.
pub async fn approve(pool: &PgPool, id: Uuid, decided_by: Option<Uuid>) -> Result<EnvironmentMigration> {
    decide(pool, id, true, decided_by, None).await
}

/// Reject a pending migration. Terminal.
pub async fn reject(
    pool: &PgPool,
    id: Uuid,
    decided_by: Option<Uuid>,
    reason: Option<String>,
) -> Result<EnvironmentMigration> {
    decide(pool, id, false, decided_by, reason).await
}

async fn decide(
    pool: &PgPool,
    id: Uuid,
    approved: bool,
    decided_by: Option<Uuid>,
    reason: Option<String>,
) -> Result<EnvironmentMigration> {
    let migration = get_migration(pool, id).await?;

    if migration.status != MigrationStatus::Pending {
        return Err(MigrationError::InvalidState(format!(
            "migration {} is not awaiting approval (current: {})",
            id, migration.status
        )));
    }

    let updated =
        migration_repository::record_decision(pool, id, approved, decided_by, reason.as_deref())
            .await?;
    if !updated {
        return Err(MigrationError::InvalidState(format!(
            "migration {} was decided concurrently",
            id
        )));
    }

    tracing::info!(
        "Migration {} {}",
        id,
        if approved { "approved" } else { "rejected" }
    );

    get_migration(pool, id).await
}

/// Cancel a migration. Only allowed before execution begins.
pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<EnvironmentMigration> {
    let migration = get_migration(pool, id).await?;

    match migration.status {
        MigrationStatus::Pending | MigrationStatus::Approved => {
            let moved = migration_repository::transition_status(
                pool,
                id,
                migration.status,
                MigrationStatus::Cancelled,
            )
            .await?;
            if !moved {
                return Err(MigrationError::InvalidState(format!(
                    "migration {} changed state during cancellation",
                    id
                )));
            }
        }
        other => {
            return Err(MigrationError::InvalidState(format!(
                "cannot cancel migration {} in state {}",
                id, other
            )));
        }
    }

    tracing::info!("Migration {} cancelled", id);
    get_migration(pool, id).await
}

/// Claim the next approved migration for a worker.
pub async fn claim_next(pool: &PgPool, worker_id: &str) -> Result<Option<EnvironmentMigration>> {
    let claimed = migration_repository::claim_next(pool, worker_id).await?;
    if let Some(ref m) = claimed {
        tracing::info!("Migration {} claimed by worker {}", m.id, worker_id);
    }
    Ok(claimed)
}

/// Progress checkpoint from the executing worker.
pub async fn update_progress(pool: &PgPool, id: Uuid, req: MigrationProgress) -> Result<()> {
    if !(0..=100).contains(&req.progress) {
        return Err(MigrationError::ValidationError(format!(
            "progress out of range: {}",
            req.progress
        )));
    }

    migration_repository::update_progress(pool, id, req.progress, &req.current_step).await?;
    Ok(())
}

/// Terminal report from the worker.
pub async fn complete(pool: &PgPool, id: Uuid, req: CompleteMigration) -> Result<EnvironmentMigration> {
    let to = if req.success {
        MigrationStatus::Completed
    } else {
        MigrationStatus::Failed
    };

    let updated = migration_repository::complete(
        pool,
        id,
        MigrationStatus::InProgress,
        to,
        req.error_message.as_deref(),
    )
    .await?;
    if !updated {
        return Err(MigrationError::InvalidState(format!(
            "migration {} was not in progress",
            id
        )));
    }

    tracing::info!("Migration {} completed with status {}", id, to);
    get_migration(pool, id).await
}

/// Compensate a completed (or failed) migration from its stored snapshot.
///
/// Returns the snapshot so the configuration layer can restore the captured
/// state; the pipeline itself only owns the status bookkeeping.
pub async fn rollback(pool: &PgPool, id: Uuid) -> Result<(EnvironmentMigration, RollbackSnapshot)> {
    let migration = get_migration(pool, id).await?;

    if !migration.status.can_transition_to(MigrationStatus::RolledBack) {
        return Err(MigrationError::InvalidState(format!(
            "migration {} in state {} cannot be rolled back",
            id, migration.status
        )));
    }

    let Some(snapshot) = migration.rollback_snapshot.clone() else {
        return Err(MigrationError::InvalidState(format!(
            "migration {} has no rollback snapshot",
            id
        )));
    };

    let moved = migration_repository::transition_status(
        pool,
        id,
        migration.status,
        MigrationStatus::RolledBack,
    )
    .await?;
    if !moved {
        return Err(MigrationError::InvalidState(format!(
            "migration {} changed state during rollback",
            id
        )));
    }

    tracing::warn!("Migration {} rolled back from snapshot", id);

    let migration = get_migration(pool, id).await?;
    Ok((migration, snapshot))
}

/// History snapshots for a resource.
pub async fn history(pool: &PgPool, resource: ResourceRef) -> Result<Vec<MigrationHistory>> {
    Ok(migration_repository::find_history(pool, resource).await?)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Version key for a configuration blob: FNV-1a over the canonical JSON.
/// Collision resistance is not a goal; identical configs mapping to the same
/// version is.
fn config_version(config: &serde_json::Value) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let canonical = config.to_string();
    let mut hash = FNV_OFFSET;
    for byte in canonical.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_version_is_deterministic() {
        let a = serde_json::json!({"image": "app:1", "replicas": 2});
        let b = serde_json::json!({"image": "app:1", "replicas": 2});
        assert_eq!(config_version(&a), config_version(&b));
    }

    #[test]
    fn test_config_version_changes_with_content() {
        let a = serde_json::json!({"image": "app:1"});
        let b = serde_json::json!({"image": "app:2"});
        assert_ne!(config_version(&a), config_version(&b));
    }
}
