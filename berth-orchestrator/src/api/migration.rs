//! Environment Migration API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use berth_core::domain::migration::{EnvironmentMigration, MigrationHistory};
use berth_core::domain::resource::{ResourceKind, ResourceRef};
use berth_core::dto::deployment::DecisionRequest;
use berth_core::dto::migration::{
    ClaimMigration, CompleteMigration, CreateMigration, MigrationProgress,
    MigrationRollbackResponse,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::migration_service;

/// POST /migration
pub async fn create_migration(
    State(pool): State<PgPool>,
    Json(req): Json<CreateMigration>,
) -> ApiResult<(StatusCode, Json<EnvironmentMigration>)> {
    let migration = migration_service::create(&pool, req).await?;
    Ok((StatusCode::CREATED, Json(migration)))
}

/// GET /migration/{id}
pub async fn get_migration(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EnvironmentMigration>> {
    let migration = migration_service::get_migration(&pool, id).await?;
    Ok(Json(migration))
}

/// GET /migrations
pub async fn list_migrations(
    State(pool): State<PgPool>,
) -> ApiResult<Json<Vec<EnvironmentMigration>>> {
    let migrations = migration_service::list_migrations(&pool).await?;
    Ok(Json(migrations))
}

/// POST /migration/{id}/approve
pub async fn approve_migration(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<EnvironmentMigration>> {
    let migration = migration_service::approve(&pool, id, req.decided_by).await?;
    Ok(Json(migration))
}

/// POST /migration/{id}/reject
pub async fn reject_migration(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<EnvironmentMigration>> {
    let migration = migration_service::reject(&pool, id, req.decided_by, req.note).await?;
    Ok(Json(migration))
}

/// POST /migration/{id}/cancel
pub async fn cancel_migration(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EnvironmentMigration>> {
    let migration = migration_service::cancel(&pool, id).await?;
    Ok(Json(migration))
}

/// POST /migration/claim
/// Returns null when no approved migration is waiting.
pub async fn claim_migration(
    State(pool): State<PgPool>,
    Json(req): Json<ClaimMigration>,
) -> ApiResult<Json<Option<EnvironmentMigration>>> {
    let claimed = migration_service::claim_next(&pool, &req.worker_id).await?;
    Ok(Json(claimed))
}

/// POST /migration/{id}/progress
pub async fn migration_progress(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<MigrationProgress>,
) -> ApiResult<StatusCode> {
    migration_service::update_progress(&pool, id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /migration/{id}/complete
pub async fn complete_migration(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteMigration>,
) -> ApiResult<Json<EnvironmentMigration>> {
    let migration = migration_service::complete(&pool, id, req).await?;
    Ok(Json(migration))
}

/// POST /migration/{id}/rollback
/// Marks the migration rolled back and hands the captured snapshot to the
/// caller for config restoration.
pub async fn rollback_migration(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MigrationRollbackResponse>> {
    let (migration, snapshot) = migration_service::rollback(&pool, id).await?;
    Ok(Json(MigrationRollbackResponse { migration, snapshot }))
}

/// GET /migration/history/{kind}/{id}
pub async fn migration_history(
    State(pool): State<PgPool>,
    Path((kind, id)): Path<(ResourceKind, Uuid)>,
) -> ApiResult<Json<Vec<MigrationHistory>>> {
    let history = migration_service::history(&pool, ResourceRef::new(kind, id)).await?;
    Ok(Json(history))
}
