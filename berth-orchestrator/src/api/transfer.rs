//! Resource Transfer API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use berth_core::domain::transfer::ResourceTransfer;
use berth_core::dto::deployment::DecisionRequest;
use berth_core::dto::migration::{ClaimMigration, CompleteMigration};
use berth_core::dto::transfer::{CreateTransfer, TransferProgress};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::transfer_service;

/// POST /transfer
pub async fn create_transfer(
    State(pool): State<PgPool>,
    Json(req): Json<CreateTransfer>,
) -> ApiResult<(StatusCode, Json<ResourceTransfer>)> {
    let transfer = transfer_service::create(&pool, req).await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// GET /transfer/{id}
pub async fn get_transfer(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ResourceTransfer>> {
    let transfer = transfer_service::get_transfer(&pool, id).await?;
    Ok(Json(transfer))
}

/// POST /transfer/{id}/approve
pub async fn approve_transfer(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<ResourceTransfer>> {
    let transfer = transfer_service::approve(&pool, id, req.decided_by).await?;
    Ok(Json(transfer))
}

/// POST /transfer/{id}/reject
pub async fn reject_transfer(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<ResourceTransfer>> {
    let transfer = transfer_service::reject(&pool, id, req.decided_by, req.note).await?;
    Ok(Json(transfer))
}

/// POST /transfer/{id}/cancel
pub async fn cancel_transfer(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ResourceTransfer>> {
    let transfer = transfer_service::cancel(&pool, id).await?;
    Ok(Json(transfer))
}

/// POST /transfer/claim
pub async fn claim_transfer(
    State(pool): State<PgPool>,
    Json(req): Json<ClaimMigration>,
) -> ApiResult<Json<Option<ResourceTransfer>>> {
    let claimed = transfer_service::claim_next(&pool, &req.worker_id).await?;
    Ok(Json(claimed))
}

/// POST /transfer/{id}/progress
pub async fn transfer_progress(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransferProgress>,
) -> ApiResult<StatusCode> {
    transfer_service::update_progress(&pool, id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /transfer/{id}/complete
pub async fn complete_transfer(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteMigration>,
) -> ApiResult<Json<ResourceTransfer>> {
    let transfer =
        transfer_service::complete(&pool, id, req.success, req.error_message).await?;
    Ok(Json(transfer))
}
