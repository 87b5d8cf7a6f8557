//! Worker Registration API Handlers

use axum::{Json, extract::State, http::StatusCode};
use berth_core::dto::worker::{Heartbeat, RegisterWorker};
use sqlx::PgPool;

use crate::api::error::ApiResult;
use crate::service::worker_service;

/// POST /worker/register
/// Idempotent; re-registration refreshes capacity and last_seen.
pub async fn register(
    State(pool): State<PgPool>,
    Json(req): Json<RegisterWorker>,
) -> ApiResult<StatusCode> {
    worker_service::register(&pool, &req.worker_id, req.capacity).await?;
    Ok(StatusCode::OK)
}

/// POST /worker/heartbeat
pub async fn heartbeat(
    State(pool): State<PgPool>,
    Json(req): Json<Heartbeat>,
) -> ApiResult<StatusCode> {
    worker_service::heartbeat(&pool, &req.worker_id).await?;
    Ok(StatusCode::OK)
}
