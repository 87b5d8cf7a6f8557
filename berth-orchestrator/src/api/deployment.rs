//! Deployment API Handlers
//!
//! HTTP endpoints for the deployment queue, the approval gate, the claim
//! protocol, canary checkpoints, and the log sink.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use berth_core::domain::deployment::Deployment;
use berth_core::domain::log::DeploymentLogEntry;
use berth_core::dto::deployment::{
    CanaryStateUpdate, ClaimDeployment, ClaimedDeployment, CompleteDeployment, DecisionRequest,
    EnqueueDeployment,
};
use berth_core::dto::log::{AppendLogs, AppendLogsResponse, LogQuery};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::{deployment_service, log_service};

const DEFAULT_LOG_PAGE: i64 = 500;

// =============================================================================
// Queue Endpoints
// =============================================================================

/// POST /deployment
/// Create a deployment entry (queued, or pending approval when gated).
pub async fn enqueue(
    State(pool): State<PgPool>,
    Json(req): Json<EnqueueDeployment>,
) -> ApiResult<Json<Deployment>> {
    tracing::info!("Enqueueing deployment for application {}", req.application_id);

    let deployment = deployment_service::enqueue(&pool, req).await?;
    Ok(Json(deployment))
}

/// POST /deployment/claim
/// Worker claims the oldest queued deployment. 204 when the queue is empty.
pub async fn claim(
    State(pool): State<PgPool>,
    Json(req): Json<ClaimDeployment>,
) -> ApiResult<Json<Option<ClaimedDeployment>>> {
    let claimed = deployment_service::claim_next(&pool, &req.worker_id).await?;
    Ok(Json(claimed))
}

/// GET /deployment/{id}
pub async fn get_deployment(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    let deployment = deployment_service::get_deployment(&pool, id).await?;
    Ok(Json(deployment))
}

/// GET /application/{id}/deployments
pub async fn list_for_application(
    State(pool): State<PgPool>,
    Path(application_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Deployment>>> {
    let deployments = deployment_service::list_for_application(&pool, application_id).await?;
    Ok(Json(deployments))
}

/// GET /application/{id}/deployments/latest
pub async fn latest_for_application(
    State(pool): State<PgPool>,
    Path(application_id): Path<Uuid>,
) -> ApiResult<Json<Option<Deployment>>> {
    let deployment = deployment_service::latest_for_application(&pool, application_id).await?;
    Ok(Json(deployment))
}

/// POST /deployment/{id}/complete
pub async fn complete(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteDeployment>,
) -> ApiResult<Json<Deployment>> {
    let deployment = deployment_service::complete(&pool, id, req).await?;
    Ok(Json(deployment))
}

/// POST /deployment/{id}/cancel
pub async fn cancel(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    let deployment = deployment_service::cancel(&pool, id).await?;
    Ok(Json(deployment))
}

// =============================================================================
// Approval Gate Endpoints
// =============================================================================

/// POST /deployment/{id}/approve
pub async fn approve(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<Deployment>> {
    let deployment = deployment_service::approve(&pool, id, req.decided_by, req.note).await?;
    Ok(Json(deployment))
}

/// POST /deployment/{id}/reject
pub async fn reject(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> ApiResult<Json<Deployment>> {
    let deployment = deployment_service::reject(&pool, id, req.decided_by, req.note).await?;
    Ok(Json(deployment))
}

// =============================================================================
// Canary Endpoints
// =============================================================================

/// PUT /deployment/{id}/canary
/// Persist a canary checkpoint so the rollout survives worker restarts.
pub async fn update_canary(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<CanaryStateUpdate>,
) -> ApiResult<StatusCode> {
    deployment_service::update_canary_state(&pool, id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /deployment/{id}/canary/promote
/// Request promotion of a canary holding at full weight.
pub async fn promote_canary(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    deployment_service::request_canary_promotion(&pool, id).await?;
    Ok(StatusCode::ACCEPTED)
}

// =============================================================================
// Log Endpoints
// =============================================================================

/// GET /deployment/{id}/logs
/// Ordered log page: entries with order > after_order.
pub async fn get_logs(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<DeploymentLogEntry>>> {
    let logs = deployment_service::get_logs(
        &pool,
        id,
        query.after_order.unwrap_or(0),
        query.limit.unwrap_or(DEFAULT_LOG_PAGE),
        query.include_hidden,
    )
    .await?;

    Ok(Json(logs))
}

/// POST /deployment/{id}/logs
/// Append a batch of log entries; responds with the highest assigned order.
pub async fn append_logs(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<AppendLogs>,
) -> ApiResult<Json<AppendLogsResponse>> {
    let last_order = log_service::append_entries(&pool, id, req.entries).await?;
    Ok(Json(AppendLogsResponse { last_order }))
}
