//! Rollback API Handlers
//!
//! Trigger endpoint used by health monitors and operators, plus the audit
//! history query.

use axum::{
    Json,
    extract::{Path, State},
};
use berth_core::domain::rollback::RollbackEvent;
use berth_core::dto::rollback::{RollbackOutcome, TriggerRollback};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::rollback_service;

/// POST /application/{id}/rollback
/// Record a rollback event and enqueue the compensating deployment.
pub async fn trigger(
    State(pool): State<PgPool>,
    Path(application_id): Path<Uuid>,
    Json(req): Json<TriggerRollback>,
) -> ApiResult<Json<RollbackOutcome>> {
    tracing::info!(
        "Rollback trigger for application {} (reason: {})",
        application_id,
        req.reason
    );

    let outcome = rollback_service::trigger(&pool, application_id, req).await?;
    Ok(Json(outcome))
}

/// GET /application/{id}/rollbacks
pub async fn history(
    State(pool): State<PgPool>,
    Path(application_id): Path<Uuid>,
) -> ApiResult<Json<Vec<RollbackEvent>>> {
    let events = rollback_service::history(&pool, application_id).await?;
    Ok(Json(events))
}
