//! Application API Handlers
//!
//! Minimal application surface: the lifecycle reads these records; full
//! configuration CRUD lives elsewhere.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use berth_core::domain::application::Application;
use berth_core::domain::settings::ApplicationSettings;
use berth_core::dto::application::CreateApplication;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::repository::application_repository;

/// POST /application
pub async fn create_application(
    State(pool): State<PgPool>,
    Json(req): Json<CreateApplication>,
) -> ApiResult<Json<Application>> {
    let app = Application {
        id: Uuid::new_v4(),
        name: req.name,
        git_repository: req.git_repository,
        git_branch: req.git_branch.unwrap_or_else(|| "main".to_string()),
        server_ref: req.server_ref,
        image_name: req.image_name,
        exposed_port: req.exposed_port,
        smoke_test_path: req.smoke_test_path,
        last_successful_deployment_id: None,
        created_at: chrono::Utc::now(),
    };

    application_repository::create(&pool, &app).await?;

    tracing::info!("Application {} registered ({})", app.name, app.id);

    Ok(Json(app))
}

/// GET /application/{id}
pub async fn get_application(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    let app = application_repository::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Application {} not found", id)))?;

    Ok(Json(app))
}

/// GET /application/{id}/settings
pub async fn get_settings(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApplicationSettings>> {
    application_repository::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Application {} not found", id)))?;

    let settings = application_repository::find_settings(&pool, id).await?;
    Ok(Json(settings))
}

/// PUT /application/{id}/settings
pub async fn put_settings(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(mut settings): Json<ApplicationSettings>,
) -> ApiResult<StatusCode> {
    application_repository::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Application {} not found", id)))?;

    settings.application_id = id;
    application_repository::upsert_settings(&pool, &settings).await?;

    Ok(StatusCode::NO_CONTENT)
}
