//! API Error Handling
//!
//! Unified error types and conversion for API responses. Service errors map
//! here once so handlers can use `?` instead of repeating match arms.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::{
    deployment::DeploymentError, log::LogError, migration::MigrationError,
    rollback::RollbackError, transfer::TransferError, worker::WorkerError,
};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// 409: single-active guard or gate raced with another caller.
    Conflict(String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<DeploymentError> for ApiError {
    fn from(err: DeploymentError) -> Self {
        match err {
            DeploymentError::NotFound(id) => {
                ApiError::NotFound(format!("Deployment {} not found", id))
            }
            DeploymentError::ApplicationNotFound(id) => {
                ApiError::NotFound(format!("Application {} not found", id))
            }
            DeploymentError::ConcurrentDeployment(id) => ApiError::Conflict(format!(
                "application {} already has an active deployment",
                id
            )),
            DeploymentError::InvalidState(msg) => ApiError::BadRequest(msg),
            DeploymentError::ValidationError(msg) => ApiError::BadRequest(msg),
            DeploymentError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<LogError> for ApiError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::DeploymentNotFound(id) => {
                ApiError::NotFound(format!("Deployment {} not found", id))
            }
            LogError::ValidationError(msg) => ApiError::BadRequest(msg),
            LogError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<RollbackError> for ApiError {
    fn from(err: RollbackError) -> Self {
        match err {
            RollbackError::ApplicationNotFound(id) => {
                ApiError::NotFound(format!("Application {} not found", id))
            }
            RollbackError::DeploymentNotFound(id) => {
                ApiError::NotFound(format!("Deployment {} not found", id))
            }
            RollbackError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<MigrationError> for ApiError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::NotFound(id) => {
                ApiError::NotFound(format!("Migration {} not found", id))
            }
            MigrationError::Conflict(resource) => ApiError::Conflict(format!(
                "resource {} already has an active migration",
                resource
            )),
            MigrationError::InvalidState(msg) => ApiError::BadRequest(msg),
            MigrationError::ValidationError(msg) => ApiError::BadRequest(msg),
            MigrationError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::NotFound(id) => {
                ApiError::NotFound(format!("Transfer {} not found", id))
            }
            TransferError::Conflict(resource) => ApiError::Conflict(format!(
                "resource {} already has an active transfer",
                resource
            )),
            TransferError::InvalidState(msg) => ApiError::BadRequest(msg),
            TransferError::ValidationError(msg) => ApiError::BadRequest(msg),
            TransferError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::NotFound(id) => ApiError::NotFound(format!("Worker {} not found", id)),
            WorkerError::ValidationError(msg) => ApiError::BadRequest(msg),
            WorkerError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
