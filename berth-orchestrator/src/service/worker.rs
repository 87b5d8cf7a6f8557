//! Worker Service
//!
//! Registration and heartbeat handling for execution workers.

use sqlx::PgPool;

use crate::repository::worker_repository;

/// Service error type
#[derive(Debug)]
pub enum WorkerError {
    NotFound(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for WorkerError {
    fn from(err: sqlx::Error) -> Self {
        WorkerError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Register (or re-register) a worker.
pub async fn register(pool: &PgPool, worker_id: &str, capacity: i32) -> Result<()> {
    if worker_id.is_empty() {
        return Err(WorkerError::ValidationError(
            "worker_id cannot be empty".to_string(),
        ));
    }
    if capacity < 1 {
        return Err(WorkerError::ValidationError(
            "capacity must be at least 1".to_string(),
        ));
    }

    worker_repository::register(pool, worker_id, capacity).await?;
    tracing::info!("Worker {} registered (capacity: {})", worker_id, capacity);
    Ok(())
}

/// Record a worker heartbeat.
pub async fn heartbeat(pool: &PgPool, worker_id: &str) -> Result<()> {
    let known = worker_repository::heartbeat(pool, worker_id).await?;
    if !known {
        return Err(WorkerError::NotFound(worker_id.to_string()));
    }
    Ok(())
}
