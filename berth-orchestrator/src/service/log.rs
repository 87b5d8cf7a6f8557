//! Log Service
//!
//! Business logic for the append-only deployment log sink.

use berth_core::domain::log::NewLogEntry;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{deployment_repository, log_repository};

/// Service error type
#[derive(Debug)]
pub enum LogError {
    DeploymentNotFound(Uuid),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for LogError {
    fn from(err: sqlx::Error) -> Self {
        LogError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, LogError>;

/// Append a batch of entries for a deployment. Returns the highest assigned
/// order so the worker can resume pagination after a reconnect.
pub async fn append_entries(
    pool: &PgPool,
    deployment_id: Uuid,
    entries: Vec<NewLogEntry>,
) -> Result<i64> {
    validate_entries(&entries)?;

    if entries.is_empty() {
        let count = log_repository::count_for_deployment(pool, deployment_id).await?;
        return Ok(count);
    }

    deployment_repository::find_by_id(pool, deployment_id)
        .await?
        .ok_or(LogError::DeploymentNotFound(deployment_id))?;

    let last_order = log_repository::append_entries(pool, deployment_id, &entries).await?;

    tracing::debug!(
        "Appended {} log entries for deployment {} (last order {})",
        entries.len(),
        deployment_id,
        last_order
    );

    Ok(last_order)
}

// =============================================================================
// Validation
// =============================================================================

fn validate_entries(entries: &[NewLogEntry]) -> Result<()> {
    const MAX_OUTPUT_LENGTH: usize = 100_000;
    const MAX_BATCH_SIZE: usize = 1000;

    if entries.len() > MAX_BATCH_SIZE {
        return Err(LogError::ValidationError(format!(
            "too many log entries in batch (max: {})",
            MAX_BATCH_SIZE
        )));
    }

    for (i, entry) in entries.iter().enumerate() {
        if entry.output.len() > MAX_OUTPUT_LENGTH {
            return Err(LogError::ValidationError(format!(
                "log entry {} output too long (max: {} bytes)",
                i, MAX_OUTPUT_LENGTH
            )));
        }
        if entry.stage.is_empty() {
            return Err(LogError::ValidationError(format!(
                "log entry {} is missing its stage tag",
                i
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::domain::log::LogStream;

    fn entry(output: &str, stage: &str) -> NewLogEntry {
        NewLogEntry {
            command: None,
            output: output.to_string(),
            stream: LogStream::Stdout,
            stage: stage.to_string(),
            hidden: false,
            batch: 0,
        }
    }

    #[test]
    fn test_validate_entries_valid() {
        let entries = vec![entry("cloning...", "clone_source"), entry("done", "finish")];
        assert!(validate_entries(&entries).is_ok());
    }

    #[test]
    fn test_validate_entries_too_many() {
        let entries: Vec<NewLogEntry> =
            (0..1001).map(|i| entry(&format!("line {}", i), "deploy")).collect();
        assert!(matches!(
            validate_entries(&entries),
            Err(LogError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_entries_requires_stage_tag() {
        let entries = vec![entry("missing stage", "")];
        assert!(matches!(
            validate_entries(&entries),
            Err(LogError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_entries_output_too_long() {
        let entries = vec![entry(&"x".repeat(100_001), "build_image")];
        assert!(matches!(
            validate_entries(&entries),
            Err(LogError::ValidationError(_))
        ));
    }
}
