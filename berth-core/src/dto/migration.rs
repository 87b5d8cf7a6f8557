//! Migration DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::migration::MigrationOptions;
use crate::domain::resource::ResourceRef;

/// Request to create an environment migration. The configuration layer
/// provides the captured configs; the pipeline treats them as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMigration {
    pub source: ResourceRef,
    pub source_environment_id: Uuid,
    pub target_environment_id: Uuid,
    pub target_server_ref: String,
    #[serde(default)]
    pub options: MigrationOptions,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub requested_by: Option<Uuid>,
    /// Full current configuration of the source resource.
    pub source_config: serde_json::Value,
    /// Current configuration of the target resource when `update_existing`.
    #[serde(default)]
    pub target_config: Option<serde_json::Value>,
    /// Related resources promoted as one group.
    #[serde(default)]
    pub linked_resources: Vec<ResourceRef>,
}

/// Worker request to claim the next executable migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimMigration {
    pub worker_id: String,
}

/// Progress checkpoint, mirroring the deployment log/progress idiom so both
/// pipelines share one progress-reporting UI contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationProgress {
    /// 0..=100.
    pub progress: i32,
    pub current_step: String,
}

/// Result of compensating a migration: the final record plus the captured
/// snapshot the caller restores from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRollbackResponse {
    pub migration: crate::domain::migration::EnvironmentMigration,
    pub snapshot: crate::domain::migration::RollbackSnapshot,
}

/// Terminal report for a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteMigration {
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}
