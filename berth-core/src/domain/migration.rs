//! Environment migration domain types
//!
//! One promotion of a resource from a source environment to a target
//! environment and server, gated by the same approval pattern as deployments
//! and backed by a rollback snapshot so it can be compensated.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::resource::ResourceRef;

/// One cross-environment promotion of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentMigration {
    pub id: Uuid,
    pub source: ResourceRef,
    pub source_environment_id: Uuid,
    pub target_environment_id: Uuid,
    /// Opaque reference to the server the resource lands on.
    pub target_server_ref: String,
    pub options: MigrationOptions,
    pub status: MigrationStatus,
    pub requires_approval: bool,
    pub requested_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub decided_at: Option<chrono::DateTime<chrono::Utc>>,
    pub rejection_reason: Option<String>,
    /// Pre-migration configuration capture for compensating restore.
    pub rollback_snapshot: Option<RollbackSnapshot>,
    /// Related resources promoted together, executed in dependency order.
    pub linked_resources: Vec<ResourceRef>,
    /// 0..=100.
    pub progress: i32,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// `pending -> (approved|rejected) -> in_progress -> {completed | failed |
/// rolled_back}`, plus `cancelled` from any pre-`in_progress` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    Approved,
    Rejected,
    InProgress,
    Completed,
    Failed,
    RolledBack,
    Cancelled,
}

impl MigrationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::RolledBack | Self::Rejected | Self::Cancelled
        )
    }

    /// Statuses counted as "active" by the one-migration-per-resource guard.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::InProgress)
    }

    pub fn can_transition_to(self, next: MigrationStatus) -> bool {
        use MigrationStatus::*;
        match (self, next) {
            (Pending, Approved) | (Pending, Rejected) | (Pending, Cancelled) => true,
            (Approved, InProgress) | (Approved, Cancelled) => true,
            (InProgress, Completed) | (InProgress, Failed) => true,
            // A completed migration can still be compensated.
            (Completed, RolledBack) | (Failed, RolledBack) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Knobs for one migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    pub copy_env_vars: bool,
    /// Volume *configuration* only; volume data never moves.
    pub copy_volume_config: bool,
    /// Update a matching resource in the target instead of creating one.
    pub update_existing: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            copy_env_vars: true,
            copy_volume_config: true,
            update_existing: false,
        }
    }
}

/// Captured configuration used by `rollback_migration` to restore either
/// side. Opaque to the pipeline; typed wrapper keeps the capture time and
/// both sides explicit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    pub source_config: serde_json::Value,
    /// Present only when `update_existing` overwrote a target resource.
    #[serde(default)]
    pub target_config: Option<serde_json::Value>,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

/// Versioned full-configuration snapshot of a resource, taken at each
/// migration and keyed by a hash of the configuration for diff/restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationHistory {
    pub id: Uuid,
    pub resource: ResourceRef,
    /// Content hash of `config`, the version key.
    pub version: String,
    pub config: serde_json::Value,
    pub migration_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Orders resources for grouped execution: databases before services before
/// applications, so nothing starts against an address that does not exist
/// yet. Stable within a kind.
pub fn execution_order(resources: &[ResourceRef]) -> Vec<ResourceRef> {
    let mut ordered = resources.to_vec();
    ordered.sort_by_key(|r| r.kind.migration_rank());
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceKind;

    #[test]
    fn test_active_statuses() {
        assert!(MigrationStatus::Pending.is_active());
        assert!(MigrationStatus::Approved.is_active());
        assert!(MigrationStatus::InProgress.is_active());
        assert!(!MigrationStatus::Completed.is_active());
        assert!(!MigrationStatus::Rejected.is_active());
        assert!(!MigrationStatus::RolledBack.is_active());
    }

    #[test]
    fn test_cancel_only_before_execution() {
        use MigrationStatus::*;
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(!InProgress.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn test_rolled_back_reachable_from_completed() {
        assert!(MigrationStatus::Completed.can_transition_to(MigrationStatus::RolledBack));
        assert!(!MigrationStatus::RolledBack.can_transition_to(MigrationStatus::InProgress));
    }

    #[test]
    fn test_execution_order_databases_first() {
        let app = ResourceRef::new(ResourceKind::Application, Uuid::new_v4());
        let db = ResourceRef::new(ResourceKind::Database, Uuid::new_v4());
        let svc = ResourceRef::new(ResourceKind::Service, Uuid::new_v4());

        let ordered = execution_order(&[app, db, svc]);
        assert_eq!(ordered, vec![db, svc, app]);
    }

    #[test]
    fn test_execution_order_stable_within_kind() {
        let db1 = ResourceRef::new(ResourceKind::Database, Uuid::new_v4());
        let db2 = ResourceRef::new(ResourceKind::Database, Uuid::new_v4());
        let ordered = execution_order(&[db1, db2]);
        assert_eq!(ordered, vec![db1, db2]);
    }
}
