//! Resource transfer domain types
//!
//! Sibling pipeline to environment migrations: same-tier duplication of a
//! resource (full clone, data only, or a subset of tables). It shares the
//! approval + snapshot + progress idioms but keeps its own status machine
//! because a transfer never changes environments.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::migration::RollbackSnapshot;
use crate::domain::resource::ResourceRef;

/// One duplication of a resource onto a target server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTransfer {
    pub id: Uuid,
    pub source: ResourceRef,
    pub target_server_ref: String,
    pub mode: TransferMode,
    /// Table subset for `TransferMode::PartialTables`; empty otherwise.
    pub tables: Vec<String>,
    pub status: TransferStatus,
    pub requires_approval: bool,
    pub requested_by: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub decided_at: Option<chrono::DateTime<chrono::Utc>>,
    pub rejection_reason: Option<String>,
    pub rollback_snapshot: Option<RollbackSnapshot>,
    pub bytes_total: i64,
    pub bytes_copied: i64,
    pub progress: i32,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Full configuration + data clone.
    Clone,
    /// Data only, into an existing resource.
    DataOnly,
    /// Selected tables only.
    PartialTables,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Clone => "clone",
            Self::DataOnly => "data_only",
            Self::PartialTables => "partial_tables",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Rejected | Self::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::InProgress)
    }

    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        match (self, next) {
            (Pending, Approved) | (Pending, Rejected) | (Pending, Cancelled) => true,
            (Approved, InProgress) | (Approved, Cancelled) => true,
            (InProgress, Completed) | (InProgress, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_cancel_window() {
        use TransferStatus::*;
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(!InProgress.can_transition_to(Cancelled));
    }

    #[test]
    fn test_transfer_active_statuses_mirror_migration_guard() {
        assert!(TransferStatus::Pending.is_active());
        assert!(TransferStatus::InProgress.is_active());
        assert!(!TransferStatus::Failed.is_active());
    }
}
