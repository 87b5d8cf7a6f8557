//! Transfer DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::resource::ResourceRef;
use crate::domain::transfer::TransferMode;

/// Request to create a resource transfer (same-tier duplication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub source: ResourceRef,
    pub target_server_ref: String,
    pub mode: TransferMode,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub requested_by: Option<Uuid>,
    /// Current source configuration, captured for the rollback snapshot.
    pub source_config: serde_json::Value,
}

/// Byte-level progress checkpoint for a running transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferProgress {
    pub bytes_copied: i64,
    pub bytes_total: i64,
    pub current_step: String,
}

impl TransferProgress {
    /// Integer percentage, saturating at 100.
    pub fn percent(&self) -> i32 {
        if self.bytes_total <= 0 {
            return 0;
        }
        ((self.bytes_copied.min(self.bytes_total) * 100) / self.bytes_total) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_saturates() {
        let p = TransferProgress {
            bytes_copied: 150,
            bytes_total: 100,
            current_step: "copy".into(),
        };
        assert_eq!(p.percent(), 100);
    }

    #[test]
    fn test_percent_handles_unknown_total() {
        let p = TransferProgress {
            bytes_copied: 10,
            bytes_total: 0,
            current_step: "estimate".into(),
        };
        assert_eq!(p.percent(), 0);
    }
}
