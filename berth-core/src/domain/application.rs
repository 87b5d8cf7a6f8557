//! Application domain types
//!
//! The orchestrator only reads application records; full configuration CRUD
//! lives outside this core. `last_successful_deployment_id` is the one field
//! the deployment lifecycle writes back, because rollbacks resolve the last
//! known-good image through it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A deployable application as seen by the deployment lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub name: String,
    pub git_repository: String,
    pub git_branch: String,
    /// Opaque reference to the host the application deploys to.
    pub server_ref: String,
    /// Image name (without tag) pushed by the build stage.
    pub image_name: String,
    /// Port exposed by the container, used by the smoke test probe.
    pub exposed_port: Option<i32>,
    /// Path probed by the external smoke test. None disables the stage.
    pub smoke_test_path: Option<String>,
    /// Last deployment that reached `finished`; source of rollback images.
    pub last_successful_deployment_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
