//! Application DTOs for inter-service communication

use serde::{Deserialize, Serialize};

/// Request to register an application with the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApplication {
    pub name: String,
    pub git_repository: String,
    #[serde(default)]
    pub git_branch: Option<String>,
    pub server_ref: String,
    pub image_name: String,
    #[serde(default)]
    pub exposed_port: Option<i32>,
    #[serde(default)]
    pub smoke_test_path: Option<String>,
}
